// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_protocol::version::{
    PROFILE_HUB_CAPABILITIES, PROFILE_START_USER_PROGRAM_SLOT, PROFILE_WRITE_STDIN,
};
use brickwire_protocol::{hub_type_name, FileFormat, HubCapabilities, PnpId, SAFE_WRITE_SIZE};
use semver::Version;

/// Lifecycle of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Protocol behaviour selected by the profile version of the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyFlags {
    /// Checksummed download over UART instead of WriteUserRam
    pub download: bool,
    /// Stdin over UART instead of the WriteStdin command
    pub stdio: bool,
    /// StartUserProgram without slot
    pub start_user_program: bool,
    /// Start the REPL by typing on the UART
    pub repl: bool,
}

impl LegacyFlags {
    pub fn for_profile(profile: &Version) -> Self {
        Self {
            download: *profile < PROFILE_HUB_CAPABILITIES,
            stdio: *profile < PROFILE_WRITE_STDIN,
            start_user_program: *profile < PROFILE_START_USER_PROGRAM_SLOT,
            repl: *profile < PROFILE_HUB_CAPABILITIES,
        }
    }
}

/// Everything learned about the hub during the handshake
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSession {
    pub device_id: String,
    pub device_name: String,
    pub firmware_revision: String,
    pub firmware_version: Version,
    pub profile_version: Version,
    pub pnp_id: PnpId,
    pub capabilities: HubCapabilities,
    /// Whether the capabilities were read from the hub or guessed
    pub capabilities_reported: bool,
    pub legacy: LegacyFlags,
}

impl ConnectionSession {
    pub fn hub_type_name(&self) -> &'static str {
        hub_type_name(&self.pnp_id)
    }

    pub fn preferred_file_format(&self) -> FileFormat {
        self.capabilities.preferred_file_format()
    }

    /// Largest stdin payload of a single write
    pub fn stdin_chunk_size(&self) -> usize {
        if self.legacy.stdio {
            SAFE_WRITE_SIZE
        } else {
            self.capabilities.max_write_size().max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_flags() {
        let flags = LegacyFlags::for_profile(&Version::new(1, 1, 0));
        assert!(flags.download && flags.stdio && flags.start_user_program && flags.repl);

        let flags = LegacyFlags::for_profile(&Version::new(1, 2, 0));
        assert!(!flags.download && flags.stdio && flags.start_user_program && !flags.repl);

        let flags = LegacyFlags::for_profile(&Version::new(1, 3, 0));
        assert!(!flags.download && !flags.stdio && flags.start_user_program);

        let flags = LegacyFlags::for_profile(&Version::new(1, 4, 0));
        assert!(!flags.start_user_program);
    }
}
