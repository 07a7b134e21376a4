// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::capabilities::{FileFormat, HubCapabilities, HubCapabilityFlags};
use crate::constants::SAFE_WRITE_SIZE;
use semver::{Prerelease, Version};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{version}': {reason}")]
    Invalid { version: String, reason: String },
}

/// Profile version that introduced the hub capabilities characteristic
pub const PROFILE_HUB_CAPABILITIES: Version = Version::new(1, 2, 0);

/// Profile version that introduced the WriteStdin command
pub const PROFILE_WRITE_STDIN: Version = Version::new(1, 3, 0);

/// Profile version that added the slot to StartUserProgram
pub const PROFILE_START_USER_PROGRAM_SLOT: Version = Version::new(1, 4, 0);

/// Newest profile version this crate implements
pub const SUPPORTED_PROFILE_VERSION: Version = Version::new(1, 4, 0);

/// Converts a Python short version (`3.2.0b2`) to semver (`3.2.0-beta.2`)
pub fn python_version_to_semver(version: &str) -> Result<Version, VersionError> {
    let version = version.trim().trim_start_matches('v');

    let converted = match version.find(|c: char| c.is_ascii_alphabetic()) {
        Some(pos) => {
            let (release, rest) = version.split_at(pos);
            let (tag, number) = rest.split_at(1);
            let tag = match tag {
                "a" => "alpha",
                "b" => "beta",
                "c" => "candidate",
                "f" => "final",
                other => {
                    return Err(VersionError::Invalid {
                        version: version.to_string(),
                        reason: format!("unknown pre-release tag '{}'", other),
                    })
                }
            };
            format!("{}-{}.{}", release, tag, number)
        }
        None => version.to_string(),
    };

    Version::parse(&converted).map_err(|e| VersionError::Invalid {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Firmware from this version on takes multi-file MPY v6 programs
pub fn multi_mpy6_firmware_threshold() -> Version {
    let mut version = Version::new(3, 2, 0);
    version.pre = Prerelease::new("beta.2").unwrap_or(Prerelease::EMPTY);
    version
}

/// Whether the hub profile is newer than anything this crate knows about
pub fn profile_is_newer(profile: &Version) -> bool {
    profile.major == SUPPORTED_PROFILE_VERSION.major
        && profile.minor > SUPPORTED_PROFILE_VERSION.minor
}

/// Whether the hub exposes the capabilities characteristic
pub fn has_capabilities_characteristic(profile: &Version) -> bool {
    *profile >= PROFILE_HUB_CAPABILITIES
}

/// Guess the capabilities of a hub that predates the capabilities
/// characteristic from its firmware version
pub fn infer_capabilities(firmware: &Version) -> HubCapabilities {
    let format_flag = if *firmware < multi_mpy6_firmware_threshold() {
        HubCapabilityFlags::empty()
    } else {
        HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6
    };

    HubCapabilities {
        max_write_size: SAFE_WRITE_SIZE as u16,
        flags: HubCapabilityFlags::HAS_REPL | format_flag,
        max_user_program_size: 0,
        num_of_slots: 0,
    }
}

/// File format a hub of the given firmware is expected to accept when it has
/// no capabilities characteristic
pub fn infer_file_format(firmware: &Version) -> FileFormat {
    infer_capabilities(firmware).preferred_file_format()
}
