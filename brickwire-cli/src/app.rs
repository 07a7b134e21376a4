// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_hub::{AlertAction, ConnectionSession, EventStream, HubEvent};
use chrono::Local;
use serde_json::{json, Value};
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            level,
            message: message.into(),
        }
    }
}

fn action_hint(action: AlertAction) -> &'static str {
    match action {
        AlertAction::InstallFirmware => "install the Pybricks firmware on your hub",
        AlertAction::UpdateFirmware => "update the firmware of your hub",
    }
}

/// Status line for an event, terminal output and internal traffic have none
pub fn describe(event: &HubEvent) -> Option<LogEntry> {
    let (level, message) = match event {
        HubEvent::Connecting => (LogLevel::Info, "Connecting...".to_string()),
        HubEvent::Connected { name, .. } => (LogLevel::Info, format!("Connected to {}", name)),
        HubEvent::ConnectFailed(reason) => {
            (LogLevel::Error, format!("Connection failed: {}", reason))
        }
        HubEvent::ConnectCancelled => (LogLevel::Warn, "No hub selected".to_string()),
        HubEvent::Disconnecting => (LogLevel::Debug, "Disconnecting".to_string()),
        HubEvent::Disconnected => (LogLevel::Info, "Disconnected".to_string()),
        HubEvent::FirmwareRevision(revision) => (LogLevel::Debug, format!("Firmware {}", revision)),
        HubEvent::SoftwareRevision(revision) => {
            (LogLevel::Debug, format!("Pybricks profile {}", revision))
        }
        HubEvent::RuntimeStateChanged(state) => (LogLevel::Debug, format!("Hub is {}", state)),
        HubEvent::DownloadStarted => (LogLevel::Info, "Downloading program".to_string()),
        HubEvent::DownloadProgress(progress) => (
            LogLevel::Debug,
            format!("Downloaded {:.0}%", progress * 100.0),
        ),
        HubEvent::DownloadFinished => (LogLevel::Info, "Program started".to_string()),
        HubEvent::DownloadFailed(reason) => {
            (LogLevel::Error, format!("Download failed: {}", reason))
        }
        HubEvent::ProtocolError(e) => (LogLevel::Warn, format!("Protocol error: {}", e)),
        HubEvent::Alert(alert) => {
            let level = if alert.is_advisory() {
                LogLevel::Warn
            } else {
                LogLevel::Error
            };
            let message = match alert.action() {
                Some(action) => format!("{} ({})", alert, action_hint(action)),
                None => alert.to_string(),
            };
            (level, message)
        }
        _ => return None,
    };
    Some(LogEntry::new(level, message))
}

/// Prints hub events until the bus goes away.
///
/// Program output goes to stdout unchanged, everything else to stderr.
pub async fn print_events(mut events: EventStream, verbose: bool) {
    while let Some(event) = events.recv().await {
        if let HubEvent::Stdout(text) = &event {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
            continue;
        }

        if let Some(entry) = describe(&event) {
            if entry.level == LogLevel::Debug && !verbose {
                continue;
            }
            eprintln!(
                "[{}] {:5} {}",
                entry.timestamp,
                entry.level.as_str(),
                entry.message
            );
        }
    }
}

/// Identity of a connected hub, for `info --json`
pub fn session_json(session: &ConnectionSession) -> Value {
    let capabilities = &session.capabilities;
    json!({
        "id": session.device_id,
        "name": session.device_name,
        "hub_type": session.hub_type_name(),
        "firmware_revision": session.firmware_revision,
        "firmware_version": session.firmware_version.to_string(),
        "profile_version": session.profile_version.to_string(),
        "capabilities": {
            "reported": session.capabilities_reported,
            "max_write_size": capabilities.max_write_size,
            "max_user_program_size": capabilities.max_user_program_size,
            "num_of_slots": capabilities.num_of_slots,
            "flags": capabilities.flags.bits(),
            "has_repl": capabilities.has_repl(),
        },
        "file_format": session.preferred_file_format().to_string(),
        "legacy": {
            "download": session.legacy.download,
            "stdio": session.legacy.stdio,
            "start_user_program": session.legacy.start_user_program,
            "repl": session.legacy.repl,
        },
    })
}

/// Identity of a connected hub, for `info`
pub fn session_text(session: &ConnectionSession) -> String {
    let capabilities = &session.capabilities;
    let mut lines = vec![
        format!("Name:              {}", session.device_name),
        format!("Hub type:          {}", session.hub_type_name()),
        format!("Firmware:          {}", session.firmware_revision),
        format!("Profile:           {}", session.profile_version),
        format!("Program format:    {}", session.preferred_file_format()),
        format!("Max write size:    {}", capabilities.max_write_size),
    ];
    if capabilities.max_user_program_size > 0 {
        lines.push(format!(
            "Max program size:  {}",
            capabilities.max_user_program_size
        ));
    }
    if capabilities.num_of_slots > 0 {
        lines.push(format!("Slots:             {}", capabilities.num_of_slots));
    }
    if !session.capabilities_reported {
        lines.push("Capabilities are guessed from the firmware version".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickwire_hub::{Alert, LegacyFlags, RuntimeState};
    use brickwire_protocol::{
        HubCapabilities, HubCapabilityFlags, PnpId, VendorIdSource, LEGO_COMPANY_ID,
    };
    use semver::Version;

    fn session() -> ConnectionSession {
        ConnectionSession {
            device_id: "emulator-0001".to_string(),
            device_name: "Pybricks Hub".to_string(),
            firmware_revision: "3.5.0".to_string(),
            firmware_version: Version::new(3, 5, 0),
            profile_version: Version::new(1, 4, 0),
            pnp_id: PnpId {
                vendor_id_source: VendorIdSource::BluetoothSig,
                vendor_id: LEGO_COMPANY_ID,
                product_id: 0x81,
                product_version: 0,
            },
            capabilities: HubCapabilities {
                max_write_size: 158,
                flags: HubCapabilityFlags::HAS_REPL | HubCapabilityFlags::USER_PROGRAM_MULTI_MPY6,
                max_user_program_size: 261_512,
                num_of_slots: 5,
            },
            capabilities_reported: true,
            legacy: LegacyFlags::for_profile(&Version::new(1, 4, 0)),
        }
    }

    #[test]
    fn test_session_json() {
        let value = session_json(&session());
        assert_eq!(value["hub_type"], "Prime hub");
        assert_eq!(value["capabilities"]["max_write_size"], 158);
        assert_eq!(value["capabilities"]["has_repl"], true);
        assert_eq!(value["file_format"], "multi-mpy-v6");
        assert_eq!(value["legacy"]["download"], false);
    }

    #[test]
    fn test_session_text_guessed_capabilities() {
        let mut session = session();
        session.capabilities_reported = false;
        session.capabilities.num_of_slots = 0;

        let text = session_text(&session);
        assert!(text.contains("Prime hub"));
        assert!(text.contains("guessed"));
        assert!(!text.contains("Slots"));
    }

    #[test]
    fn test_describe_alerts() {
        let entry = describe(&HubEvent::Alert(Alert::OldFirmware)).unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert!(entry.message.contains("update the firmware"));

        let entry = describe(&HubEvent::Alert(Alert::LostConnection)).unwrap();
        assert_eq!(entry.level, LogLevel::Error);
    }

    #[test]
    fn test_describe_skips_terminal_output() {
        assert!(describe(&HubEvent::Stdout("hi".to_string())).is_none());
        assert!(describe(&HubEvent::CommandDidSend { id: 1 }).is_none());
        assert_eq!(
            describe(&HubEvent::RuntimeStateChanged(RuntimeState::Running))
                .map(|entry| entry.level),
            Some(LogLevel::Debug)
        );
    }
}
