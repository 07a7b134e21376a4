// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_protocol::capabilities::*;
use brickwire_protocol::version::*;
use semver::Version;

    #[test]
    fn test_decode_with_slots() {
        let data = [
            0x9c, 0x00, // max write size 156
            0x03, 0x00, 0x00, 0x00, // repl + multi mpy6
            0x00, 0x80, 0x00, 0x00, // 32 KiB
            0x05, // slots
        ];
        let caps = decode_hub_capabilities(&data).unwrap();
        assert_eq!(caps.max_write_size, 156);
        assert!(caps.has_repl());
        assert_eq!(caps.max_user_program_size, 32 * 1024);
        assert_eq!(caps.num_of_slots, 5);
        assert_eq!(caps.preferred_file_format(), FileFormat::MultiMpy6);
    }

    #[test]
    fn test_decode_without_slots() {
        let data = [20, 0, 0x05, 0, 0, 0, 0, 1, 0, 0];
        let caps = decode_hub_capabilities(&data).unwrap();
        assert_eq!(caps.num_of_slots, 0);
        assert_eq!(caps.preferred_file_format(), FileFormat::MultiMpy6Native6p1);
        assert!(!caps.supports(FileFormat::MultiMpy6));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(decode_hub_capabilities(&[0; 9]).is_err());
    }

    #[test]
    fn test_encode_decode() {
        let caps = HubCapabilities {
            max_write_size: 512,
            flags: HubCapabilityFlags::HAS_REPL | HubCapabilityFlags::HAS_PORT_VIEW,
            max_user_program_size: 1000,
            num_of_slots: 0,
        };
        assert_eq!(decode_hub_capabilities(&caps.encode()).unwrap(), caps);
    }

    #[test]
    fn test_python_version_to_semver() {
        assert_eq!(
            python_version_to_semver("3.2.0b2").unwrap().to_string(),
            "3.2.0-beta.2"
        );
        assert_eq!(
            python_version_to_semver("1.0.0a1").unwrap().to_string(),
            "1.0.0-alpha.1"
        );
        assert_eq!(
            python_version_to_semver("3.3.0c1").unwrap().to_string(),
            "3.3.0-candidate.1"
        );
        assert_eq!(
            python_version_to_semver("1.2.0").unwrap(),
            Version::new(1, 2, 0)
        );
        assert!(python_version_to_semver("garbage").is_err());
    }

    #[test]
    fn test_profile_gates() {
        assert!(!has_capabilities_characteristic(&Version::new(1, 1, 0)));
        assert!(has_capabilities_characteristic(&Version::new(1, 2, 0)));
        assert!(!profile_is_newer(&Version::new(1, 4, 0)));
        assert!(profile_is_newer(&Version::new(1, 5, 0)));
        assert!(!profile_is_newer(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_infer_capabilities_old_firmware() {
        let firmware = python_version_to_semver("3.1.0").unwrap();
        let caps = infer_capabilities(&firmware);
        assert!(caps.has_repl());
        assert_eq!(caps.max_write_size, 20);
        assert_eq!(caps.max_user_program_size, 0);
        assert_eq!(caps.num_of_slots, 0);
        assert_eq!(caps.preferred_file_format(), FileFormat::Mpy5);
    }

    #[test]
    fn test_infer_capabilities_threshold() {
        let before = python_version_to_semver("3.2.0b1").unwrap();
        let at = python_version_to_semver("3.2.0b2").unwrap();
        let after = python_version_to_semver("3.2.0").unwrap();
        assert_eq!(infer_file_format(&before), FileFormat::Mpy5);
        assert_eq!(infer_file_format(&at), FileFormat::MultiMpy6);
        assert_eq!(infer_file_format(&after), FileFormat::MultiMpy6);
    }
