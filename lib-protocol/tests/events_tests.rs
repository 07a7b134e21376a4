// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_protocol::events::*;

    #[test]
    fn test_status_to_flag_roundtrip() {
        for index in 0u8..8 {
            let status = Status::from_index(index).unwrap();
            let flag = status_to_flag(status);
            assert_eq!(flag.trailing_zeros(), u32::from(index));
            assert_eq!(flag.count_ones(), 1);
        }
    }

    #[test]
    fn test_status_flags_from_index() {
        assert_eq!(
            StatusFlags::from_index(6),
            Some(StatusFlags::USER_PROGRAM_RUNNING)
        );
        assert_eq!(StatusFlags::from_index(8), None);
    }

    #[test]
    fn test_status_report_without_slot() {
        let event = decode_event(&[0x00, 0x40, 0x00, 0x00, 0x00]).unwrap();
        match event {
            Event::StatusReport {
                flags,
                running_program,
                selected_slot,
            } => {
                assert!(flags.user_program_running());
                assert_eq!(running_program, 0);
                assert_eq!(selected_slot, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_status_report_with_slot() {
        let event = decode_event(&[0x00, 0x08, 0x00, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(
            event,
            Event::StatusReport {
                flags: StatusFlags::BLE_ADVERTISING,
                running_program: 2,
                selected_slot: 0,
            }
        );
    }

    #[test]
    fn test_status_report_with_selected_slot() {
        let event = decode_event(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x04]).unwrap();
        assert_eq!(
            event,
            Event::StatusReport {
                flags: StatusFlags::empty(),
                running_program: 1,
                selected_slot: 4,
            }
        );
    }

    #[test]
    fn test_status_report_keeps_unknown_bits() {
        let event = decode_event(&[0x00, 0x00, 0x01, 0x00, 0x00]).unwrap();
        match event {
            Event::StatusReport { flags, .. } => assert_eq!(flags.bits(), 0x100),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_status_report_too_short() {
        let err = decode_event(&[0x00, 0x01, 0x02]).unwrap_err();
        assert_eq!(&err.value()[..], &[0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_write_stdout() {
        let event = decode_event(b"\x01hello").unwrap();
        assert_eq!(event, Event::WriteStdout(bytes::Bytes::from_static(b"hello")));
    }

    #[test]
    fn test_write_app_data() {
        let event = decode_event(&[0x02, 1, 2, 3]).unwrap();
        assert_eq!(event.event_type(), EventType::WriteAppData);
    }

    #[test]
    fn test_unknown_event_type() {
        let err = decode_event(&[0xff, 0x01]).unwrap_err();
        assert!(err.message().contains("0xff"), "{}", err.message());
        assert_eq!(&err.value()[..], &[0xff, 0x01]);
    }

    #[test]
    fn test_empty_event() {
        assert!(decode_event(&[]).is_err());
    }

    #[test]
    fn test_encode_status_report() {
        let event = Event::StatusReport {
            flags: StatusFlags::USER_PROGRAM_RUNNING,
            running_program: 1,
            selected_slot: 1,
        };
        assert_eq!(&event.encode()[..], &[0x00, 0x40, 0, 0, 0, 1, 1]);
        assert_eq!(decode_event(&event.encode()).unwrap(), event);
    }
