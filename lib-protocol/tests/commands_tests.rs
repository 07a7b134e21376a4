// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_protocol::commands::*;
use bytes::Bytes;

    #[test]
    fn test_stop_user_program() {
        assert_eq!(&encode_command(&Command::StopUserProgram)[..], &[0x00]);
    }

    #[test]
    fn test_start_user_program_without_slot() {
        let cmd = Command::StartUserProgram { slot: None };
        assert_eq!(&cmd.encode()[..], &[0x01]);
    }

    #[test]
    fn test_start_user_program_with_slot() {
        let cmd = Command::StartUserProgram { slot: Some(3) };
        assert_eq!(&cmd.encode()[..], &[0x01, 0x03]);
    }

    #[test]
    fn test_start_repl() {
        assert_eq!(&Command::StartRepl.encode()[..], &[0x02]);
    }

    #[test]
    fn test_write_user_program_meta() {
        let cmd = Command::WriteUserProgramMeta { size: 100 };
        assert_eq!(&cmd.encode()[..], &[0x03, 0x64, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_write_user_ram() {
        let cmd = Command::WriteUserRam {
            offset: 100,
            payload: Bytes::from_static(&[1, 2, 3, 4]),
        };
        assert_eq!(
            &cmd.encode()[..],
            &[0x04, 0x64, 0x00, 0x00, 0x00, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_reset_in_update_mode() {
        assert_eq!(&Command::ResetInUpdateMode.encode()[..], &[0x05]);
    }

    #[test]
    fn test_write_stdin_has_no_header() {
        let cmd = Command::WriteStdin {
            payload: Bytes::from_static(b"hi\r\n"),
        };
        assert_eq!(&cmd.encode()[..], b"\x06hi\r\n");
    }

    #[test]
    fn test_write_app_data() {
        let cmd = Command::WriteAppData {
            offset: 0x0102,
            payload: Bytes::from_static(&[9, 8]),
        };
        assert_eq!(&cmd.encode()[..], &[0x07, 0x02, 0x01, 9, 8]);
    }

    #[test]
    fn test_command_type_discriminants() {
        assert_eq!(u8::from(CommandType::StopUserProgram), 0);
        assert_eq!(u8::from(CommandType::WriteStdin), 6);
        assert_eq!(
            Command::WriteUserProgramMeta { size: 0 }.command_type(),
            CommandType::WriteUserProgramMeta
        );
    }

    #[test]
    fn test_display() {
        let cmd = Command::WriteUserRam {
            offset: 20,
            payload: Bytes::from_static(&[0; 15]),
        };
        assert_eq!(cmd.to_string(), "WriteUserRam { offset: 20, len: 15 }");
        assert_eq!(Command::StopUserProgram.to_string(), "StopUserProgram");
    }
