// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use brickwire_cli::config::CONFIG_FILE_NAME;
use brickwire_cli::Config;
use brickwire_hub::DisconnectPolicy;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

    #[test]
    fn test_default_config_is_written() {
        let dir = TempDir::new().unwrap();
        let default_path = dir.path().join("brickwire").join(CONFIG_FILE_NAME);
        let search = vec![dir.path().join("missing.yaml")];

        let (config, path) = Config::load_or_create(&search, &default_path).unwrap();
        assert_eq!(path, default_path);
        assert_eq!(config, Config::default());

        // and reads back the same
        let reread = Config::from_file(&default_path).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_first_existing_file_wins() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("local.yaml");
        let user = dir.path().join("user.yaml");
        fs::write(&local, "hub:\n  name_prefix: Technic\n").unwrap();
        fs::write(&user, "hub:\n  name_prefix: Prime\n").unwrap();

        let (config, path) = Config::load_or_create(
            &[dir.path().join("missing.yaml"), local.clone(), user],
            &dir.path().join("default.yaml"),
        )
        .unwrap();
        assert_eq!(path, local);
        assert_eq!(config.hub.name_prefix.as_deref(), Some("Technic"));
        assert!(!dir.path().join("default.yaml").exists());
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "timing:\n  coalesce_window_ms: 50\n  disconnect_grace_ms: 300\nlogging:\n  level: debug\n  submodules:\n    brickwire_hub::correlator: trace\n",
        )
        .unwrap();

        let (config, _) = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.timing.coalesce_window_ms, 50);
        assert_eq!(config.timing.echo_wait_ms, 100);
        assert_eq!(config.timing.checksum_timeout_ms, 1000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.compiler.mpy_cross, "mpy-cross");
        assert!(config.hub.stop_on_connect);

        let settings = config.hub_settings();
        assert_eq!(settings.timing.coalesce_window(), Duration::from_millis(50));
        assert_eq!(
            settings.disconnect_policy(),
            DisconnectPolicy::Grace(Duration::from_millis(300))
        );
    }

    #[test]
    fn test_emulator_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "emulator:\n  firmware_revision: 3.1.0\n  software_revision: 1.1.0\n  hub_type: null\n",
        )
        .unwrap();

        let (config, _) = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.emulator.software_revision, "1.1.0");
        assert_eq!(config.emulator.hub_type, None);
        assert_eq!(config.emulator.max_write_size, 158);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(dir.path().join("nope.yaml").as_path())).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "hub: [unclosed\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
