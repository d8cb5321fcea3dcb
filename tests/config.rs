// ABOUTME: Tests for resolving dockhand.yml plus command-line overrides into a RunConfig.
// ABOUTME: Token sources, key discovery, derived paths, and the exit codes of each failure.

use dockhand::config::{FileConfig, Overrides, RunConfig, RunMode};
use dockhand::error::{Error, exit};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A home directory with `~/.ssh/<key>`.
fn home_with_key(key: &str) -> TempDir {
    let home = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(home.path().join(".ssh")).unwrap();
    std::fs::write(home.path().join(".ssh").join(key), "not a real key\n").unwrap();
    home
}

fn overrides() -> Overrides {
    Overrides {
        repository: Some("https://github.com/acme/shop-api.git".to_string()),
        token: Some("ghp_cli".to_string()),
        server: Some("203.0.113.7".to_string()),
        user: Some("deploy".to_string()),
        app_port: Some(3000),
        ..Default::default()
    }
}

fn resolve(file: Option<FileConfig>, overrides: Overrides, home: &Path) -> Result<RunConfig, Error> {
    RunConfig::resolve(file, overrides, Path::new("/work"), Some(home))
}

#[test]
fn command_line_only_resolves_with_defaults() {
    let home = home_with_key("id_ed25519");
    let config = resolve(None, overrides(), home.path()).unwrap();

    assert_eq!(config.mode, RunMode::Deploy);
    assert_eq!(config.source.repo.as_str(), "shop-api");
    assert_eq!(config.source.branch.as_str(), "main");
    assert_eq!(config.source.local_path, Path::new("/work/shop-api"));
    assert_eq!(config.source.token.expose(), "ghp_cli");
    assert_eq!(config.target.port, 22);
    assert_eq!(config.target.key_path, home.path().join(".ssh/id_ed25519"));
    assert_eq!(
        config.target.remote_dir.as_str(),
        "/home/deploy/deployments/shop-api"
    );
    assert_eq!(config.app.published_port(), 3000);
}

#[test]
fn root_deploys_under_root_home() {
    let home = home_with_key("id_ed25519");
    let config = resolve(
        None,
        Overrides {
            user: Some("root".to_string()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap();

    assert_eq!(
        config.target.remote_dir.as_str(),
        "/root/deployments/shop-api"
    );
}

#[test]
fn command_line_wins_over_file() {
    let home = home_with_key("id_ed25519");
    let file = FileConfig::from_yaml(
        r#"
repository: https://github.com/acme/other.git
branch: develop
server: ops@198.51.100.2:2200
app_port: 8000
host_port: 9000
remote_dir: /srv/apps/other
"#,
    )
    .unwrap();

    let config = resolve(
        Some(file),
        Overrides {
            branch: Some("release".to_string()),
            ssh_port: Some(2222),
            host_port: Some(8081),
            ..overrides()
        },
        home.path(),
    )
    .unwrap();

    assert_eq!(config.source.repo.as_str(), "shop-api");
    assert_eq!(config.source.branch.as_str(), "release");
    assert_eq!(config.target.host, "203.0.113.7");
    assert_eq!(config.target.port, 2222);
    assert_eq!(config.target.user, "deploy");
    assert_eq!(config.app.app_port, 3000);
    assert_eq!(config.app.published_port(), 8081);
    assert_eq!(config.target.remote_dir.as_str(), "/srv/apps/other");
}

#[test]
fn token_can_come_from_environment_reference() {
    let home = home_with_key("id_ed25519");
    let file = FileConfig::from_yaml("token:\n  env: DOCKHAND_CONFIG_TEST_TOKEN\n").unwrap();

    temp_env::with_var("DOCKHAND_CONFIG_TEST_TOKEN", Some("ghp_from_env"), || {
        let config = resolve(
            Some(file.clone()),
            Overrides {
                token: None,
                ..overrides()
            },
            home.path(),
        )
        .unwrap();
        assert_eq!(config.source.token.expose(), "ghp_from_env");
    });
}

#[test]
fn missing_token_is_a_credentials_error() {
    let home = home_with_key("id_ed25519");
    let err = resolve(
        None,
        Overrides {
            token: None,
            ..overrides()
        },
        home.path(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::MissingCredentials(_)), "got {err:?}");
    assert_eq!(err.exit_code(), exit::MISSING_CREDENTIALS);
}

#[test]
fn unset_token_variable_is_a_credentials_error() {
    let home = home_with_key("id_ed25519");
    let file = FileConfig::from_yaml("token:\n  env: DOCKHAND_CONFIG_TEST_UNSET\n").unwrap();

    temp_env::with_var_unset("DOCKHAND_CONFIG_TEST_UNSET", || {
        let err = resolve(
            Some(file.clone()),
            Overrides {
                token: None,
                ..overrides()
            },
            home.path(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), exit::MISSING_CREDENTIALS);
    });
}

#[test]
fn blank_token_is_rejected() {
    let home = home_with_key("id_ed25519");
    let err = resolve(
        None,
        Overrides {
            token: Some("   ".to_string()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap_err();

    assert_eq!(err.exit_code(), exit::MISSING_CREDENTIALS);
}

#[test]
fn explicit_key_must_exist() {
    let home = home_with_key("id_ed25519");
    let err = resolve(
        None,
        Overrides {
            key: Some(home.path().join("missing_key")),
            ..overrides()
        },
        home.path(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::MissingKey(_)), "got {err:?}");
    assert_eq!(err.exit_code(), exit::MISSING_KEY);
}

#[test]
fn default_key_lookup_falls_back_to_rsa() {
    let home = home_with_key("id_rsa");
    let config = resolve(None, overrides(), home.path()).unwrap();
    assert_eq!(config.target.key_path, home.path().join(".ssh/id_rsa"));
}

#[test]
fn no_default_key_is_a_missing_key_error() {
    let home = tempfile::tempdir().unwrap();
    let err = resolve(None, overrides(), home.path()).unwrap_err();
    assert_eq!(err.exit_code(), exit::MISSING_KEY);
}

#[test]
fn tilde_in_key_path_expands_to_home() {
    let home = home_with_key("deploy_key");
    let config = resolve(
        None,
        Overrides {
            key: Some("~/.ssh/deploy_key".into()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap();
    assert_eq!(config.target.key_path, home.path().join(".ssh/deploy_key"));
}

#[test]
fn non_http_repository_is_an_input_error() {
    let home = home_with_key("id_ed25519");
    let err = resolve(
        None,
        Overrides {
            repository: Some("git@github.com:acme/shop-api.git".to_string()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Input(_)), "got {err:?}");
    assert_eq!(err.exit_code(), exit::INPUT);
}

#[test]
fn missing_required_values_are_input_errors() {
    let home = home_with_key("id_ed25519");
    for overrides in [
        Overrides {
            repository: None,
            ..overrides()
        },
        Overrides {
            server: None,
            ..overrides()
        },
        Overrides {
            user: None,
            ..overrides()
        },
        Overrides {
            app_port: None,
            ..overrides()
        },
        Overrides {
            app_port: Some(0),
            ..overrides()
        },
    ] {
        let err = resolve(None, overrides, home.path()).unwrap_err();
        assert_eq!(err.exit_code(), exit::INPUT, "got {err:?}");
    }
}

#[test]
fn shallow_remote_dir_is_rejected() {
    let home = home_with_key("id_ed25519");
    let err = resolve(
        None,
        Overrides {
            remote_dir: Some("/srv".to_string()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), exit::INPUT);
}

#[test]
fn cleanup_and_dry_run_flags_carry_through() {
    let home = home_with_key("id_ed25519");
    let config = resolve(
        None,
        Overrides {
            cleanup: true,
            dry_run: true,
            ..overrides()
        },
        home.path(),
    )
    .unwrap();

    assert_eq!(config.mode, RunMode::Cleanup);
    assert!(config.dry_run);
}

#[test]
fn relative_workspace_is_anchored_at_cwd() {
    let home = home_with_key("id_ed25519");
    let config = resolve(
        None,
        Overrides {
            workspace: Some("checkouts".into()),
            ..overrides()
        },
        home.path(),
    )
    .unwrap();
    assert_eq!(
        config.source.local_path,
        Path::new("/work/checkouts/shop-api")
    );
}

#[test]
fn timeouts_come_from_file() {
    let home = home_with_key("id_ed25519");
    let file = FileConfig::from_yaml("timeouts:\n  settle: 0s\n  http: 750ms\n").unwrap();
    let config = resolve(Some(file), overrides(), home.path()).unwrap();

    assert_eq!(config.timeouts.settle, Duration::ZERO);
    assert_eq!(config.timeouts.http, Duration::from_millis(750));
    assert_eq!(config.timeouts.connect, Duration::from_secs(10));
}

#[test]
fn discover_finds_file_in_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(FileConfig::discover(dir.path()).unwrap().is_none());

    std::fs::write(dir.path().join("dockhand.yml"), "app_port: 5000\n").unwrap();
    let file = FileConfig::discover(dir.path()).unwrap().unwrap();
    assert_eq!(file.app_port, Some(5000));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = FileConfig::from_yaml("app_prot: 5000\n").unwrap_err();
    assert_eq!(err.exit_code(), exit::INPUT);
}

#[test]
fn explicit_missing_config_file() {
    let err = FileConfig::load(Path::new("/nonexistent/dockhand.yml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound(_)));
}
