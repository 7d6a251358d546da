use assert_fs::prelude::*;
use tomcat_runner::config::{
    Config, DEFAULT_IDLE_FLUSH_MS, ServerConfig, validate_config, validate_server_config,
};
use tomcat_runner::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

const MANAGER_CONFIG: &str = r#"{
    "Servers": {
        "dev": { "AppServer": "tomcat7", "contextPath": "/app" },
        "qa": { "AppServer": "tomcat8" }
    },
    "AppServers": {
        "tomcat7": { "path": "/opt/tomcat7" },
        "tomcat8": { "path": "/opt/tomcat8", "script": "tomcat8" }
    },
    "Supervisor": { "eventCapacity": 32, "stopTimeoutMs": 1500 }
}"#;

#[test]
fn test_parse_config() -> Result<()> {
    let config = Config::parse_from_str(MANAGER_CONFIG)?;

    assert_eq!(config.server_names(), vec!["dev", "qa"]);
    assert_eq!(config.supervisor.event_capacity, 32);
    assert_eq!(config.supervisor.command_capacity, 64);
    assert_eq!(config.supervisor.stop_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(
        config.supervisor.idle_flush(),
        Some(Duration::from_millis(DEFAULT_IDLE_FLUSH_MS))
    );

    let dev = config.server_config("dev")?;
    assert_eq!(dev.path, PathBuf::from("/opt/tomcat7"));
    assert_eq!(dev.script, "catalina");
    assert_eq!(dev.settings["contextPath"], "/app");

    let qa = config.server_config("qa")?;
    assert_eq!(qa.script, "tomcat8");
    assert_eq!(qa.app_server.as_deref(), Some("tomcat8"));

    validate_config(&config)
}

#[test]
fn test_load_json_file() -> Result<()> {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child(".tomcat-manager.json");
    file.write_str(MANAGER_CONFIG).unwrap();

    let config = Config::from_file(file.path())?;
    assert_eq!(config.servers.len(), 2);

    Ok(())
}

#[test]
fn test_load_yaml_file() -> Result<()> {
    let dir = assert_fs::TempDir::new().unwrap();
    let file = dir.child("servers.yaml");
    file.write_str(
        "Servers:\n  dev:\n    AppServer: tomcat7\n    port: 8080\nAppServers:\n  tomcat7:\n    path: /opt/tomcat7\n",
    )
    .unwrap();

    let config = Config::from_file(file.path())?;
    let dev = config.server_config("dev")?;
    assert_eq!(dev.path, PathBuf::from("/opt/tomcat7"));
    assert_eq!(dev.settings["port"], 8080);

    Ok(())
}

#[test]
fn test_missing_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let result = Config::from_file(dir.child("absent.json").path());
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_malformed_config() {
    assert!(matches!(
        Config::parse_from_str("{ \"Servers\": "),
        Err(Error::ConfigParse(_))
    ));
    assert!(matches!(
        Config::parse_from_str(r#"{ "Servers": { "dev": {} } }"#),
        Err(Error::ConfigParse(_))
    ));
}

#[test]
fn test_validate_config() -> Result<()> {
    let dangling = Config::parse_from_str(r#"{ "Servers": { "dev": { "AppServer": "nope" } } }"#)?;
    assert!(matches!(validate_config(&dangling), Err(Error::ConfigInvalid(_))));

    let empty_path = Config::parse_from_str(r#"{ "AppServers": { "t": { "path": "" } } }"#)?;
    assert!(matches!(validate_config(&empty_path), Err(Error::ConfigInvalid(_))));

    let traversal =
        Config::parse_from_str(r#"{ "AppServers": { "t": { "path": "/opt", "script": "../evil" } } }"#)?;
    assert!(matches!(validate_config(&traversal), Err(Error::ConfigInvalid(_))));

    let no_queue = Config::parse_from_str(r#"{ "Supervisor": { "commandCapacity": 0 } }"#)?;
    assert!(matches!(validate_config(&no_queue), Err(Error::ConfigInvalid(_))));

    Ok(())
}

#[test]
fn test_validate_server_config() {
    assert!(validate_server_config(&ServerConfig::new("dev", "/opt/tomcat7")).is_ok());
    assert!(validate_server_config(&ServerConfig::new("", "/opt/tomcat7")).is_err());
    assert!(validate_server_config(&ServerConfig::new("dev", "")).is_err());
    assert!(
        validate_server_config(&ServerConfig::new("dev", "/opt").with_script("bin\\catalina")).is_err()
    );
}
