use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};

/// Validates a resolved server descriptor before it is launched
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server has empty name".to_string()));
    }

    if config.path.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has empty path",
            config.name
        )));
    }

    validate_script(&config.name, &config.script)
}

// The script is joined onto `bin/`, so it must stay a bare file name.
fn validate_script(owner: &str, script: &str) -> Result<()> {
    if script.is_empty() {
        return Err(Error::ConfigInvalid(format!("'{}' has empty launch script", owner)));
    }

    if script.contains(['/', '\\']) || script == ".." {
        return Err(Error::ConfigInvalid(format!(
            "'{}' launch script '{}' must be a file name, not a path",
            owner, script
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    for (name, app_server) in &config.app_servers {
        if app_server.path.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "App server '{}' has empty path",
                name
            )));
        }
        validate_script(name, &app_server.script)?;
    }

    for (name, entry) in &config.servers {
        if !config.app_servers.contains_key(&entry.app_server) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' references unknown app server '{}'",
                name, entry.app_server
            )));
        }
    }

    if config.supervisor.event_capacity == 0 || config.supervisor.command_capacity == 0 {
        return Err(Error::ConfigInvalid(
            "Supervisor channel capacities must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
