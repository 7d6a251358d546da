//! Configuration module for Tomcat Runner.
//!
//! This module handles parsing, validation, and access to server
//! configuration. Servers are declared by name and point at an application
//! server installation; the two are resolved into a [`ServerConfig`] that the
//! supervisor launches. Configurations load from JSON or YAML.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use tomcat_runner::config::Config;
//!
//! let config = Config::from_file(".tomcat-manager").unwrap();
//! println!("Loaded configuration with {} servers", config.servers.len());
//! ```
//!
//! Creating a configuration programmatically:
//! ```
//! use tomcat_runner::config::{AppServerConfig, Config, ServerEntry};
//! use std::collections::HashMap;
//!
//! let mut config = Config::default();
//! config.app_servers.insert(
//!     "tomcat7".to_string(),
//!     AppServerConfig {
//!         path: "/opt/tomcat7".into(),
//!         script: "catalina".to_string(),
//!         extra: Default::default(),
//!     },
//! );
//! config.servers.insert(
//!     "dev".to_string(),
//!     ServerEntry { app_server: "tomcat7".to_string(), settings: Default::default() },
//! );
//!
//! tomcat_runner::config::validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{
    AppServerConfig, Config, DEFAULT_COMMAND_CAPACITY, DEFAULT_EVENT_CAPACITY,
    DEFAULT_IDLE_FLUSH_MS, DEFAULT_SCRIPT, ServerConfig, ServerEntry, SupervisorConfig,
};
pub use validator::{validate_config, validate_server_config};
