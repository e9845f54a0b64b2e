//! Shared configuration and error types for the covermatch services.

pub mod config;
pub mod errors;
pub mod settings;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{ApplicationError, InterfaceError};
pub use settings::{EnvSource, MissingSettings, SearchSettings, SettingsSource};
