//! TOML settings for the modelprops assistant.
//!
//! Each subsystem owns a section: `[llm]`, `[aps]`, `[agent]`, `[poll]`,
//! `[transform]` and `[session]`. A project file overrides the user file
//! section by section, and the model API key is taken from the environment
//! before the file.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, config_dir, load_config, load_config_file,
    load_config_with_options,
};
pub use error::{ConfigError, Result};
pub use types::*;
