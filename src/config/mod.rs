//! Configuration module for Lex-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! All keys are optional; an absent file means "run with the defaults".
//!
//! # Example
//!
//! ```no_run
//! use lex_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("lex-harvest.toml")).unwrap();
//! println!("Harvesting {} records per page", config.search.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BatchConfig, Config, DocumentsConfig, HttpConfig, PublishConfig, PublishTarget, SearchConfig,
    StateConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_or_default, load_config_with_hash, parse_config,
};
