//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a minimal file only needs one `[[source]]` with
//! its URLs and an item selector.
//!
//! # Example
//!
//! ```no_run
//! use notice_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! for source in &config.sources {
//!     println!("{} -> {}", source.name, source.listing_url);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_date_formats, Config, ExtractConfig, FetchConfig, HarvestConfig, IdentityMode,
    OutputConfig, PaginationScheme, SelectorConfig, SourceConfig, StructuralPolicy,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_selector;
