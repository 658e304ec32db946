// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading the crawler
//! configuration and the streamer keyword registry from the storage
//! directory.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::models::{Config, StreamerKeywordSet};

/// Configuration file name inside the storage directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Streamer keyword registry file name inside the storage directory.
pub const REGISTRY_FILE: &str = "streamers.json";

/// Load configuration from `{storage_dir}/config.toml`.
///
/// Falls back to defaults (the deployed contract) if loading fails.
pub fn load_config(storage_dir: &Path) -> Config {
    Config::load_or_default(storage_dir.join(CONFIG_FILE))
}

/// Load the streamer keyword registry from `{storage_dir}/streamers.json`.
///
/// A missing registry is not an error: classification simply leaves every
/// record unclassified until the admin tooling writes one.
pub fn load_registry(storage_dir: &Path) -> Result<Vec<StreamerKeywordSet>> {
    let path = storage_dir.join(REGISTRY_FILE);
    if !path.exists() {
        log::warn!(
            "No streamer registry at {}, classification is disabled",
            path.display()
        );
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}
