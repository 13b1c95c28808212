//! Application settings loaded from `config.yaml`
//!
//! Missing file or unreadable content degrades to defaults; individual CLI
//! flags override whatever the file supplies.

use crate::Result;
use anyhow::bail;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Clash profile to annotate
    pub yaml_path: String,
    /// Base URL of the daemon control API
    pub clash_api_url: String,
    /// Bearer token for the control API; empty is allowed
    pub clash_api_secret: String,
    /// Selector group whose active member is switched per node
    pub selector_name: String,
    /// Suffix inserted before the extension of the output file name
    pub output_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            yaml_path: String::new(),
            clash_api_url: "http://127.0.0.1:9097".to_string(),
            clash_api_secret: String::new(),
            selector_name: "GLOBAL".to_string(),
            output_suffix: "_checked".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, falling back to defaults when the
    /// file is missing or malformed
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                println!("Error loading config file: {}", e);
                return Self::default();
            }
        };
        match serde_yaml::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                println!("Error parsing config file: {}", e);
                Self::default()
            }
        }
    }

    /// Check that the essential fields are usable before starting a run
    pub fn validate(&self) -> Result<()> {
        if self.yaml_path.is_empty() {
            bail!("No Clash profile given; set yaml_path in config.yaml or pass one on the command line");
        }
        if !Path::new(&self.yaml_path).exists() {
            bail!("Clash profile not found at {}", self.yaml_path);
        }
        Ok(())
    }
}
