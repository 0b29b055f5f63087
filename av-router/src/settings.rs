//! Application settings

use std::path::PathBuf;

use av_protocol::Protocol;
use serde::{Deserialize, Serialize};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// HDMI matrix serial path; empty means discover it
    #[serde(default)]
    pub hdmi_serial_path: String,
    /// Component matrix serial path; empty means discover it
    #[serde(default)]
    pub component_serial_path: String,
    /// Which component matrix is installed
    #[serde(default = "default_component_protocol")]
    pub component_protocol: Protocol,
    /// HDMI baud rate, if not the protocol default
    #[serde(default)]
    pub hdmi_baud_rate: Option<u32>,
    /// Component baud rate, if not the protocol default
    #[serde(default)]
    pub component_baud_rate: Option<u32>,
    /// Run without hardware; every command succeeds immediately
    #[serde(default)]
    pub skip_matrices: bool,
    /// Drive in-process simulated matrices instead of serial ports
    #[serde(default)]
    pub simulate_matrices: bool,
}

fn default_component_protocol() -> Protocol {
    Protocol::Extron
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hdmi_serial_path: String::new(),
            component_serial_path: String::new(),
            component_protocol: default_component_protocol(),
            hdmi_baud_rate: None,
            component_baud_rate: None,
            skip_matrices: false,
            simulate_matrices: false,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for avrouter
    /// Uses $XDG_CONFIG_HOME/avrouter, falls back to ~/.config/avrouter
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("avrouter"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("avrouter"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, then apply environment overrides
    pub fn load() -> Self {
        let mut settings: Self = Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Apply `HDMI_SERIAL_PATH`, `COMPONENT_SERIAL_PATH`, `SKIP_MATRICES`
    /// and `SIMULATE_MATRICES` as returned by `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("HDMI_SERIAL_PATH") {
            self.hdmi_serial_path = path;
        }
        if let Some(path) = lookup("COMPONENT_SERIAL_PATH") {
            self.component_serial_path = path;
        }
        if let Some(flag) = lookup("SKIP_MATRICES") {
            self.skip_matrices = is_truthy(&flag);
        }
        if let Some(flag) = lookup("SIMULATE_MATRICES") {
            self.simulate_matrices = is_truthy(&flag);
        }
    }

    /// Configured HDMI path, if any
    pub fn hdmi_path(&self) -> Option<String> {
        non_empty(&self.hdmi_serial_path)
    }

    /// Configured component path, if any
    pub fn component_path(&self) -> Option<String> {
        non_empty(&self.component_serial_path)
    }
}

fn non_empty(path: &str) -> Option<String> {
    let path = path.trim();
    (!path.is_empty()).then(|| path.to_string())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
