//! Configuration
//!
//! Settings for both instruments, loadable from a JSON file. Every field has
//! a default so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::LuxError;
use crate::transport::{ByteSize, Parity, TransportConfig};

/// Config file name inside the user configuration directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// What to do when the CL-200A does not acknowledge a handshake step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakePolicy {
    /// Log the failure and carry on; the meter often works without the ack
    #[default]
    Lenient,
    /// Abort construction
    Strict,
}

/// CL-200A settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cl200aConfig {
    /// Explicit port; discovered by manufacturer when unset
    pub port: Option<String>,
    /// USB manufacturer string used for discovery
    pub manufacturer: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub byte_size: ByteSize,
    /// Longest wait for one response line
    pub timeout_ms: u64,
    /// Gap after mode commands (PC connection, hold, EXT trigger)
    pub mode_settle_ms: u64,
    /// Gap after the EXT mode command
    pub ext_settle_ms: u64,
    pub handshake_policy: HandshakePolicy,
}

impl Default for Cl200aConfig {
    fn default() -> Self {
        Self {
            port: None,
            manufacturer: "Konica Minolta".to_string(),
            baud_rate: 9600,
            parity: Parity::Even,
            byte_size: ByteSize::Seven,
            timeout_ms: 3000,
            mode_settle_ms: 500,
            ext_settle_ms: 125,
            handshake_policy: HandshakePolicy::Lenient,
        }
    }
}

impl Cl200aConfig {
    /// Line settings for `port`
    pub fn transport(&self, port: &str) -> TransportConfig {
        TransportConfig::new(port, self.baud_rate, Duration::from_millis(self.timeout_ms))
            .parity(self.parity)
            .byte_size(self.byte_size)
    }

    pub(crate) fn mode_settle(&self) -> Duration {
        Duration::from_millis(self.mode_settle_ms)
    }

    pub(crate) fn ext_settle(&self) -> Duration {
        Duration::from_millis(self.ext_settle_ms)
    }
}

/// UT382 settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ut382Config {
    /// Explicit port; discovered by manufacturer when unset
    pub port: Option<String>,
    /// USB manufacturer string used for discovery (CP210x bridge)
    pub manufacturer: String,
    pub baud_rate: u32,
    /// Per-byte timeout while hunting for a frame boundary
    pub sync_timeout_ms: u64,
    /// Timeout for whole-frame reads once locked
    pub locked_timeout_ms: u64,
    /// Nominal frame rate, used to size the averaging window
    pub sample_rate_hz: f64,
    /// "Waiting for device" notices before the USB mode hint
    pub waiting_notices: u32,
}

impl Default for Ut382Config {
    fn default() -> Self {
        Self {
            port: None,
            manufacturer: "Silicon Labs".to_string(),
            baud_rate: 19200,
            sync_timeout_ms: 20,
            locked_timeout_ms: 200,
            sample_rate_hz: 8.0,
            waiting_notices: 10,
        }
    }
}

impl Ut382Config {
    /// Line settings for `port` (8N1)
    pub fn transport(&self, port: &str) -> TransportConfig {
        TransportConfig::new(port, self.baud_rate, self.locked_timeout())
    }

    pub(crate) fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub(crate) fn locked_timeout(&self) -> Duration {
        Duration::from_millis(self.locked_timeout_ms)
    }

    /// Number of readings averaged over `seconds`
    pub fn window_len(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate_hz).ceil().max(1.0) as usize
    }
}

/// Settings for every supported instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuxConfig {
    pub cl200a: Cl200aConfig,
    pub ut382: Ut382Config,
}

impl LuxConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LuxError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LuxError::Config(format!("{}: {}", path.display(), e)))?;
        let config: LuxConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, LuxError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("loading configuration from {}", path.display());
                Self::from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LuxError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|e| LuxError::Config(format!("{}: {}", path.display(), e)))
    }

    fn validate(&self) -> Result<(), LuxError> {
        if self.ut382.sample_rate_hz <= 0.0 || !self.ut382.sample_rate_hz.is_finite() {
            return Err(LuxError::Config(format!(
                "ut382.sample_rate_hz must be positive, got {}",
                self.ut382.sample_rate_hz
            )));
        }
        if self.cl200a.baud_rate == 0 || self.ut382.baud_rate == 0 {
            return Err(LuxError::Config("baud_rate must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// `<config dir>/luxmeters/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("luxmeters").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = LuxConfig::default();
        assert_eq!(config.cl200a.baud_rate, 9600);
        assert_eq!(config.cl200a.parity, Parity::Even);
        assert_eq!(config.cl200a.byte_size, ByteSize::Seven);
        assert_eq!(config.ut382.baud_rate, 19200);
        assert_eq!(config.ut382.window_len(2.0), 16);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "cl200a": { "port": "/dev/ttyUSB3", "handshake_policy": "strict" } }"#,
        )
        .unwrap();

        let config = LuxConfig::from_file(&path).unwrap();
        assert_eq!(config.cl200a.port.as_deref(), Some("/dev/ttyUSB3"));
        assert_eq!(config.cl200a.handshake_policy, HandshakePolicy::Strict);
        assert_eq!(config.cl200a.timeout_ms, 3000);
        assert_eq!(config.ut382, Ut382Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = LuxConfig::default();
        config.ut382.sample_rate_hz = 10.0;
        config.save(&path).unwrap();
        assert_eq!(LuxConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "ut382": { "sample_rate_hz": 0 } }"#).unwrap();
        assert!(matches!(LuxConfig::from_file(&path), Err(LuxError::Config(_))));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(LuxConfig::from_file(&path), Err(LuxError::ConfigParse(_))));
    }
}
