use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// Emulator settings loaded from a YAML file. Every field has a
/// default so a partial (or missing) file still boots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bios: String,
    pub flash: Option<String>,
    pub log_level: String,
    /// Bit-exact FPU flag/cause bookkeeping. Slower; games do not need it.
    pub pedantic_fpu: bool,
    /// Pace execution against the wall clock.
    pub throttle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bios: String::from("dc_boot.bin"),
            flash: None,
            log_level: String::from("info"),
            pedantic_fpu: false,
            throttle: true,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> io::Result<Config> {
        let text = fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
