use clap::ArgMatches;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::devices::velocity::VELOCITY_REGISTER_COUNT;
use crate::modbus::protocol::{MAX_READ_QUANTITY, MIN_READ_QUANTITY};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub plc_host: String,
    pub plc_port: u16,
    pub timeout_ms: u64,

    // Register block
    pub unit_id: u8,
    pub start_address: u16,
    pub register_count: u16,

    // Publishing settings
    pub update_interval_ms: u64,
    pub topic: String,

    // Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub file_output: Option<FileOutputConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutputConfig {
    pub enabled: bool,
    pub path: String,
    pub append: bool,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./data/cmd_vel.jsonl".to_string(),
            append: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "console".to_string(),
            file_output: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plc_host: "192.168.8.10".to_string(),
            plc_port: 502,
            timeout_ms: 3000,

            unit_id: 1,
            start_address: 0,
            register_count: VELOCITY_REGISTER_COUNT as u16,

            update_interval_ms: 1000,
            topic: "/cmd_vel".to_string(),

            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then the optional `--config` file, then individual flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => {
                info!("📄 Loading configuration from {}", path);
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        config.apply_matches(matches)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), ModbusError> {
        if let Some(host) = matches.get_one::<String>("host") {
            self.plc_host = host.clone();
        }
        if let Some(port) = matches.get_one::<String>("port") {
            self.plc_port = parse_flag("port", port)?;
        }
        if let Some(unit_id) = matches.get_one::<String>("unit-id") {
            self.unit_id = parse_flag("unit-id", unit_id)?;
        }
        if let Some(interval) = matches.get_one::<String>("interval-ms") {
            self.update_interval_ms = parse_flag("interval-ms", interval)?;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout-ms") {
            self.timeout_ms = parse_flag("timeout-ms", timeout)?;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            self.output.default_format = format.clone();
        }
        if let Some(path) = matches.get_one::<String>("output-file") {
            self.output.file_output = Some(FileOutputConfig {
                enabled: true,
                path: path.clone(),
                append: true,
            });
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModbusError::ConfigError(format!("Cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.plc_host.trim().is_empty() {
            return Err(ModbusError::ConfigError("plc_host must not be empty".to_string()));
        }
        if !(MIN_READ_QUANTITY..=MAX_READ_QUANTITY).contains(&self.register_count) {
            return Err(ModbusError::ConfigError(format!(
                "register_count {} outside {}..={}",
                self.register_count, MIN_READ_QUANTITY, MAX_READ_QUANTITY
            )));
        }
        if (self.register_count as usize) < VELOCITY_REGISTER_COUNT {
            return Err(ModbusError::ConfigError(format!(
                "register_count {} is too small, a twist needs {} registers",
                self.register_count, VELOCITY_REGISTER_COUNT
            )));
        }
        if self.update_interval_ms == 0 {
            return Err(ModbusError::ConfigError("update_interval_ms must be > 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::ConfigError("timeout_ms must be > 0".to_string()));
        }
        match self.output.default_format.as_str() {
            "console" | "json" | "csv" => Ok(()),
            other => Err(ModbusError::ConfigError(format!("Unknown output format '{}'", other))),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.plc_host, self.plc_port)
    }
}

fn parse_flag<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ModbusError> {
    value
        .parse()
        .map_err(|_| ModbusError::ConfigError(format!("Invalid value for --{}: '{}'", name, value)))
}
