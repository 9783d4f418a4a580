use crate::backend::{DEFAULT_CIRCUIT_TIMEOUT, DEFAULT_MAX_CONSECUTIVE_ERRORS};
use log::{info, warn};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
  pub listen_port: u16,
  #[serde(default = "default_health_check_interval")]
  pub health_check_interval: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_algorithm")]
  pub algorithm: String,
  #[serde(default = "default_max_consecutive_errors")]
  pub max_consecutive_errors: u32,
  /// Seconds an open circuit suppresses selection before closing again.
  #[serde(default = "default_circuit_timeout")]
  pub circuit_timeout: u64,
  pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
  pub url: String,
  #[serde(default = "default_weight")]
  pub weight: u32,
}

fn default_health_check_interval() -> u64 {
  30
}

fn default_max_retries() -> u32 {
  3
}

fn default_algorithm() -> String {
  "round-robin".to_string()
}

fn default_max_consecutive_errors() -> u32 {
  DEFAULT_MAX_CONSECUTIVE_ERRORS
}

fn default_circuit_timeout() -> u64 {
  DEFAULT_CIRCUIT_TIMEOUT.as_secs()
}

fn default_weight() -> u32 {
  1
}

impl Config {
  pub fn new(toml_path: &str) -> Option<Config> {
    let toml_str = match fs::read_to_string(toml_path) {
      Ok(toml_str) => toml_str,
      Err(e) => {
        warn!("Error occurred when reading configuration file {}: {}", toml_path, e);
        return None;
      }
    };

    match toml::from_str::<Config>(&toml_str) {
      Ok(config) => {
        info!("Successfully parsed configuration!");
        config.print_warnings();
        Some(config)
      }
      Err(e) => {
        warn!("Error occurred when parsing configuration file {}: {}", toml_path, e);
        None
      }
    }
  }

  fn print_warnings(&self) {
    if self.backends.is_empty() {
      warn!("no backends configured. Every request will result in service-not-available errors.");
    }

    if self.health_check_interval == 0 {
      warn!("health_check_interval is 0, backends will be probed every second instead.");
    }

    for backend in &self.backends {
      if backend.weight == 0 {
        warn!("backend {} has weight 0, it will be treated as weight 1.", backend.url);
      }
    }
  }
}
