//! Hierarchical run configuration, loaded from YAML.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::generator::{GenerationConfig, RequestClass};
use crate::policy::{PreemptionMode, PreemptionStrategy};

#[derive(Debug, Deserialize)]
pub struct SystemConfig {
    #[serde(rename = "M_total")]
    pub m_total: u64,
    #[serde(rename = "B")]
    pub b: u64,
    pub d_0: f64,
    pub d_1: f64,
}

#[derive(Debug, Deserialize)]
pub struct ControlConfig {
    pub preemption_mode: String,
    pub preemption_strategy: String,
    #[serde(default = "default_true")]
    pub allow_waiting_preempt: bool,
    #[serde(default = "default_queue_policy")]
    pub queue_policy: String,
    #[serde(default = "default_victim_policy")]
    pub victim_policy: String,
}

fn default_true() -> bool {
    true
}
fn default_queue_policy() -> String {
    "fcfs".to_string()
}
fn default_victim_policy() -> String {
    "lifo".to_string()
}

impl ControlConfig {
    pub fn mode(&self) -> Result<PreemptionMode, ConfigError> {
        match self.preemption_mode.as_str() {
            "swap" => Ok(PreemptionMode::Swap),
            "sacrifice" => Ok(PreemptionMode::Sacrifice),
            other => Err(ConfigError::InvalidPreemptionMode(other.to_string())),
        }
    }

    pub fn strategy(&self) -> Result<PreemptionStrategy, ConfigError> {
        match self.preemption_strategy.as_str() {
            "aggressive" => Ok(PreemptionStrategy::Aggressive),
            "conservative" => Ok(PreemptionStrategy::Conservative),
            other => Err(ConfigError::InvalidPreemptionStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    pub trace_path: PathBuf,
    #[serde(default = "default_experiments_dir")]
    pub experiments_dir: PathBuf,
    pub max_decode_length: Option<u64>,
}

fn default_experiments_dir() -> PathBuf {
    PathBuf::from("experiments")
}

#[derive(Debug, Deserialize)]
pub struct RequestClassConfig {
    pub prefill_length: u64,
    pub decode_length: u64,
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct GenerationConfigDoc {
    pub classes: Vec<RequestClassConfig>,
    pub num_requests: usize,
    pub seed: u64,
}

impl GenerationConfigDoc {
    pub fn to_generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            classes: self
                .classes
                .iter()
                .map(|c| RequestClass {
                    prefill_length: c.prefill_length,
                    decode_length: c.decode_length,
                    rate: c.rate,
                })
                .collect(),
            num_requests: self.num_requests,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TruncationConfig {
    pub batch_id: u64,
    pub new_generation: GenerationConfigDoc,
}

#[derive(Debug, Deserialize)]
pub struct AdmissionControlConfig {
    #[serde(default)]
    pub enabled: bool,
    pub threshold: f64,
}

impl AdmissionControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidAdmissionThreshold(self.threshold));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct InitialStateConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct StateSaveConfig {
    pub batch_ids: Vec<u64>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub control: ControlConfig,
    pub data: DataConfig,
    pub generation: Option<GenerationConfigDoc>,
    pub truncation: Option<TruncationConfig>,
    pub admission_control: Option<AdmissionControlConfig>,
    pub initial_state: Option<InitialStateConfig>,
    pub state_save: Option<StateSaveConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.control.mode()?;
        self.control.strategy()?;
        if let Some(ac) = &self.admission_control {
            ac.validate()?;
        }
        Ok(())
    }

    /// Requires `truncation.batch_id`, per spec's truncate-mode contract.
    pub fn require_truncation(&self) -> Result<&TruncationConfig, ConfigError> {
        self.truncation.as_ref().ok_or(ConfigError::MissingTruncationBatchId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
system:
  M_total: 1000
  B: 1000
  d_0: 0.003
  d_1: 0.00032
control:
  preemption_mode: sacrifice
  preemption_strategy: aggressive
data:
  trace_path: trace.csv
"#
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.system.m_total, 1000);
        assert!(matches!(config.control.mode().unwrap(), PreemptionMode::Sacrifice));
    }

    #[test]
    fn rejects_unknown_preemption_mode() {
        let bad = sample_yaml().replace("sacrifice", "frobnicate");
        let config: Config = serde_yaml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_admission_threshold_out_of_range() {
        let mut bad = sample_yaml().to_string();
        bad.push_str("admission_control:\n  enabled: true\n  threshold: 1.5\n");
        let config: Config = serde_yaml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }
}
