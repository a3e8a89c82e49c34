use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, TaskPilotError};

fn validate_ratio(value: f32, name: &str, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{} must be between 0.0 and 1.0, got {}", name, value));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPilotConfig {
    pub admission: AdmissionConfig,
    pub lifecycle: LifecycleConfig,
    pub notification: NotificationConfig,
    pub quality: QualityConfig,
}

impl TaskPilotConfig {
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = config_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| TaskPilotError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.admission.default_limit == 0 {
            errors.push("admission.default_limit must be greater than 0".to_string());
        }
        for (key, limit) in &self.admission.model_limits {
            if *limit == 0 {
                errors.push(format!("admission.model_limits[{}] must be greater than 0", key));
            }
        }
        for (key, limit) in &self.admission.provider_limits {
            if *limit == 0 {
                errors.push(format!(
                    "admission.provider_limits[{}] must be greater than 0",
                    key
                ));
            }
        }

        if self.lifecycle.sweep_interval_secs == 0 {
            errors.push("lifecycle.sweep_interval_secs must be greater than 0".to_string());
        }
        if self.lifecycle.task_ttl_secs == 0 {
            errors.push("lifecycle.task_ttl_secs must be greater than 0".to_string());
        }

        validate_ratio(self.quality.pass_threshold, "quality.pass_threshold", &mut errors);
        validate_ratio(
            self.quality.polish_threshold,
            "quality.polish_threshold",
            &mut errors,
        );
        for (agent, threshold) in &self.quality.pass_threshold_overrides {
            validate_ratio(
                *threshold,
                &format!("quality.pass_threshold_overrides[{}]", agent),
                &mut errors,
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TaskPilotError::Config(errors.join("; ")))
        }
    }
}

/// Concurrency limits for admission buckets.
///
/// Capacity for a key resolves in priority order: explicit model-level
/// limit, then provider-level limit (the `provider/` prefix of the key),
/// then the global default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub default_limit: usize,
    pub model_limits: HashMap<String, usize>,
    pub provider_limits: HashMap<String, usize>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_limit: 2,
            model_limits: HashMap::new(),
            provider_limits: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Liveness sweep cadence while tasks are running.
    pub sweep_interval_secs: u64,
    /// Hard time-to-live per task, measured from launch.
    pub task_ttl_secs: u64,
    /// Minimum gap between staleness reap passes.
    pub reap_cooldown_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 2,
            task_ttl_secs: 30 * 60,
            reap_cooldown_secs: 60,
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    pub fn reap_cooldown(&self) -> Duration {
        Duration::from_secs(self.reap_cooldown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Grace delay before a completion message is delivered, letting any
    /// final state settle.
    pub delivery_grace_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            delivery_grace_ms: 500,
        }
    }
}

impl NotificationConfig {
    pub fn delivery_grace(&self) -> Duration {
        Duration::from_millis(self.delivery_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Per-dimension pass threshold.
    pub pass_threshold: f32,
    /// Overall score at or above which a non-passing result is still only
    /// polished rather than rewritten.
    pub polish_threshold: f32,
    /// Rewrite attempts allowed per (session, agent type) before escalation.
    pub max_rewrite_attempts: u32,
    /// Agent-type specific pass thresholds, overriding the global one.
    pub pass_threshold_overrides: HashMap<String, f32>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 0.70,
            polish_threshold: 0.80,
            max_rewrite_attempts: 2,
            pass_threshold_overrides: HashMap::new(),
        }
    }
}

impl QualityConfig {
    pub fn pass_threshold_for(&self, agent_type: &str) -> f32 {
        self.pass_threshold_overrides
            .get(agent_type)
            .copied()
            .unwrap_or(self.pass_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TaskPilotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.admission.default_limit, 2);
        assert_eq!(config.lifecycle.task_ttl_secs, 1800);
        assert_eq!(config.quality.max_rewrite_attempts, 2);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = TaskPilotConfig::default();
        config.admission.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_thresholds() {
        let mut config = TaskPilotConfig::default();
        config.quality.pass_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pass_threshold_override() {
        let mut config = QualityConfig::default();
        config
            .pass_threshold_overrides
            .insert("writer".to_string(), 0.85);
        assert_eq!(config.pass_threshold_for("writer"), 0.85);
        assert_eq!(config.pass_threshold_for("researcher"), 0.70);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskPilotConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.admission.default_limit, 2);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = TaskPilotConfig::default();
        config.admission.default_limit = 4;
        config
            .admission
            .model_limits
            .insert("anthropic/sonnet".to_string(), 1);
        config.quality.max_rewrite_attempts = 3;
        config.save(dir.path()).await.unwrap();

        let loaded = TaskPilotConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.admission.default_limit, 4);
        assert_eq!(
            loaded.admission.model_limits.get("anthropic/sonnet"),
            Some(&1)
        );
        assert_eq!(loaded.quality.max_rewrite_attempts, 3);
    }
}
