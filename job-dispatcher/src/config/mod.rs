//! Placement policy configuration.
//!
//! The tunables of the priority formula (bootstrap bandwidth, idle bonus,
//! warm-up threshold) were picked by hand and are not load-bearing, so they
//! live in an optional YAML file instead of in code.
//!
//! The expected YAML structure is:
//! ```yaml
//! policy:
//!   default_bandwidth: 50.0
//!   idle_bonus: 10.0
//!   warmup_load: 1000.0
//!   completion_epsilon: 0.1
//!   default_job_size: 100.0
//! ```
//!
//! Every key is optional; missing keys keep their default.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_BANDWIDTH: f64 = 50.0;
pub const DEFAULT_IDLE_BONUS: f64 = 10.0;
pub const DEFAULT_WARMUP_LOAD: f64 = 1000.0;
pub const DEFAULT_COMPLETION_EPSILON: f64 = 0.1;
pub const DEFAULT_JOB_SIZE: f64 = 100.0;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct PolicyConfigFile {
    #[serde(default)]
    policy: PolicyConfigEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyConfigEntry {
    default_bandwidth: Option<f64>,
    idle_bonus: Option<f64>,
    warmup_load: Option<f64>,
    completion_epsilon: Option<f64>,
    default_job_size: Option<f64>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Tunables of the placement policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Bandwidth every worker is assumed to have until a probe resolves.
    pub default_bandwidth: f64,
    /// Added to an idle worker's bandwidth when computing its priority.
    pub idle_bonus: f64,
    /// Completed load after which priorities are scaled by completion share.
    pub warmup_load: f64,
    /// Added to each worker's completion count in the share numerator.
    pub completion_epsilon: f64,
    /// Seed of the default-load fallback for unknown-size jobs.
    pub default_job_size: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_bandwidth: DEFAULT_BANDWIDTH,
            idle_bonus: DEFAULT_IDLE_BONUS,
            warmup_load: DEFAULT_WARMUP_LOAD,
            completion_epsilon: DEFAULT_COMPLETION_EPSILON,
            default_job_size: DEFAULT_JOB_SIZE,
        }
    }
}

impl PolicyConfig {
    /// Parses `path`, filling absent keys with defaults, and validates the
    /// result.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading policy configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let cfg = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        info!(
            default_bandwidth = cfg.default_bandwidth,
            idle_bonus = cfg.idle_bonus,
            warmup_load = cfg.warmup_load,
            completion_epsilon = cfg.completion_epsilon,
            default_job_size = cfg.default_job_size,
            "Policy configuration loaded"
        );
        Ok(cfg)
    }

    /// Parses a YAML document directly.  An empty document yields defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let entry = if content.trim().is_empty() {
            PolicyConfigEntry::default()
        } else {
            let file: PolicyConfigFile =
                serde_yaml::from_str(content).context("Failed to parse YAML")?;
            file.policy
        };

        let defaults = Self::default();
        let cfg = Self {
            default_bandwidth: entry.default_bandwidth.unwrap_or(defaults.default_bandwidth),
            idle_bonus: entry.idle_bonus.unwrap_or(defaults.idle_bonus),
            warmup_load: entry.warmup_load.unwrap_or(defaults.warmup_load),
            completion_epsilon: entry
                .completion_epsilon
                .unwrap_or(defaults.completion_epsilon),
            default_job_size: entry.default_job_size.unwrap_or(defaults.default_job_size),
        };
        debug!(?cfg, "parsed policy configuration");

        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks.  Bandwidth and bonus must be strictly positive so every
    /// priority stays positive and the idle bonus always breaks ties.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("default_bandwidth", self.default_bandwidth),
            ("idle_bonus", self.idle_bonus),
            ("warmup_load", self.warmup_load),
            ("completion_epsilon", self.completion_epsilon),
            ("default_job_size", self.default_job_size),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                bail!("{} must be finite, got {}", name, v);
            }
        }
        if self.default_bandwidth <= 0.0 {
            bail!(
                "default_bandwidth must be > 0, got {}",
                self.default_bandwidth
            );
        }
        if self.idle_bonus <= 0.0 {
            bail!("idle_bonus must be > 0, got {}", self.idle_bonus);
        }
        if self.warmup_load < 0.0 {
            bail!("warmup_load must be >= 0, got {}", self.warmup_load);
        }
        if self.completion_epsilon < 0.0 {
            bail!(
                "completion_epsilon must be >= 0, got {}",
                self.completion_epsilon
            );
        }
        if self.default_job_size < 0.0 {
            bail!(
                "default_job_size must be >= 0, got {}",
                self.default_job_size
            );
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
