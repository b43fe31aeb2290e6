mod ref_config;
mod spec;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{LogFormat, LogLevel};

pub use ref_config::{
    auto_roll_rules, AccountRules, ConcreteRef, DynamicRef, RefConfig, ANY_ACCOUNT,
    MILESTONE_NUMBER_TOKEN,
};
pub use spec::{AutoRollSpec, NotificationSpec, RefSpec, RuleSpec, RulesetSpec};

pub const DEFAULT_MAX_RETRIES_PER_COMMIT: u32 = 6;
pub const DEFAULT_WORKERS: usize = 10;
/// 9m30s, leaving time to save results before the next scheduled pass.
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 570;
pub const DEFAULT_STUCK_SCANNER_HOURS: i64 = 2;
pub const DEFAULT_MAX_COMMITS_PER_REF_UPDATE: usize = 6000;
pub const DEFAULT_EXTERNAL_POLL_INTERVAL_SECS: i64 = 3600;

/// Tunables of the audit passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Account issues are filed as; only issues reported by it are reused.
    pub service_account: String,
    pub max_retries_per_commit: u32,
    /// Commits audited concurrently within one pass.
    pub workers: usize,
    pub pass_timeout_secs: u64,
    /// A ref not updated for this long is paused.
    pub stuck_scanner_hours: i64,
    pub max_commits_per_ref_update: usize,
    pub external_poll_interval_secs: i64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            service_account: String::new(),
            max_retries_per_commit: DEFAULT_MAX_RETRIES_PER_COMMIT,
            workers: DEFAULT_WORKERS,
            pass_timeout_secs: DEFAULT_PASS_TIMEOUT_SECS,
            stuck_scanner_hours: DEFAULT_STUCK_SCANNER_HOURS,
            max_commits_per_ref_update: DEFAULT_MAX_COMMITS_PER_REF_UPDATE,
            external_poll_interval_secs: DEFAULT_EXTERNAL_POLL_INTERVAL_SECS,
        }
    }
}

impl AuditSettings {
    pub fn pass_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pass_timeout_secs)
    }

    pub fn stuck_scanner_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stuck_scanner_hours)
    }

    pub fn external_poll_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.external_poll_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    audit: AuditSettings,
    #[serde(default)]
    logging: LogSettings,
    #[serde(default)]
    refs: BTreeMap<String, RefSpec>,
}

/// Process configuration, built once at startup and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub audit: AuditSettings,
    pub logging: LogSettings,
    /// Config name to ref config.
    pub refs: BTreeMap<String, Arc<RefConfig>>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("Failed to parse TOML")?;
        validate(&file)?;
        Ok(Self {
            audit: file.audit,
            logging: file.logging,
            refs: file
                .refs
                .iter()
                .map(|(name, spec)| (name.clone(), Arc::new(spec.build(name))))
                .collect(),
        })
    }

    pub fn ref_config(&self, name: &str) -> Option<Arc<RefConfig>> {
        self.refs.get(name).cloned()
    }

    pub fn with_ref(mut self, cfg: RefConfig) -> Self {
        self.refs.insert(cfg.name.clone(), Arc::new(cfg));
        self
    }
}

fn validate(file: &ConfigFile) -> Result<()> {
    let mut problems = Vec::new();
    if file.audit.service_account.is_empty() {
        problems.push("audit.service_account must be set".to_string());
    }
    if file.audit.workers == 0 {
        problems.push("audit.workers must be at least 1".to_string());
    }
    if file.refs.is_empty() {
        problems.push("no refs configured".to_string());
    }
    for (name, spec) in &file.refs {
        problems.extend(spec.problems(name));
    }
    if !problems.is_empty() {
        bail!("{}", problems.join("; "));
    }
    Ok(())
}
