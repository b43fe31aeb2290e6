use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::logging::{LogFormat, LogLevel};
use crate::output::{print_summary, write_report, AuditReport};
use crate::store::Snapshot;

#[derive(Parser, Debug)]
#[command(name = "commitaudit")]
#[command(about = "Audit landed commits against policy rules and file bugs on violations")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, value_enum, env = "COMMITAUDIT_LOG_LEVEL", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, global = true, value_enum, env = "COMMITAUDIT_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Load and validate a configuration file and list its refs and rulesets
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarize the audit results in a store snapshot
    Report {
        #[arg(short, long)]
        store: PathBuf,

        /// Only report this ref (`<repo url>/+/<branch>`)
        #[arg(long = "ref")]
        ref_url: Option<String>,

        /// Also write the report as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

/// Describe the refs and rulesets of a configuration file.
pub fn check_config(path: &Path) -> Result<String> {
    let config = Config::load(path)?;
    let mut out = format!(
        "Configuration OK: {} ref(s), service account {}\n",
        config.refs.len(),
        config.audit.service_account
    );
    for (name, cfg) in &config.refs {
        match cfg.dynamic_ref {
            Some(dynamic) => out.push_str(&format!(
                "\n{name}: {} ({dynamic:?})\n",
                cfg.base_repo_url
            )),
            None => out.push_str(&format!("\n{name}: {}\n", cfg.repo_url())),
        }
        for (ruleset, rules) in &cfg.rules {
            out.push_str(&format!(
                "  {ruleset} [{}]: {}\n",
                rules.account,
                rules.rule_names().join(", ")
            ));
        }
    }
    Ok(out)
}

pub fn report(store: &Path, ref_url: Option<&str>, json: Option<&Path>) -> Result<AuditReport> {
    let snapshot = Snapshot::load(store)
        .with_context(|| format!("Failed to load store snapshot {:?}", store))?;
    let report = AuditReport::from_snapshot(&snapshot, ref_url);
    print_summary(&report);
    if let Some(path) = json {
        write_report(&report, path)?;
        info!(path = %path.display(), "Wrote JSON report");
    }
    Ok(report)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::CheckConfig { config } => {
            print!("{}", check_config(&config)?);
        }
        Command::Report {
            store,
            ref_url,
            json,
        } => {
            report(&store, ref_url.as_deref(), json.as_deref())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditStatus, RefState, RelevantCommit};
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::try_parse_from(["commitaudit", "check-config", "--config", "audit.toml"]).unwrap();
        assert_eq!(
            cli.command,
            Command::CheckConfig {
                config: PathBuf::from("audit.toml")
            }
        );
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_report_with_global_flags() {
        let cli = Cli::try_parse_from([
            "commitaudit",
            "report",
            "--store",
            "state.json",
            "--ref",
            "https://a.googlesource.com/a.git/+/main",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.command,
            Command::Report {
                store: PathBuf::from("state.json"),
                ref_url: Some("https://a.googlesource.com/a.git/+/main".to_string()),
                json: None,
            }
        );
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["commitaudit"]).is_err());
    }

    #[test]
    fn test_check_config_sample() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("audit.toml");
        let out = check_config(&path).unwrap();
        assert!(out.starts_with("Configuration OK"));
        assert!(out.contains("chromium-src-main: https://chromium.googlesource.com/chromium/src.git/+/refs/heads/main"));
        assert!(out.contains("images-pins-roller"));
        assert!(out.contains("ReleaseBranches"));
    }

    #[test]
    fn test_report_writes_json() {
        let mut snapshot = Snapshot::default();
        let key = "https://a.googlesource.com/a.git/+/main".to_string();
        snapshot.ref_states.insert(
            key.clone(),
            RefState {
                repo_url: key.clone(),
                config_name: "a-main".to_string(),
                ..Default::default()
            },
        );
        snapshot.commits.entry(key.clone()).or_default().insert(
            "badc0de".to_string(),
            RelevantCommit {
                ref_state_key: key.clone(),
                commit_hash: "badc0de".to_string(),
                status: AuditStatus::AuditFailed,
                ..Default::default()
            },
        );
        let store = NamedTempFile::new().unwrap();
        snapshot.write(store.path()).unwrap();
        let json = NamedTempFile::new().unwrap();

        let report = report(store.path(), None, Some(json.path())).unwrap();

        assert_eq!(report.findings_count(), 1);
        let written: AuditReport =
            serde_json::from_str(&std::fs::read_to_string(json.path()).unwrap()).unwrap();
        assert_eq!(written, report);
    }

    #[test]
    fn test_report_missing_store() {
        let err = report(Path::new("/nonexistent/state.json"), None, None).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load store snapshot"));
    }
}
