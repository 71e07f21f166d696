use anyhow::{Context, Result};
use heuristic_core::builtin;
use heuristic_core::config::AppConfig;
use heuristic_core::models::SeriesRecord;
use heuristic_core::pipeline::{self, SessionOptions, SessionOutcome};
use heuristic_core::rules::{self, RuleTable};
use std::fs;
use std::path::Path;
use tracing::info;

/// Rule table from `--rules`, else the config, else the built-in table.
pub fn load_table(cfg: &AppConfig, rules_override: Option<&str>) -> Result<RuleTable> {
    match rules_override.or(cfg.rules.path.as_deref()) {
        Some(path) => {
            info!(path, "loading rule table");
            rules::load_rule_table(Path::new(path))
                .with_context(|| format!("loading rule table from {path}"))
        }
        None => builtin::exvivo_table().context("loading built-in rule table"),
    }
}

/// Reads a JSON array of series records, in scan order.
pub fn read_records(path: &Path) -> Result<Vec<SeriesRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<SeriesRecord> = serde_json::from_str(&content)
        .with_context(|| format!("parsing series records in {}", path.display()))?;
    Ok(records)
}

pub fn classify_file(
    cfg: &AppConfig,
    records_path: &Path,
    rules_override: Option<&str>,
) -> Result<SessionOutcome> {
    let table = load_table(cfg, rules_override)?;
    let records = read_records(records_path)?;
    let outcome = pipeline::run_session(&records, &table, &SessionOptions::from(cfg))
        .context("classifying session")?;
    Ok(outcome)
}
