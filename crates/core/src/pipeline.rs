//! One-call session processing: classify, split runs, merge.

use crate::classifier::{classify_with_markers, default_markers};
use crate::error::Result;
use crate::models::{FinalMapping, SeriesRecord};
use crate::rules::RuleTable;
use crate::{merge, runs};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ignore_markers: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ignore_markers: default_markers(),
        }
    }
}

impl From<&crate::config::AppConfig> for SessionOptions {
    fn from(config: &crate::config::AppConfig) -> Self {
        Self {
            ignore_markers: config.classification.ignore_markers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub mapping: FinalMapping,
    /// Series an operator should look at; not a failure.
    pub unmatched: Vec<SeriesRecord>,
    pub ignored: Vec<String>,
    pub fingerprint: String,
}

/// Runs the whole engine over one session's records, given in scan order.
///
/// Either every stage succeeds and a complete mapping comes back, or the
/// first configuration defect is returned and nothing else is.
pub fn run_session(
    records: &[SeriesRecord],
    table: &RuleTable,
    options: &SessionOptions,
) -> Result<SessionOutcome> {
    info!(
        records = records.len(),
        rules = table.len(),
        "classifying session"
    );
    let classification = classify_with_markers(records, table, &options.ignore_markers);

    for record in &classification.unmatched {
        warn!(
            series = %record.series_id,
            protocol = %record.protocol_name,
            description = %record.series_description,
            "unrecognized series"
        );
    }

    let plans = runs::plan(&classification.entries, records)?;
    let mut splits = 0usize;
    for plan in &plans {
        if let runs::KeyPlan::Split {
            original,
            strategy,
            runs: groups,
        } = plan
        {
            splits += 1;
            info!(key = %original, ?strategy, runs = groups.len(), "splitting key into runs");
        }
    }
    let mapping = merge::merge(&plans)?;

    info!(
        keys = mapping.len(),
        split_keys = splits,
        assigned = mapping.series_count(),
        unmatched = classification.unmatched.len(),
        ignored = classification.ignored.len(),
        "session classified"
    );

    let fingerprint = mapping.fingerprint();
    Ok(SessionOutcome {
        mapping,
        unmatched: classification.unmatched,
        ignored: classification.ignored,
        fingerprint,
    })
}
