//! First-match classification of series records against a rule table.

use crate::models::{ClassificationEntry, SeriesRecord};
use crate::normalize::NormalizedText;
use crate::rules::{RuleContext, RuleTable};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Scan-setup markers that make an unmatched record uninteresting.
pub const DEFAULT_IGNORE_MARKERS: &[&str] = &["localizer", "scout"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// One entry per distinct template in rule-table order, empty ones included.
    pub entries: Vec<ClassificationEntry>,
    /// Records no rule claimed that are not scan-setup series.
    pub unmatched: Vec<SeriesRecord>,
    /// Series ids skipped as scan-setup series.
    pub ignored: Vec<String>,
}

impl Classification {
    pub fn entry(&self, template: &str) -> Option<&ClassificationEntry> {
        self.entries.iter().find(|e| e.template.as_str() == template)
    }
}

pub fn is_ignorable(text: &NormalizedText, markers: &[String]) -> bool {
    markers.iter().any(|m| text.either_contains(m))
}

pub fn default_markers() -> Vec<String> {
    DEFAULT_IGNORE_MARKERS.iter().map(|m| m.to_string()).collect()
}

/// Classifies `records` in order with the default ignore markers.
pub fn classify(records: &[SeriesRecord], table: &RuleTable) -> Classification {
    classify_with_markers(records, table, &default_markers())
}

pub fn classify_with_markers(
    records: &[SeriesRecord],
    table: &RuleTable,
    markers: &[String],
) -> Classification {
    let mut entries: Vec<ClassificationEntry> = table
        .templates()
        .into_iter()
        .map(|t| ClassificationEntry::empty(t.clone()))
        .collect();
    let slots: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.template.to_string(), i))
        .collect();

    let mut unmatched = Vec::new();
    let mut ignored = Vec::new();

    for record in records {
        let text = NormalizedText::new(&record.protocol_name, &record.series_description);
        let ctx = RuleContext {
            text: &text,
            record,
        };
        match table.first_match(&ctx) {
            Some(rule) => {
                trace!(series = %record.series_id, rule = %rule.name, "matched");
                // Every rule template was seeded above.
                if let Some(&slot) = slots.get(rule.template.as_str()) {
                    entries[slot].series_ids.push(record.series_id.clone());
                }
            }
            None if is_ignorable(&text, markers) => {
                debug!(series = %record.series_id, description = %text.description, "ignoring scan-setup series");
                ignored.push(record.series_id.clone());
            }
            None => unmatched.push(record.clone()),
        }
    }

    Classification {
        entries,
        unmatched,
        ignored,
    }
}
