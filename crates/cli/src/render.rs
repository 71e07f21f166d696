use heuristic_core::pipeline::SessionOutcome;
use heuristic_core::rules::RuleTable;
use std::fmt::Write;

/// Plain-text report: one line per key, then the review list.
pub fn outcome_text(outcome: &SessionOutcome, show_empty: bool) -> String {
    let mut out = String::new();
    let rows: Box<dyn Iterator<Item = (&str, &[String])> + '_> = if show_empty {
        Box::new(outcome.mapping.iter())
    } else {
        Box::new(outcome.mapping.populated())
    };
    for (key, ids) in rows {
        let _ = writeln!(out, "{key}: {}", ids.join(", "));
    }
    if !outcome.unmatched.is_empty() {
        let _ = writeln!(out, "\nunrecognized series ({}):", outcome.unmatched.len());
        for record in &outcome.unmatched {
            let _ = writeln!(
                out,
                "  {}  protocol={:?} description={:?}",
                record.series_id, record.protocol_name, record.series_description
            );
        }
    }
    let _ = writeln!(out, "\nfingerprint: {}", outcome.fingerprint);
    out
}

pub fn outcome_json(outcome: &SessionOutcome, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(outcome)
    } else {
        serde_json::to_string(outcome)
    }
}

/// Rules in priority order.
pub fn rules_text(table: &RuleTable) -> String {
    let mut out = String::new();
    for (i, rule) in table.rules().iter().enumerate() {
        let state = if rule.enabled { "" } else { " (disabled)" };
        let _ = writeln!(out, "{:>3}. {}{} -> {}", i + 1, rule.name, state, rule.template);
    }
    out
}
