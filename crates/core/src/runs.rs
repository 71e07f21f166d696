//! Splitting of template keys that cover more than one physical acquisition.
//!
//! Planning is pure: each classification entry becomes a [`KeyPlan`] that
//! either keeps the key as is or lists the run-indexed keys that replace it.
//! [`crate::merge`] turns the plans into the final mapping.

use crate::error::{HeuristicError, Result};
use crate::merge;
use crate::models::{ClassificationEntry, FinalMapping, OutputKeyTemplate, RunGroup, SeriesRecord};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// How the records of one key are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingStrategy {
    /// One run per distinct series UID.
    ByUid,
    /// One run per distinct series id; used when no record carries a UID.
    BySeriesId,
}

impl GroupingStrategy {
    /// Picks a strategy for `members`, or `None` when they form a single
    /// acquisition and must not be split.
    pub fn select(members: &[&SeriesRecord]) -> Option<Self> {
        let uids: BTreeSet<Option<&str>> =
            members.iter().map(|r| r.series_uid.as_deref()).collect();
        match uids.len() {
            0 => None,
            1 if uids.contains(&None) => Some(GroupingStrategy::BySeriesId),
            1 => None,
            _ => Some(GroupingStrategy::ByUid),
        }
    }

    fn value<'a>(&self, record: &'a SeriesRecord) -> Option<&'a str> {
        match self {
            GroupingStrategy::ByUid => record.series_uid.as_deref(),
            GroupingStrategy::BySeriesId => Some(record.series_id.as_str()),
        }
    }

    /// Groups `members` by this strategy's value. Groups are numbered from 1
    /// in ascending lexicographic order of the value (a missing UID sorts
    /// first); inside a group the scan order of `members` is kept.
    pub fn group(&self, members: &[&SeriesRecord]) -> Vec<RunGroup> {
        let values: BTreeSet<Option<&str>> = members.iter().map(|r| self.value(r)).collect();
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| RunGroup {
                index: i + 1,
                value: value.map(str::to_string),
                series_ids: members
                    .iter()
                    .filter(|r| self.value(r) == value)
                    .map(|r| r.series_id.clone())
                    .collect(),
            })
            .collect()
    }
}

/// What happens to one classification entry.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPlan {
    Keep(ClassificationEntry),
    Split {
        original: OutputKeyTemplate,
        strategy: GroupingStrategy,
        runs: Vec<(OutputKeyTemplate, RunGroup)>,
    },
}

/// Decides, per entry, whether it stays or is replaced by run keys.
///
/// Series ids must be unique across `records`; a repeated id would be
/// pulled into every key that lists it.
pub fn plan(entries: &[ClassificationEntry], records: &[SeriesRecord]) -> Result<Vec<KeyPlan>> {
    let mut seen = HashSet::new();
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.series_id.as_str())) {
        return Err(HeuristicError::DuplicateSeries {
            series_id: dup.series_id.clone(),
        });
    }
    entries.iter().map(|entry| plan_entry(entry, records)).collect()
}

fn plan_entry(entry: &ClassificationEntry, records: &[SeriesRecord]) -> Result<KeyPlan> {
    if entry.distinct_count() <= 1 {
        return Ok(KeyPlan::Keep(entry.clone()));
    }

    let wanted: HashSet<&str> = entry.series_ids.iter().map(String::as_str).collect();
    let members: Vec<&SeriesRecord> = records
        .iter()
        .filter(|r| wanted.contains(r.series_id.as_str()))
        .collect();
    let found: HashSet<&str> = members.iter().map(|r| r.series_id.as_str()).collect();
    if let Some(missing) = entry
        .series_ids
        .iter()
        .find(|id| !found.contains(id.as_str()))
    {
        return Err(HeuristicError::UnknownSeries {
            template: entry.template.to_string(),
            series_id: missing.clone(),
        });
    }

    let Some(strategy) = GroupingStrategy::select(&members) else {
        return Ok(KeyPlan::Keep(entry.clone()));
    };

    let runs: Vec<(OutputKeyTemplate, RunGroup)> = strategy
        .group(&members)
        .into_iter()
        .map(|group| (entry.template.with_run(group.index), group))
        .collect();
    for (key, group) in &runs {
        debug!(
            original = %entry.template,
            new_key = %key,
            value = ?group.value,
            series = ?group.series_ids,
            "split run"
        );
    }

    Ok(KeyPlan::Split {
        original: entry.template.clone(),
        strategy,
        runs,
    })
}

/// Plans and merges in one step.
pub fn disambiguate(
    entries: &[ClassificationEntry],
    records: &[SeriesRecord],
) -> Result<FinalMapping> {
    let plans = plan(entries, records)?;
    merge::merge(&plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "sub-{subject}/{session}/anat/sub-{subject}_{session}_acq-300um_T2w";

    fn entry(ids: &[&str]) -> ClassificationEntry {
        ClassificationEntry {
            template: OutputKeyTemplate::new(KEY).unwrap(),
            series_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run_key(index: usize) -> String {
        OutputKeyTemplate::new(KEY).unwrap().with_run(index).to_string()
    }

    #[test]
    fn distinct_uids_pick_uid_grouping() {
        let a = SeriesRecord::new("1", "x").with_uid("u1");
        let b = SeriesRecord::new("2", "x").with_uid("u2");
        assert_eq!(GroupingStrategy::select(&[&a, &b]), Some(GroupingStrategy::ByUid));
    }

    #[test]
    fn absent_uids_fall_back_to_series_id() {
        let a = SeriesRecord::new("1", "x");
        let b = SeriesRecord::new("2", "x");
        assert_eq!(
            GroupingStrategy::select(&[&a, &b]),
            Some(GroupingStrategy::BySeriesId)
        );
    }

    #[test]
    fn shared_uid_means_no_split() {
        let a = SeriesRecord::new("1", "x").with_uid("u1");
        let b = SeriesRecord::new("2", "x").with_uid("u1");
        assert_eq!(GroupingStrategy::select(&[&a, &b]), None);
    }

    #[test]
    fn uid_groups_are_numbered_lexicographically() {
        let records = vec![
            SeriesRecord::new("1", "x").with_uid("uid-c"),
            SeriesRecord::new("2", "x").with_uid("uid-a"),
            SeriesRecord::new("3", "x").with_uid("uid-b"),
        ];
        let members: Vec<&SeriesRecord> = records.iter().collect();
        let groups = GroupingStrategy::ByUid.group(&members);
        let order: Vec<(usize, Option<&str>)> = groups
            .iter()
            .map(|g| (g.index, g.value.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![(1, Some("uid-a")), (2, Some("uid-b")), (3, Some("uid-c"))]
        );
    }

    #[test]
    fn series_id_sort_is_string_order() {
        let records = vec![
            SeriesRecord::new("9", "x"),
            SeriesRecord::new("10", "x"),
        ];
        let members: Vec<&SeriesRecord> = records.iter().collect();
        let groups = GroupingStrategy::BySeriesId.group(&members);
        assert_eq!(groups[0].series_ids, vec!["10"]);
        assert_eq!(groups[1].series_ids, vec!["9"]);
    }

    #[test]
    fn missing_uid_sorts_before_present_ones() {
        let records = vec![
            SeriesRecord::new("1", "x").with_uid("u1"),
            SeriesRecord::new("2", "x"),
        ];
        let members: Vec<&SeriesRecord> = records.iter().collect();
        let groups = GroupingStrategy::ByUid.group(&members);
        assert_eq!(groups[0].value, None);
        assert_eq!(groups[0].series_ids, vec!["2"]);
        assert_eq!(groups[1].series_ids, vec!["1"]);
    }

    #[test]
    fn group_keeps_scan_order_inside_a_run() {
        let records = vec![
            SeriesRecord::new("5", "x").with_uid("u2"),
            SeriesRecord::new("3", "x").with_uid("u1"),
            SeriesRecord::new("4", "x").with_uid("u2"),
            SeriesRecord::new("1", "x").with_uid("u1"),
        ];
        let out = disambiguate(&[entry(&["5", "3", "4", "1"])], &records).unwrap();
        assert_eq!(out.get(&run_key(1)).unwrap(), ["3", "1"]);
        assert_eq!(out.get(&run_key(2)).unwrap(), ["5", "4"]);
        assert!(!out.contains_key(KEY));
    }

    #[test]
    fn split_plan_names_original_and_strategy() {
        let records = vec![SeriesRecord::new("100", "x"), SeriesRecord::new("200", "x")];
        let plans = plan(&[entry(&["100", "200"])], &records).unwrap();
        match &plans[0] {
            KeyPlan::Split {
                original,
                strategy,
                runs,
            } => {
                assert_eq!(original.as_str(), KEY);
                assert_eq!(*strategy, GroupingStrategy::BySeriesId);
                assert_eq!(runs.len(), 2);
            }
            other => panic!("expected a split, got {other:?}"),
        }
    }

    #[test]
    fn single_record_is_never_split() {
        let records = vec![SeriesRecord::new("1", "x")];
        let plans = plan(&[entry(&["1"]), entry(&[])], &records).unwrap();
        assert!(plans.iter().all(|p| matches!(p, KeyPlan::Keep(_))));
    }

    #[test]
    fn repeated_id_counts_once() {
        let records = vec![SeriesRecord::new("1", "x")];
        let plans = plan(&[entry(&["1", "1"])], &records).unwrap();
        assert!(matches!(&plans[0], KeyPlan::Keep(e) if e.series_ids.len() == 2));
    }

    #[test]
    fn repeated_series_id_across_rules_is_rejected() {
        let records = vec![
            SeriesRecord::new("5", "aaa"),
            SeriesRecord::new("6", "aaa"),
            SeriesRecord::new("5", "bbb"),
        ];
        let other = ClassificationEntry {
            template: OutputKeyTemplate::new("anat/sub-{subject}_acq-b_T2w").unwrap(),
            series_ids: vec!["5".to_string()],
        };
        let err = disambiguate(&[entry(&["5", "6"]), other], &records).unwrap_err();
        assert!(matches!(err, HeuristicError::DuplicateSeries { series_id } if series_id == "5"));
    }

    #[test]
    fn unknown_series_is_an_error() {
        let records = vec![SeriesRecord::new("1", "x")];
        let err = plan(&[entry(&["1", "2"])], &records).unwrap_err();
        assert!(matches!(err, HeuristicError::UnknownSeries { series_id, .. } if series_id == "2"));
    }
}
