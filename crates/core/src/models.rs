use crate::error::{HeuristicError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One acquired series as tabulated from the session source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub series_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub series_description: String,
    #[serde(default, alias = "image_type_flags", deserialize_with = "null_as_default")]
    pub image_type: Vec<String>,
    #[serde(default, alias = "TE", deserialize_with = "null_as_default")]
    pub echo_time: f64,
    #[serde(default, alias = "date")]
    pub acquisition_timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub series_uid: Option<String>,
}

// Tabulated sessions write `null` for fields the scanner left out.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SeriesRecord {
    pub fn new(series_id: impl Into<String>, series_description: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            protocol_name: String::new(),
            series_description: series_description.into(),
            image_type: Vec::new(),
            echo_time: 0.0,
            acquisition_timestamp: None,
            series_uid: None,
        }
    }

    pub fn with_protocol(mut self, protocol_name: impl Into<String>) -> Self {
        self.protocol_name = protocol_name.into();
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.series_uid = Some(uid.into());
        self
    }

    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.image_type = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_echo_time(mut self, echo_time: f64) -> Self {
        self.echo_time = echo_time;
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.image_type.iter().any(|f| f == flag)
    }
}

/// Uninstantiated output path such as
/// `sub-{subject}/{session}/anat/sub-{subject}_{session}_acq-1mm_T2w`.
///
/// Construction checks that there is a final `_` field to insert a run
/// token in front of, so rewriting can not fail later on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputKeyTemplate(String);

impl OutputKeyTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(HeuristicError::EmptyTemplate);
        }
        if template.split('_').count() < 2 {
            return Err(HeuristicError::MalformedTemplate { template });
        }
        Ok(Self(template))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inserts `run-{index}` before the final `_`-delimited field, leaving
    /// every placeholder untouched.
    pub fn with_run(&self, index: usize) -> Self {
        // `new` guarantees at least one '_'.
        match self.0.rsplit_once('_') {
            Some((head, last)) => Self(format!("{head}_run-{index}_{last}")),
            None => Self(format!("run-{index}_{}", self.0)),
        }
    }

    /// Substitutes `{subject}`, `{session}` and `{item}`.
    pub fn instantiate(&self, subject: &str, session: &str, item: usize) -> String {
        self.0
            .replace("{subject}", subject)
            .replace("{session}", session)
            .replace("{item}", &item.to_string())
    }
}

impl TryFrom<String> for OutputKeyTemplate {
    type Error = HeuristicError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OutputKeyTemplate> for String {
    fn from(value: OutputKeyTemplate) -> Self {
        value.0
    }
}

impl fmt::Display for OutputKeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Series accumulated under one template key, in scan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationEntry {
    pub template: OutputKeyTemplate,
    pub series_ids: Vec<String>,
}

impl ClassificationEntry {
    pub fn empty(template: OutputKeyTemplate) -> Self {
        Self {
            template,
            series_ids: Vec::new(),
        }
    }

    pub fn distinct_count(&self) -> usize {
        let mut ids: Vec<&str> = self.series_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Records of one entry that share a grouping value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunGroup {
    /// 1-based.
    pub index: usize,
    /// UID or series id the group was formed on; `None` only for a
    /// UID-less group inside a UID split.
    pub value: Option<String>,
    pub series_ids: Vec<String>,
}

/// Final template key → series ids mapping.
///
/// Keys are sorted so two runs over the same input serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalMapping(BTreeMap<String, Vec<String>>);

impl FinalMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key that must not already be present.
    pub fn insert_new(&mut self, key: &OutputKeyTemplate, series_ids: Vec<String>) -> Result<()> {
        if self.0.contains_key(key.as_str()) {
            return Err(HeuristicError::KeyCollision {
                key: key.to_string(),
            });
        }
        self.0.insert(key.to_string(), series_ids);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total number of series ids across all keys.
    pub fn series_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Keys that ended up with at least one series.
    pub fn populated(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.iter().filter(|(_, ids)| !ids.is_empty())
    }

    /// blake3 hex digest over keys in sorted order, each followed by its ids
    /// in value order, with separator bytes between fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, ids) in &self.0 {
            hasher.update(key.as_bytes());
            hasher.update(&[0]);
            for id in ids {
                hasher.update(id.as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1e]);
        }
        hasher.finalize().to_hex().to_string()
    }
}
