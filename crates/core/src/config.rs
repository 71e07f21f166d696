use crate::classifier::default_markers;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rules: RuleConfig,
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
}

/// Where the rule table comes from. `None` selects the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Substrings marking scan-setup series that may go unmatched silently.
    pub ignore_markers: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            ignore_markers: default_markers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub pretty: bool,
    /// Include empty keys in printed mappings.
    pub show_empty: bool,
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
