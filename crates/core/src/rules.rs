use crate::error::{HeuristicError, Result};
use crate::models::{OutputKeyTemplate, SeriesRecord};
use crate::normalize::{normalize, NormalizedText};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Predicate over one record. Text tests run against normalized fields,
/// so their values must be written in normalized form.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    DescriptionContains { value: String },
    ProtocolContains { value: String },
    TextContains { value: String },
    ImageType { flag: String },
    EchoTime {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    And { all: Vec<Condition> },
    Or { any: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn description(value: &str) -> Self {
        Condition::DescriptionContains {
            value: value.to_string(),
        }
    }

    pub fn flag(flag: &str) -> Self {
        Condition::ImageType {
            flag: flag.to_string(),
        }
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    pub fn all(all: Vec<Condition>) -> Self {
        Condition::And { all }
    }

    fn substring_values<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::DescriptionContains { value }
            | Condition::ProtocolContains { value }
            | Condition::TextContains { value } => out.push(value.as_str()),
            Condition::And { all: list } | Condition::Or { any: list } => {
                list.iter().for_each(|c| c.substring_values(out))
            }
            Condition::Not { condition } => condition.substring_values(out),
            Condition::ImageType { .. } | Condition::EchoTime { .. } => {}
        }
    }
}

/// What a condition gets to look at.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub text: &'a NormalizedText,
    pub record: &'a SeriesRecord,
}

pub fn matches(condition: &Condition, ctx: &RuleContext<'_>) -> bool {
    match condition {
        Condition::DescriptionContains { value } => ctx.text.description.contains(value.as_str()),
        Condition::ProtocolContains { value } => ctx.text.protocol.contains(value.as_str()),
        Condition::TextContains { value } => ctx.text.either_contains(value),
        Condition::ImageType { flag } => ctx.record.has_flag(flag),
        Condition::EchoTime { min, max } => {
            let te = ctx.record.echo_time;
            min.map(|m| te >= m).unwrap_or(true) && max.map(|m| te <= m).unwrap_or(true)
        }
        Condition::And { all } => all.iter().all(|c| matches(c, ctx)),
        Condition::Or { any } => any.iter().any(|c| matches(c, ctx)),
        Condition::Not { condition } => !matches(condition, ctx),
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    pub name: String,
    pub template: OutputKeyTemplate,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub condition: Condition,
}

impl Rule {
    pub fn new(name: &str, template: OutputKeyTemplate, condition: Condition) -> Self {
        Self {
            name: name.to_string(),
            template,
            enabled: true,
            condition,
        }
    }
}

/// Ordered rules. Order is the matching priority: the first rule whose
/// condition holds claims the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        let table = Self { rules };
        for (rule, value) in table.unnormalized_values() {
            warn!(rule, value, "condition value is not normalized and can never match");
        }
        table
    }

    /// `(rule name, value)` for every text test whose value differs from its
    /// normalized form. Such a test never holds.
    pub fn unnormalized_values(&self) -> Vec<(&str, &str)> {
        let mut found = Vec::new();
        for rule in &self.rules {
            let mut values = Vec::new();
            rule.condition.substring_values(&mut values);
            for value in values {
                if normalize(value) != value {
                    found.push((rule.name.as_str(), value));
                }
            }
        }
        found
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        parse_rules(content, origin).map(Self::new)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct templates in declaration order, disabled rules included.
    pub fn templates(&self) -> Vec<&OutputKeyTemplate> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&&rule.template) {
                seen.push(&rule.template);
            }
        }
        seen
    }

    /// First enabled rule whose condition holds.
    pub fn first_match(&self, ctx: &RuleContext<'_>) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|r| r.enabled && matches(&r.condition, ctx))
    }
}

/// Loads a rule table from a TOML file, or from every `*.toml` file under a
/// directory concatenated in file-name order.
pub fn load_rule_table(path: &Path) -> Result<RuleTable> {
    if !path.exists() {
        return Err(HeuristicError::MissingRulePath(path.display().to_string()));
    }
    if path.is_file() {
        return read_rule_file(path).map(RuleTable::new);
    }

    let mut rules = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| HeuristicError::RuleIo {
            path: path.display().to_string(),
            source: e.into(),
        })?;
        let file = entry.path();
        if entry.file_type().is_file() && file.extension().and_then(|e| e.to_str()) == Some("toml")
        {
            debug!(file = %file.display(), "loading rule file");
            rules.extend(read_rule_file(file)?);
        }
    }
    Ok(RuleTable::new(rules))
}

fn read_rule_file(path: &Path) -> Result<Vec<Rule>> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| HeuristicError::RuleIo {
        path: origin.clone(),
        source,
    })?;
    parse_rules(&content, &origin)
}

fn parse_rules(content: &str, origin: &str) -> Result<Vec<Rule>> {
    let file: RuleFile = toml::from_str(content).map_err(|source| HeuristicError::RuleParse {
        path: origin.to_string(),
        source,
    })?;
    Ok(file.rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> OutputKeyTemplate {
        OutputKeyTemplate::new(s).unwrap()
    }

    fn ctx_match(condition: &Condition, record: &SeriesRecord) -> bool {
        let text = NormalizedText::new(&record.protocol_name, &record.series_description);
        matches(condition, &RuleContext { text: &text, record })
    }

    #[test]
    fn description_test_sees_normalized_text() {
        let record = SeriesRecord::new("1", "T2SPACE 0.3mm  HighGain");
        assert!(ctx_match(&Condition::description("t2space_0.3mm_highgain"), &record));
        assert!(!ctx_match(&Condition::description("HighGain"), &record));
    }

    #[test]
    fn text_contains_checks_protocol_too() {
        let record = SeriesRecord::new("1", "series_12").with_protocol("AAHead Scout");
        let c = Condition::TextContains {
            value: "aahead_scout".to_string(),
        };
        assert!(ctx_match(&c, &record));
        assert!(!ctx_match(&Condition::description("aahead_scout"), &record));
    }

    #[test]
    fn or_holds_when_only_second_arm_does() {
        let record = SeriesRecord::new("1", "ciss_500um").with_flags(&["ND"]);
        let c = Condition::Or {
            any: vec![Condition::description("ciss_250um"), Condition::flag("ND")],
        };
        assert!(ctx_match(&c, &record));
        let c = Condition::Or {
            any: vec![Condition::description("ciss_250um"), Condition::flag("DIS2D")],
        };
        assert!(!ctx_match(&c, &record));
    }

    #[test]
    fn unnormalized_value_is_flagged_and_never_matches() {
        let table = RuleTable::new(vec![
            Rule::new(
                "gain",
                key("a/b_acq-300umxhighgain_T2w"),
                Condition::all(vec![
                    Condition::description("t2space_0.3mm"),
                    Condition::not(Condition::description("HighGain")),
                ]),
            ),
            Rule::new(
                "loud",
                key("a/b_acq-300um_T2w"),
                Condition::description("HighGain"),
            ),
        ]);
        assert_eq!(
            table.unnormalized_values(),
            vec![("gain", "HighGain"), ("loud", "HighGain")]
        );

        let record = SeriesRecord::new("1", "HighGain");
        let text = NormalizedText::new("", &record.series_description);
        let ctx = RuleContext {
            text: &text,
            record: &record,
        };
        assert!(table.first_match(&ctx).is_none());
        assert!(RuleTable::new(vec![]).unnormalized_values().is_empty());
    }

    #[test]
    fn image_type_membership_is_exact() {
        let record = SeriesRecord::new("1", "x").with_flags(&["ORIGINAL", "ND"]);
        assert!(ctx_match(&Condition::flag("ND"), &record));
        assert!(!ctx_match(&Condition::flag("nd"), &record));
        assert!(!ctx_match(&Condition::not(Condition::flag("ND")), &record));
    }

    #[test]
    fn echo_time_bounds_are_inclusive() {
        let record = SeriesRecord::new("1", "x").with_echo_time(10.0);
        let c = Condition::EchoTime {
            min: Some(10.0),
            max: None,
        };
        assert!(ctx_match(&c, &record));
        let c = Condition::EchoTime {
            min: None,
            max: Some(9.5),
        };
        assert!(!ctx_match(&c, &record));
    }

    #[test]
    fn first_match_respects_order_and_enabled() {
        let mut narrow = Rule::new(
            "narrow",
            key("a/b_acq-300umxhighgain_T2w"),
            Condition::all(vec![
                Condition::description("t2space_0.3mm"),
                Condition::description("highgain"),
            ]),
        );
        let broad = Rule::new(
            "broad",
            key("a/b_acq-300um_T2w"),
            Condition::description("t2space_0.3mm"),
        );
        let record = SeriesRecord::new("1", "t2space_0.3mm_highgain");
        let text = NormalizedText::new("", &record.series_description);
        let ctx = RuleContext {
            text: &text,
            record: &record,
        };

        let table = RuleTable::new(vec![narrow.clone(), broad.clone()]);
        assert_eq!(table.first_match(&ctx).map(|r| r.name.as_str()), Some("narrow"));

        narrow.enabled = false;
        let table = RuleTable::new(vec![narrow, broad]);
        assert_eq!(table.first_match(&ctx).map(|r| r.name.as_str()), Some("broad"));
        assert_eq!(table.templates().len(), 2);
    }

    #[test]
    fn parses_toml_table() {
        let table = RuleTable::from_toml_str(
            r#"
            [[rules]]
            name = "ciss_250"
            template = "sub-{subject}/{session}/anat/sub-{subject}_{session}_acq-ciss250um_T2w"
            [rules.condition]
            type = "and"
            all = [
              { type = "description_contains", value = "ciss_250um" },
              { type = "image_type", flag = "ND" },
            ]

            [[rules]]
            name = "short_te"
            template = "x/sub-{subject}_echo-{item}_FLASH"
            enabled = false
            [rules.condition]
            type = "echo_time"
            max = 5.0
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rules()[0].enabled);
        assert!(!table.rules()[1].enabled);
    }

    #[test]
    fn malformed_template_fails_at_parse() {
        let err = RuleTable::from_toml_str(
            r#"
            [[rules]]
            name = "bad"
            template = "anat/T2w"
            [rules.condition]
            type = "description_contains"
            value = "t2"
            "#,
            "inline",
        )
        .unwrap_err();
        assert!(err.to_string().contains("inline"));
    }
}
