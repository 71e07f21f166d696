//! Text normalization applied to free-text scanner fields before matching.

/// Lower-cases `raw`, turns spaces into underscores and collapses any run
/// of underscores into one.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch == ' ' || ch == '_' {
            if !last_was_sep {
                out.push('_');
            }
            last_was_sep = true;
        } else {
            out.push(ch);
            last_was_sep = false;
        }
    }
    out
}

/// Both matchable text fields of a record, normalized once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub protocol: String,
    pub description: String,
}

impl NormalizedText {
    pub fn new(protocol_name: &str, series_description: &str) -> Self {
        Self {
            protocol: normalize(protocol_name),
            description: normalize(series_description),
        }
    }

    pub fn either_contains(&self, needle: &str) -> bool {
        self.protocol.contains(needle) || self.description.contains(needle)
    }
}
