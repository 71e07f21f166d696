//! Rule tables shipped with the crate.

use crate::error::Result;
use crate::rules::RuleTable;

const EXVIVO: &str = include_str!("../rules/exvivo.toml");

/// Ex-vivo structural heuristic: FLASH, MEMP2RAGE T1w, SPACE T2w and CISS.
pub fn exvivo_table() -> Result<RuleTable> {
    RuleTable::from_toml_str(EXVIVO, "builtin:exvivo")
}
