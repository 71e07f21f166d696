use crate::error::Result;
use crate::models::FinalMapping;
use crate::runs::KeyPlan;

/// Builds the final mapping from per-key plans: kept keys go in as they
/// are, split keys are replaced by their run keys.
///
/// Any two plans producing the same key is a rule-table defect and fails
/// the whole merge.
pub fn merge(plans: &[KeyPlan]) -> Result<FinalMapping> {
    let mut mapping = FinalMapping::new();
    for plan in plans {
        match plan {
            KeyPlan::Keep(entry) => mapping.insert_new(&entry.template, entry.series_ids.clone())?,
            KeyPlan::Split { runs, .. } => {
                for (key, group) in runs {
                    mapping.insert_new(key, group.series_ids.clone())?;
                }
            }
        }
    }
    Ok(mapping)
}
