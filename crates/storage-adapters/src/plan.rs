//! Plan checks shared by every store, run under the form lock before any write.

use std::collections::HashSet;

use domains::{DomainError, DomainResult, FieldBatchPlan, FieldId, Version};

/// Verifies the plan was computed from the state the store holds now.
///
/// `live_ids` are the ids of the form's persisted fields.
pub(crate) fn check_plan(
    plan: &FieldBatchPlan,
    current_version: Version,
    current_revision: u64,
    live_ids: &HashSet<FieldId>,
) -> DomainResult<()> {
    if current_revision != plan.expected_revision {
        return Err(DomainError::ConcurrencyConflict {
            form_id: plan.form_id,
            expected: plan.expected_revision,
            found: current_revision,
        });
    }

    match &plan.snapshot {
        Some(snapshot) => {
            if snapshot.version != current_version
                || Some(plan.resulting_version) != current_version.checked_add(1)
            {
                return Err(DomainError::Consistency(format!(
                    "form {} at version {current_version} cannot move to {} with a snapshot of {}",
                    plan.form_id, plan.resulting_version, snapshot.version
                )));
            }
        }
        None if plan.resulting_version != current_version => {
            return Err(DomainError::Consistency(format!(
                "form {} cannot move from version {current_version} to {} without a snapshot",
                plan.form_id, plan.resulting_version
            )));
        }
        None => {}
    }

    let mut touched = HashSet::with_capacity(live_ids.len());
    let planned = plan
        .delete_ids
        .iter()
        .copied()
        .chain(plan.updates.iter().map(|field| field.id));
    for id in planned {
        if !live_ids.contains(&id) || !touched.insert(id) {
            return Err(DomainError::Consistency(format!(
                "plan for form {} references field {id} more than once or not at all",
                plan.form_id
            )));
        }
    }
    if touched.len() != live_ids.len() {
        return Err(DomainError::Consistency(format!(
            "plan for form {} leaves live fields unaccounted for",
            plan.form_id
        )));
    }
    Ok(())
}
