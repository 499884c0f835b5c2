//! # Traversal Engine
//!
//! Walks a participant through the askable fields of a branch chain.
//! Pure queries over the store; the mode controller decides what a finished
//! traversal means (registration complete vs. sub-flow confirmation).

use crate::store::Store;
use crate::types::{Branch, BranchId, EnrollError, Field, FieldStatus, FieldType};
use std::collections::BTreeSet;

/// Outcome of one traversal step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Ask this field next.
    Ask(Field),
    /// The branch chain is exhausted.
    Finished,
}

/// First askable field of a branch, by `(order, id)`: status normal and not
/// boolean, same filter the in-branch walk applies. A branch entered with no
/// such field is a configuration error.
pub fn first_field<S: Store>(store: &S, branch: BranchId) -> Result<Field, EnrollError> {
    store
        .fields_in_branch(branch)?
        .into_iter()
        .find(|f| f.status == FieldStatus::Normal && f.field_type != FieldType::Boolean)
        .ok_or_else(|| EnrollError::Config(format!("branch {} has no askable fields", branch.0)))
}

/// The field asked after `current`.
///
/// Next askable field in the same branch: smallest `order` strictly greater
/// than the current one, status normal, not boolean (booleans are set only
/// through pick-from-list buttons). When the branch is exhausted, the chain
/// continues with the first field of `next_branch`.
pub fn next_step<S: Store>(store: &S, current: &Field) -> Result<Step, EnrollError> {
    let following = store
        .fields_in_branch(current.branch)?
        .into_iter()
        .find(|f| {
            f.order > current.order
                && f.status == FieldStatus::Normal
                && f.field_type != FieldType::Boolean
        });
    if let Some(field) = following {
        return Ok(Step::Ask(field));
    }

    let branch = store
        .branch(current.branch)?
        .ok_or(EnrollError::BranchNotFound(current.branch))?;
    match branch.next_branch {
        Some(next) => Ok(Step::Ask(first_field(store, next)?)),
        None => Ok(Step::Finished),
    }
}

/// Whether any askable field remains after `current` in the chain.
pub fn remaining_after<S: Store>(store: &S, current: &Field) -> Result<bool, EnrollError> {
    Ok(matches!(next_step(store, current)?, Step::Ask(_)))
}

/// Detect a cycle in the `next_branch` chain that `candidate` would create.
///
/// Runs at configuration-save time; returns the first branch id revisited.
/// `candidate` overlays whatever the store currently holds for that id.
pub fn branch_chain_cycle<S: Store>(
    store: &S,
    candidate: &Branch,
) -> Result<Option<BranchId>, EnrollError> {
    let mut visited = BTreeSet::new();
    let mut cursor = candidate.id;
    let mut next = candidate.next_branch;

    loop {
        if !visited.insert(cursor) {
            return Ok(Some(cursor));
        }
        match next {
            None => return Ok(None),
            Some(id) => {
                cursor = id;
                next = if id == candidate.id {
                    candidate.next_branch
                } else {
                    match store.branch(id)? {
                        Some(branch) => branch.next_branch,
                        // Dangling link; a separate save check reports it.
                        None => None,
                    }
                };
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
