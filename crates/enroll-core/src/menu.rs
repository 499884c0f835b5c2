//! # Menu Resolver
//!
//! Visibility filtering, keyboard layout and navigation over the n-ary
//! menu tree. Pure queries; the mode controller performs the outcomes.

use crate::messages::message_available;
use crate::primitives::MENU_SINGLE_COLUMN_MAX;
use crate::store::Store;
use crate::types::{EnrollError, Keyboard, MenuKey, MenuKeyStatus, Participant};

/// Keys visible to a participant at their current menu position.
pub fn visible_keys<S: Store>(
    store: &S,
    participant: &Participant,
) -> Result<Vec<MenuKey>, EnrollError> {
    let mut keys = Vec::new();
    for key in store.menu_children(participant.menu_position)? {
        if key_visible(store, participant, &key)? {
            keys.push(key);
        }
    }
    Ok(keys)
}

fn key_visible<S: Store>(
    store: &S,
    participant: &Participant,
    key: &MenuKey,
) -> Result<bool, EnrollError> {
    match key.status {
        MenuKeyStatus::Inactive => Ok(false),
        MenuKeyStatus::GoUp => Ok(key.parent.is_some()),
        MenuKeyStatus::RestoreDeferred => Ok(participant.deferred.is_some()),
        MenuKeyStatus::Plain { message } => {
            let message = store
                .message(message)?
                .ok_or(EnrollError::MessageNotFound(message))?;
            message_available(store, participant.id, &message)
        }
        MenuKeyStatus::ShowProfile { .. }
        | MenuKeyStatus::EditProfile { .. }
        | MenuKeyStatus::ShowNews
        | MenuKeyStatus::ShowCodes
        | MenuKeyStatus::ShowPassStatus => Ok(true),
    }
}

/// Reply keyboard for the current menu position.
pub fn keyboard<S: Store>(store: &S, participant: &Participant) -> Result<Keyboard, EnrollError> {
    let labels = visible_keys(store, participant)?
        .into_iter()
        .map(|k| k.label)
        .collect();
    Ok(Keyboard::Reply(layout_rows(labels)))
}

/// Keyboard layout: small menus get one key per row, larger ones pack
/// two keys per row.
pub fn layout_rows(labels: Vec<String>) -> Vec<Vec<String>> {
    if labels.len() <= MENU_SINGLE_COLUMN_MAX {
        labels.into_iter().map(|l| vec![l]).collect()
    } else {
        labels.chunks(2).map(<[String]>::to_vec).collect()
    }
}

/// What selecting a label at the current position means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuOutcome {
    /// The key has children: move the menu position onto it.
    Descend(MenuKey),
    /// A go-up key: move to the grandparent level.
    Ascend,
    /// A leaf key: perform its action, position unchanged.
    Act(MenuKey),
    /// No visible key carries this label.
    Unknown,
}

/// Resolve a pressed label against the visible keys.
pub fn select<S: Store>(
    store: &S,
    participant: &Participant,
    label: &str,
) -> Result<MenuOutcome, EnrollError> {
    let Some(key) = visible_keys(store, participant)?
        .into_iter()
        .find(|k| k.label == label)
    else {
        return Ok(MenuOutcome::Unknown);
    };

    if key.status == MenuKeyStatus::GoUp {
        return Ok(MenuOutcome::Ascend);
    }
    if !store.menu_children(Some(key.id))?.is_empty() {
        return Ok(MenuOutcome::Descend(key));
    }
    Ok(MenuOutcome::Act(key))
}

/// Menu position after ascending from the current one: the parent of the
/// current node, i.e. the grandparent level of the keys on screen.
pub fn ascend_position<S: Store>(
    store: &S,
    participant: &Participant,
) -> Result<Option<crate::types::MenuKeyId>, EnrollError> {
    match participant.menu_position {
        None => Ok(None),
        Some(position) => {
            let key = store
                .menu_key(position)?
                .ok_or(EnrollError::MenuKeyNotFound(position))?;
            Ok(key.parent)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
