//! # Conditional Messages
//!
//! Availability gating, reply-button keyboards and outbound payload
//! preparation for admin-authored messages.

use crate::primitives::TRUE_VALUE;
use crate::store::Store;
use crate::types::{
    ButtonAction, CacheSlot, ConditionalMessage, EnrollError, FileSource, InlineButton, Keyboard,
    OutMessage, ParticipantId, Settings,
};

/// Whether a message is available to a participant: either it carries no
/// visibility field, or the participant's stored value for that boolean
/// field is `"true"`.
pub fn message_available<S: Store>(
    store: &S,
    participant: ParticipantId,
    message: &ConditionalMessage,
) -> Result<bool, EnrollError> {
    let Some(field) = message.visibility_field else {
        return Ok(true);
    };
    Ok(store
        .value(participant, field)?
        .is_some_and(|v| v.value == TRUE_VALUE))
}

/// Inline keyboard for a message's reply capability, one button per row.
///
/// The parallel label/confirmation lists are re-checked here: a mismatch
/// that slipped past the save validation must not reach the transport.
pub fn reply_keyboard(message: &ConditionalMessage) -> Result<Keyboard, EnrollError> {
    let Some(reply) = &message.reply else {
        return Ok(Keyboard::None);
    };
    message.check()?;

    let rows = reply
        .labels()
        .iter()
        .enumerate()
        .map(|(index, label)| {
            vec![InlineButton {
                label: label.clone(),
                action: ButtonAction::Reply {
                    message: message.id,
                    index: index as u32,
                },
            }]
        })
        .collect();
    Ok(Keyboard::Inline(rows))
}

/// Outbound payload for a message: body, reply keyboard and photo.
///
/// Photo resolution order: direct link, then the cached transport handle,
/// then the blob object (which also arms the handle cache-back slot).
pub fn payload(
    message: &ConditionalMessage,
    settings: &Settings,
) -> Result<OutMessage, EnrollError> {
    let keyboard = reply_keyboard(message)?;
    let (attachment, cache_to) = match &message.photo {
        None => (None, None),
        Some(photo) if photo.starts_with("http://") || photo.starts_with("https://") => {
            (Some(FileSource::Link(photo.clone())), None)
        }
        Some(_) if message.photo_handle.is_some() => (
            message.photo_handle.clone().map(FileSource::Handle),
            None,
        ),
        Some(photo) => (
            Some(FileSource::Blob {
                bucket: settings.photo_bucket.clone(),
                name: photo.clone(),
            }),
            Some(CacheSlot::MessagePhoto(message.id)),
        ),
    };

    Ok(OutMessage {
        body: message.body.clone(),
        keyboard,
        attachment,
        cache_to,
    })
}

// =============================================================================
// TESTS
// =============================================================================
