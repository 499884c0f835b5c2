//! # Notification Passes
//!
//! The three periodic passes: planning, delivery and personal notifications.
//! Each pass flips the status it consumes to its terminal state and persists
//! that flip before emitting any outbound work, so a crash mid-pass can drop
//! a batch but never double-send it.

use crate::compute::participant_context;
use crate::messages;
use crate::services::{Clock, RenderContext, Renderer};
use crate::store::Store;
use crate::types::{
    CacheSlot, ConditionalMessage, DeliveryStatus, EnrollError, FieldStatus, FileSource,
    GroupStatus, NotificationStatus, OutMessage, Outbound, Recipient,
};

// =============================================================================
// PLANNING PASS
// =============================================================================

/// Pick up notifications marked for delivery and confirm the plan.
///
/// Every `ToDeliver` notification becomes `Planned` and each admin group
/// gets a planning notice naming the body and fire time.
pub fn plan_pass<S: Store, R: Renderer>(
    store: &mut S,
    renderer: &R,
) -> Result<Vec<Outbound>, EnrollError> {
    let settings = store.settings()?;
    let mut out = Vec::new();

    for mut notification in store.notifications()? {
        if notification.status != NotificationStatus::ToDeliver {
            continue;
        }
        let message = linked_message(store, &notification)?;
        notification.status = NotificationStatus::Planned;
        store.put_notification(&notification)?;

        let mut ctx = RenderContext::new();
        ctx.insert("body".to_string(), message.body.clone());
        ctx.insert("fire_at".to_string(), notification.fire_at.to_rfc3339());
        let notice = renderer.render(&settings.notification_planned_template, &ctx)?;
        out.extend(admin_notices(store, &notice)?);
    }
    Ok(out)
}

// =============================================================================
// DELIVERY PASS
// =============================================================================

/// Deliver planned notifications whose fire time has passed.
///
/// The status flip to `Delivered` is persisted before the fan-out is built.
/// Recipients are every participant who has not blocked the bot and passes
/// the message's visibility gate, plus every broadcast group.
pub fn perform_pass<S: Store, C: Clock, R: Renderer>(
    store: &mut S,
    clock: &C,
    renderer: &R,
) -> Result<Vec<Outbound>, EnrollError> {
    let settings = store.settings()?;
    let now = clock.now();
    let mut out = Vec::new();

    for mut notification in store.notifications()? {
        if notification.status != NotificationStatus::Planned || notification.fire_at > now {
            continue;
        }
        let message = linked_message(store, &notification)?;
        notification.status = NotificationStatus::Delivered;
        store.put_notification(&notification)?;

        let payload = messages::payload(&message, &settings)?;
        for participant in store.participants()? {
            if participant.is_blocked {
                continue;
            }
            if !messages::message_available(store, participant.id, &message)? {
                continue;
            }
            out.push(Outbound::Send {
                to: Recipient::Participant(participant.id),
                message: payload.clone(),
            });
        }

        for group in store.groups_with_status(GroupStatus::Broadcast)? {
            out.push(Outbound::Send {
                to: Recipient::Group(group.id),
                message: payload.clone(),
            });
        }

        let mut ctx = RenderContext::new();
        ctx.insert("body".to_string(), message.body.clone());
        let notice = renderer.render(&settings.notification_sent_template, &ctx)?;
        out.extend(admin_notices(store, &notice)?);
    }
    Ok(out)
}

fn linked_message<S: Store>(
    store: &S,
    notification: &crate::types::Notification,
) -> Result<ConditionalMessage, EnrollError> {
    store
        .message(notification.message)?
        .ok_or(EnrollError::MessageNotFound(notification.message))
}

// =============================================================================
// PERSONAL PASS
// =============================================================================

/// Deliver personal-notification field values marked for delivery.
///
/// The value's prompt template is rendered per participant; a file-typed
/// field attaches the stored object, preferring the cached transport handle
/// and arming the cache-back slot on a fresh blob send. A blocked recipient
/// is skipped before the status flip, so the value stays pending and goes
/// out once the block lifts.
pub fn personal_pass<S: Store, R: Renderer>(
    store: &mut S,
    renderer: &R,
) -> Result<Vec<Outbound>, EnrollError> {
    let mut out = Vec::new();

    for mut value in store.pending_personal_values()? {
        let Some(field) = store.field(value.field)? else {
            continue;
        };
        if field.status != FieldStatus::PersonalNotification {
            continue;
        }
        let Some(participant) = store.participant(value.participant)? else {
            continue;
        };
        if participant.is_blocked {
            continue;
        }

        value.delivery = DeliveryStatus::Delivered;
        store.put_value(&value)?;

        let ctx = participant_context(store, &participant)?;
        let body = renderer.render(&field.prompt, &ctx)?;

        let (attachment, cache_to) = if field.field_type.is_file() {
            match (&value.file_handle, &field.bucket) {
                (Some(handle), _) => (Some(FileSource::Handle(handle.clone())), None),
                (None, Some(bucket)) => (
                    Some(FileSource::Blob {
                        bucket: bucket.clone(),
                        name: value.value.clone(),
                    }),
                    Some(CacheSlot::Value {
                        participant: value.participant,
                        field: value.field,
                    }),
                ),
                (None, None) => (None, None),
            }
        } else {
            (None, None)
        };

        out.push(Outbound::Send {
            to: Recipient::Participant(participant.id),
            message: OutMessage {
                body,
                keyboard: crate::types::Keyboard::None,
                attachment,
                cache_to,
            },
        });
    }
    Ok(out)
}

fn admin_notices<S: Store>(store: &S, text: &str) -> Result<Vec<Outbound>, EnrollError> {
    Ok(store
        .groups_with_status(GroupStatus::Admin)?
        .into_iter()
        .map(|group| Outbound::Send {
            to: Recipient::Group(group.id),
            message: OutMessage::text(text.to_string()),
        })
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================
