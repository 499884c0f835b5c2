//! # Mode Controller
//!
//! Single entry point for inbound chat interactions. Dispatches on the
//! participant's conversation state, mutates the store and returns the
//! outbound batch for the transport to perform.
//!
//! State rules:
//! - answering runs the validator, stores the value and advances traversal;
//! - skip and defer are plain keyboard texts, recognized only in the states
//!   that allow them;
//! - editing replaces one stored answer and refreshes the edited message in
//!   place;
//! - idle text selects menu keys.

use crate::compute::{compute_fields, participant_context};
use crate::menu::{self, MenuOutcome};
use crate::messages::{self, message_available};
use crate::services::{Blobs, Clock, Renderer};
use crate::store::Store;
use crate::traverse::{self, Step};
use crate::types::{
    ButtonAction, Conversation, EnrollError, Field, FieldId, FieldStatus, FlowContext, GroupStatus,
    InlineButton, Keyboard, MenuKeyStatus, MessageId, OutMessage, Outbound, Participant,
    ParticipantFieldValue, ParticipantId, ParticipantStatus, Recipient, Settings, SubFlow,
};
use crate::validate::{Prepared, RawAnswer, prepare_attachment, prepare_text};

// =============================================================================
// EVENTS AND SERVICES
// =============================================================================

/// One inbound interaction, as decoded by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First contact (or an explicit start command).
    Start { handle: Option<String> },
    /// A regular message: text or upload.
    Message(RawAnswer),
    /// Edit button pressed under a profile message. `target` is the message
    /// to refresh after the change; `panel_only` refreshes just its keyboard.
    EditField {
        field: FieldId,
        target: u64,
        panel_only: bool,
    },
    /// Reply button of a conditional message pressed.
    ReplyButton { message: MessageId, index: u32 },
    /// Resume the deferred branch.
    RestoreDeferred,
}

/// Bundle of the service seams one interaction needs.
pub struct Services<'a, C: Clock, R: Renderer, B: Blobs> {
    pub clock: &'a C,
    pub renderer: &'a R,
    pub blobs: &'a B,
}

fn send(to: ParticipantId, message: OutMessage) -> Outbound {
    Outbound::Send {
        to: Recipient::Participant(to),
        message,
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Handle one inbound interaction for the given chat.
pub fn handle<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    chat: i64,
    event: Event,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    let settings = store.settings()?;

    // Any interaction from an unknown chat behaves like first contact.
    let Some(participant) = store.participant_by_chat(chat)? else {
        let handle = match event {
            Event::Start { handle } => handle,
            _ => None,
        };
        return start(store, chat, handle, &settings, services);
    };

    match event {
        Event::Start { .. } => {
            let keyboard = menu::keyboard(store, &participant)?;
            Ok(vec![send(
                participant.id,
                OutMessage::with_keyboard(settings.help_text.clone(), keyboard),
            )])
        }
        Event::Message(raw) => on_message(store, participant, raw, &settings, services),
        Event::EditField {
            field,
            target,
            panel_only,
        } => begin_edit(store, participant, field, target, panel_only, &settings, services),
        Event::ReplyButton { message, index } => {
            on_reply_button(store, participant, message, index, &settings, services)
        }
        Event::RestoreDeferred => restore(store, participant, &settings, services),
    }
}

// =============================================================================
// START
// =============================================================================

fn start<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    chat: i64,
    handle: Option<String>,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    let mut participant = Participant {
        id: store.next_participant_id()?,
        chat,
        handle,
        status: ParticipantStatus::Inactive,
        is_blocked: false,
        created_at: services.clock.now(),
        conversation: Conversation::Idle,
        deferred: None,
        menu_position: None,
    };
    store.put_participant(&participant)?;
    compute_fields(
        store,
        &participant,
        FieldStatus::ComputedOnCreate,
        services.renderer,
        services.clock.today(),
    )?;

    let root = store.branch_by_key(&settings.root_branch)?.ok_or_else(|| {
        EnrollError::Config(format!("root branch '{}' does not exist", settings.root_branch))
    })?;
    let first = traverse::first_field(store, root.id)?;

    let mut out = vec![send(
        participant.id,
        OutMessage::text(settings.start_text.clone()),
    )];
    out.extend(ask(store, &mut participant, &first, None, settings, services)?);
    Ok(out)
}

// =============================================================================
// ASKING QUESTIONS
// =============================================================================

/// Move the participant onto `field` and emit its question.
fn ask<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    field: &Field,
    sub_flow: Option<SubFlow>,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    participant.conversation = Conversation::Answering {
        field: field.id,
        sub_flow,
    };
    store.put_participant(participant)?;

    let ctx = participant_context(store, participant)?;
    let body = services.renderer.render(&field.prompt, &ctx)?;
    let keyboard = question_keyboard(store, field, settings, false)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(body, keyboard),
    )])
}

/// Reply keyboard under a question: answer options one per row, then the
/// skip/defer (or cancel, while editing) service buttons.
fn question_keyboard<S: Store>(
    store: &S,
    field: &Field,
    settings: &Settings,
    editing: bool,
) -> Result<Keyboard, EnrollError> {
    let mut rows: Vec<Vec<String>> = field
        .answer_options
        .iter()
        .map(|option| vec![option.clone()])
        .collect();

    if editing {
        rows.push(vec![settings.cancel_label.clone()]);
    } else {
        if field.is_skippable {
            rows.push(vec![settings.skip_label.clone()]);
        }
        let branch = store
            .branch(field.branch)?
            .ok_or(EnrollError::BranchNotFound(field.branch))?;
        if branch.is_deferrable {
            rows.push(vec![settings.defer_label.clone()]);
        }
    }

    if rows.is_empty() {
        return Ok(Keyboard::None);
    }
    Ok(Keyboard::Reply(rows))
}

// =============================================================================
// MESSAGE DISPATCH
// =============================================================================

fn on_message<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    mut participant: Participant,
    raw: RawAnswer,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    match participant.conversation {
        Conversation::Answering { field, sub_flow } => {
            let field = store.field(field)?.ok_or(EnrollError::FieldNotFound(field))?;

            if let RawAnswer::Text(text) = &raw {
                if field.is_skippable && text == &settings.skip_label {
                    return advance(store, &mut participant, &field, sub_flow, settings, services);
                }
                let branch = store
                    .branch(field.branch)?
                    .ok_or(EnrollError::BranchNotFound(field.branch))?;
                if branch.is_deferrable && text == &settings.defer_label {
                    return defer(store, &mut participant, field.id, sub_flow, settings);
                }
            }

            answer(store, &mut participant, &field, &raw, sub_flow, settings, services)
        }

        Conversation::Editing {
            field,
            target,
            panel_only,
        } => {
            if matches!(&raw, RawAnswer::Text(text) if text == &settings.cancel_label) {
                return cancel_edit(store, &mut participant, settings);
            }
            let field = store.field(field)?.ok_or(EnrollError::FieldNotFound(field))?;
            finish_edit(
                store,
                &mut participant,
                &field,
                &raw,
                target,
                panel_only,
                settings,
                services,
            )
        }

        Conversation::Idle => match raw {
            RawAnswer::Text(text) => menu_hit(store, participant, &text, settings, services),
            RawAnswer::Attachment(_) => {
                let keyboard = menu::keyboard(store, &participant)?;
                Ok(vec![send(
                    participant.id,
                    OutMessage::with_keyboard(
                        settings.upload_without_context_text.clone(),
                        keyboard,
                    ),
                )])
            }
        },
    }
}

// =============================================================================
// ANSWERING
// =============================================================================

fn answer<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    field: &Field,
    raw: &RawAnswer,
    sub_flow: Option<SubFlow>,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    match store_answer(store, participant, field, raw, settings, services)? {
        Some(reprompt) => {
            let keyboard = question_keyboard(store, field, settings, false)?;
            Ok(vec![send(
                participant.id,
                OutMessage::with_keyboard(reprompt, keyboard),
            )])
        }
        None => advance(store, participant, field, sub_flow, settings, services),
    }
}

/// Validate and persist one answer. Returns the re-prompt text when the
/// answer was rejected; `None` means the value (and any blob) is stored.
fn store_answer<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &Participant,
    field: &Field,
    raw: &RawAnswer,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Option<String>, EnrollError> {
    let prepared = match raw {
        RawAnswer::Text(text) => prepare_text(field, settings, text, services.clock.today())?,
        RawAnswer::Attachment(attachment) => {
            let display_name = display_name_value(store, participant, settings)?;
            prepare_attachment(
                field,
                settings,
                participant.id,
                display_name.as_deref(),
                attachment,
            )?
        }
    };

    match prepared {
        Prepared::Reprompt(text) => Ok(Some(text)),
        Prepared::Value(value) => {
            store.put_value(&ParticipantFieldValue::plain(
                participant.id,
                field.id,
                value,
            ))?;
            Ok(None)
        }
        Prepared::Upload {
            value,
            blob,
            file_handle,
        } => {
            let bytes = match raw {
                RawAnswer::Attachment(attachment) => attachment.bytes.as_slice(),
                RawAnswer::Text(_) => &[],
            };
            services
                .blobs
                .put(&blob.bucket, &blob.name, bytes, &blob.content_type)?;

            let mut record = ParticipantFieldValue::plain(participant.id, field.id, value);
            record.file_handle = file_handle;
            store.put_value(&record)?;
            Ok(None)
        }
    }
}

/// Stored value of the display-name field, used to name uploads.
fn display_name_value<S: Store>(
    store: &S,
    participant: &Participant,
    settings: &Settings,
) -> Result<Option<String>, EnrollError> {
    let Some(field) = store.field_by_key(&settings.display_name_field)? else {
        return Ok(None);
    };
    Ok(store.value(participant.id, field.id)?.map(|v| v.value))
}

// =============================================================================
// TRAVERSAL ADVANCE
// =============================================================================

fn advance<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    field: &Field,
    sub_flow: Option<SubFlow>,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    // A sub-flow that asks exactly one field stops here regardless of what
    // the branch would ask next.
    if let Some(sf) = sub_flow {
        let message = store
            .message(sf.message)?
            .ok_or(EnrollError::MessageNotFound(sf.message))?;
        if matches!(
            message.reply,
            Some(crate::types::ReplyCapability::AnswerOneField { .. })
        ) {
            return finish_sub_flow(store, participant, sf, services);
        }
    }

    match traverse::next_step(store, field)? {
        Step::Ask(next) => ask(store, participant, &next, sub_flow, settings, services),
        Step::Finished => match sub_flow {
            Some(sf) => finish_sub_flow(store, participant, sf, services),
            None => complete_registration(store, participant, settings, services),
        },
    }
}

fn finish_sub_flow<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    sub_flow: SubFlow,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    participant.conversation = Conversation::Idle;
    store.put_participant(participant)?;

    let message = store
        .message(sub_flow.message)?
        .ok_or(EnrollError::MessageNotFound(sub_flow.message))?;
    let reply = message.reply.as_ref().ok_or_else(|| {
        EnrollError::Config(format!("message '{}' lost its reply capability", message.key))
    })?;
    let confirmation = reply
        .confirmations()
        .get(sub_flow.index as usize)
        .ok_or_else(|| {
            EnrollError::Config(format!(
                "message '{}' has no confirmation for button {}",
                message.key, sub_flow.index
            ))
        })?
        .clone();

    recompute_after_registration(store, participant, services)?;

    let keyboard = menu::keyboard(store, participant)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(confirmation, keyboard),
    )])
}

fn complete_registration<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    participant.conversation = Conversation::Idle;

    let mut out = Vec::new();

    // Activation happens exactly once.
    if participant.status == ParticipantStatus::Inactive {
        participant.status = ParticipantStatus::Active;
        store.put_participant(participant)?;
        compute_fields(
            store,
            participant,
            FieldStatus::ComputedAfterRegistration,
            services.renderer,
            services.clock.today(),
        )?;

        let count = store.active_participant_count()?;
        if settings.milestone_interval > 0 && count % settings.milestone_interval == 0 {
            let mut ctx = crate::services::RenderContext::new();
            ctx.insert("count".to_string(), count.to_string());
            let notice = services.renderer.render(&settings.milestone_template, &ctx)?;
            out.extend(admin_broadcast(store, &notice)?);
        }
    } else {
        store.put_participant(participant)?;
        recompute_after_registration(store, participant, services)?;
    }

    let keyboard = menu::keyboard(store, participant)?;
    out.push(send(
        participant.id,
        OutMessage::with_keyboard(settings.registration_complete_text.clone(), keyboard),
    ));
    Ok(out)
}

/// Re-evaluate after-registration fields when a conversational context
/// closes for an already-active participant.
fn recompute_after_registration<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &Participant,
    services: &Services<'_, C, R, B>,
) -> Result<(), EnrollError> {
    if participant.status == ParticipantStatus::Active {
        compute_fields(
            store,
            participant,
            FieldStatus::ComputedAfterRegistration,
            services.renderer,
            services.clock.today(),
        )?;
    }
    Ok(())
}

/// One notice to every admin group.
fn admin_broadcast<S: Store>(store: &S, text: &str) -> Result<Vec<Outbound>, EnrollError> {
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
// DEFER / RESTORE
// =============================================================================

fn defer<S: Store>(
    store: &mut S,
    participant: &mut Participant,
    field: FieldId,
    sub_flow: Option<SubFlow>,
    settings: &Settings,
) -> Result<Vec<Outbound>, EnrollError> {
    participant.deferred = Some(FlowContext { field, sub_flow });
    participant.conversation = Conversation::Idle;
    store.put_participant(participant)?;

    let keyboard = menu::keyboard(store, participant)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(settings.deferred_text.clone(), keyboard),
    )])
}

fn restore<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    mut participant: Participant,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    let Some(snapshot) = participant.deferred else {
        let keyboard = menu::keyboard(store, &participant)?;
        return Ok(vec![send(
            participant.id,
            OutMessage::with_keyboard(settings.unknown_key_text.clone(), keyboard),
        )]);
    };

    participant.deferred = None;
    let field = store
        .field(snapshot.field)?
        .ok_or(EnrollError::FieldNotFound(snapshot.field))?;
    ask(
        store,
        &mut participant,
        &field,
        snapshot.sub_flow,
        settings,
        services,
    )
}

// =============================================================================
// EDIT IN PLACE
// =============================================================================

fn begin_edit<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    mut participant: Participant,
    field: FieldId,
    target: u64,
    panel_only: bool,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    let field = store.field(field)?.ok_or(EnrollError::FieldNotFound(field))?;
    field.check()?;
    let branch = store
        .branch(field.branch)?
        .ok_or(EnrollError::BranchNotFound(field.branch))?;
    if !branch.is_bot_editable {
        let keyboard = menu::keyboard(store, &participant)?;
        return Ok(vec![send(
            participant.id,
            OutMessage::with_keyboard(settings.unknown_key_text.clone(), keyboard),
        )]);
    }

    participant.conversation = Conversation::Editing {
        field: field.id,
        target,
        panel_only,
    };
    store.put_participant(&participant)?;

    let ctx = participant_context(store, &participant)?;
    let body = services.renderer.render(&field.prompt, &ctx)?;
    let keyboard = question_keyboard(store, &field, settings, true)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(body, keyboard),
    )])
}

fn cancel_edit<S: Store>(
    store: &mut S,
    participant: &mut Participant,
    settings: &Settings,
) -> Result<Vec<Outbound>, EnrollError> {
    participant.conversation = Conversation::Idle;
    store.put_participant(participant)?;

    let keyboard = menu::keyboard(store, participant)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(settings.edit_canceled_text.clone(), keyboard),
    )])
}

fn finish_edit<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    participant: &mut Participant,
    field: &Field,
    raw: &RawAnswer,
    target: u64,
    panel_only: bool,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    if let Some(reprompt) = store_answer(store, participant, field, raw, settings, services)? {
        let keyboard = question_keyboard(store, field, settings, true)?;
        return Ok(vec![send(
            participant.id,
            OutMessage::with_keyboard(reprompt, keyboard),
        )]);
    }

    participant.conversation = Conversation::Idle;
    store.put_participant(participant)?;
    recompute_after_registration(store, participant, services)?;

    let mut ctx = crate::services::RenderContext::new();
    ctx.insert("state".to_string(), field.key.clone());
    let confirmation = services
        .renderer
        .render(&settings.edit_confirmed_template, &ctx)?;

    let keyboard = menu::keyboard(store, participant)?;
    let mut out = vec![send(
        participant.id,
        OutMessage::with_keyboard(confirmation, keyboard),
    )];

    // Refresh the profile message the edit button lived under.
    let panel = profile_keyboard(store, field.branch)?;
    if panel_only {
        out.push(Outbound::EditKeyboard {
            to: participant.id,
            target,
            keyboard: panel,
        });
    } else {
        out.push(Outbound::EditText {
            to: participant.id,
            target,
            body: profile_text(store, participant, field.branch)?,
            keyboard: panel,
        });
    }
    Ok(out)
}

// =============================================================================
// PROFILE RENDERING
// =============================================================================

/// Registration summary of one branch: `key: value` per askable field.
pub fn profile_text<S: Store>(
    store: &S,
    participant: &Participant,
    branch: crate::types::BranchId,
) -> Result<String, EnrollError> {
    let mut lines = Vec::new();
    for field in store.fields_in_branch(branch)? {
        if matches!(
            field.status,
            FieldStatus::Inactive | FieldStatus::PersonalNotification
        ) {
            continue;
        }
        let value = store
            .value(participant.id, field.id)?
            .map(|v| v.value)
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!("{}: {}", field.key, value));
    }
    Ok(lines.join("\n"))
}

/// Inline keyboard of per-field edit buttons for a branch summary.
pub fn profile_keyboard<S: Store>(
    store: &S,
    branch: crate::types::BranchId,
) -> Result<Keyboard, EnrollError> {
    let rows: Vec<Vec<InlineButton>> = store
        .fields_in_branch(branch)?
        .into_iter()
        .filter(|f| f.status == FieldStatus::Normal)
        .map(|f| {
            vec![InlineButton {
                label: f.key.clone(),
                action: ButtonAction::EditField { field: f.id },
            }]
        })
        .collect();
    if rows.is_empty() {
        return Ok(Keyboard::None);
    }
    Ok(Keyboard::Inline(rows))
}

// =============================================================================
// REPLY BUTTONS
// =============================================================================

fn on_reply_button<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    mut participant: Participant,
    message: MessageId,
    index: u32,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    let msg = store
        .message(message)?
        .ok_or(EnrollError::MessageNotFound(message))?;

    // The gate is re-checked at press time; visibility may have changed
    // since the message was shown.
    if !message_available(store, participant.id, &msg)? {
        let keyboard = menu::keyboard(store, &participant)?;
        return Ok(vec![send(
            participant.id,
            OutMessage::with_keyboard(settings.unknown_key_text.clone(), keyboard),
        )]);
    }

    let reply = msg.reply.clone().ok_or_else(|| {
        EnrollError::Config(format!("message '{}' has no reply capability", msg.key))
    })?;
    if index as usize >= reply.labels().len() {
        return Err(EnrollError::Config(format!(
            "message '{}' has no button {index}",
            msg.key
        )));
    }
    let sub_flow = SubFlow { message, index };

    match reply {
        crate::types::ReplyCapability::StartBranch { branch, .. } => {
            let first = traverse::first_field(store, branch)?;
            ask(store, &mut participant, &first, Some(sub_flow), settings, services)
        }
        crate::types::ReplyCapability::AnswerOneField { field, .. } => {
            let field = store.field(field)?.ok_or(EnrollError::FieldNotFound(field))?;
            ask(store, &mut participant, &field, Some(sub_flow), settings, services)
        }
        crate::types::ReplyCapability::PickFromList {
            field,
            labels,
            confirmations,
        } => {
            store.put_value(&ParticipantFieldValue::plain(
                participant.id,
                field,
                labels[index as usize].clone(),
            ))?;
            recompute_after_registration(store, &participant, services)?;

            let keyboard = menu::keyboard(store, &participant)?;
            Ok(vec![send(
                participant.id,
                OutMessage::with_keyboard(confirmations[index as usize].clone(), keyboard),
            )])
        }
    }
}

// =============================================================================
// MENU HITS
// =============================================================================

fn menu_hit<S: Store, C: Clock, R: Renderer, B: Blobs>(
    store: &mut S,
    mut participant: Participant,
    label: &str,
    settings: &Settings,
    services: &Services<'_, C, R, B>,
) -> Result<Vec<Outbound>, EnrollError> {
    match menu::select(store, &participant, label)? {
        MenuOutcome::Descend(key) => {
            participant.menu_position = Some(key.id);
            store.put_participant(&participant)?;
            menu_panel(store, &participant, settings)
        }
        MenuOutcome::Ascend => {
            participant.menu_position = menu::ascend_position(store, &participant)?;
            store.put_participant(&participant)?;
            menu_panel(store, &participant, settings)
        }
        MenuOutcome::Unknown => {
            let keyboard = menu::keyboard(store, &participant)?;
            Ok(vec![send(
                participant.id,
                OutMessage::with_keyboard(settings.unknown_key_text.clone(), keyboard),
            )])
        }
        MenuOutcome::Act(key) => match key.status {
            MenuKeyStatus::Plain { message } => {
                let msg = store
                    .message(message)?
                    .ok_or(EnrollError::MessageNotFound(message))?;
                let mut payload = messages::payload(&msg, settings)?;
                let ctx = participant_context(store, &participant)?;
                payload.body = services.renderer.render(&payload.body, &ctx)?;
                Ok(vec![send(participant.id, payload)])
            }
            MenuKeyStatus::RestoreDeferred => restore(store, participant, settings, services),
            MenuKeyStatus::ShowProfile { branch } => {
                let body = profile_text(store, &participant, branch)?;
                Ok(vec![send(participant.id, OutMessage::text(body))])
            }
            MenuKeyStatus::EditProfile { branch } => {
                let body = profile_text(store, &participant, branch)?;
                let keyboard = profile_keyboard(store, branch)?;
                Ok(vec![send(
                    participant.id,
                    OutMessage::with_keyboard(body, keyboard),
                )])
            }
            MenuKeyStatus::ShowNews => {
                Ok(vec![send(participant.id, OutMessage::text(settings.news_text.clone()))])
            }
            MenuKeyStatus::ShowCodes => {
                Ok(vec![send(participant.id, OutMessage::text(settings.codes_text.clone()))])
            }
            MenuKeyStatus::ShowPassStatus => {
                Ok(vec![send(participant.id, OutMessage::text(settings.pass_text.clone()))])
            }
            // Resolved by menu::select before reaching an action.
            MenuKeyStatus::GoUp | MenuKeyStatus::Inactive => {
                let keyboard = menu::keyboard(store, &participant)?;
                Ok(vec![send(
                    participant.id,
                    OutMessage::with_keyboard(settings.unknown_key_text.clone(), keyboard),
                )])
            }
        },
    }
}

fn menu_panel<S: Store>(
    store: &S,
    participant: &Participant,
    settings: &Settings,
) -> Result<Vec<Outbound>, EnrollError> {
    let keyboard = menu::keyboard(store, participant)?;
    Ok(vec![send(
        participant.id,
        OutMessage::with_keyboard(settings.menu_text.clone(), keyboard),
    )])
}

// =============================================================================
// TESTS
// =============================================================================
