//! # Conversation Flow Tests
//!
//! End-to-end journeys through the public engine API: registration across
//! a branch chain, sub-flows started from message buttons, in-place edits
//! and menu navigation.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use enroll_core::validate::{Attachment, AttachmentMedia};
use enroll_core::{
    Branch, BranchId, ConditionalMessage, Conversation, EnrollError, Event, Field,
    FieldId, FieldStatus, FieldType, FixedClock, Group, GroupId, GroupStatus, Keyboard, MemoryStore,
    MenuKey, MenuKeyId, MenuKeyStatus, MessageId, NullBlobs, OutMessage, Outbound, Participant,
    ParticipantStatus, RawAnswer, Recipient, RenderContext, Renderer, ReplyCapability, Services,
    Settings, Store, ValidationRule, handle,
};

// =============================================================================
// FIXTURE
// =============================================================================

/// Minimal `{{ key }}` substitution, mirroring the app adapter.
struct SubstRenderer;

impl Renderer for SubstRenderer {
    fn render(&self, template: &str, ctx: &RenderContext) -> Result<String, EnrollError> {
        let mut out = template.to_string();
        for (key, value) in ctx {
            out = out.replace(&format!("{{{{ {key} }}}}"), value);
        }
        Ok(out)
    }
}

static RENDERER: SubstRenderer = SubstRenderer;
static BLOBS: NullBlobs = NullBlobs;

fn services(clock: &FixedClock) -> Services<'_, FixedClock, SubstRenderer, NullBlobs> {
    Services {
        clock,
        renderer: &RENDERER,
        blobs: &BLOBS,
    }
}

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap())
}

fn branch(id: u64, key: &str, next: Option<u64>) -> Branch {
    Branch {
        id: BranchId(id),
        key: key.to_string(),
        description: String::new(),
        is_deferrable: true,
        is_bot_editable: true,
        is_ui_editable: true,
        next_branch: next.map(BranchId),
    }
}

fn field(id: u64, key: &str, branch: u64, order: u64) -> Field {
    Field {
        id: FieldId(id),
        key: key.to_string(),
        branch: BranchId(branch),
        order,
        prompt: format!("Your {key}?"),
        field_type: FieldType::FreeText,
        status: FieldStatus::Normal,
        is_skippable: false,
        bucket: None,
        answer_options: vec![],
        validation: vec![],
    }
}

/// Two-branch registration: name and year on `main`, city on `extra`.
fn seed() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.put_branch(&branch(1, "main", Some(2))).unwrap();
    store.put_branch(&branch(2, "extra", None)).unwrap();
    store.put_field(&field(1, "name", 1, 10)).unwrap();
    let mut year = field(2, "year", 1, 20);
    year.validation = vec![ValidationRule::MatchPattern {
        pattern: r"\d{4}$".to_string(),
        error_text: "Four digits, please.".to_string(),
    }];
    store.put_field(&year).unwrap();
    store.put_field(&field(3, "city", 2, 10)).unwrap();
    store
}

fn text(t: &str) -> Event {
    Event::Message(RawAnswer::Text(t.to_string()))
}

fn sent_bodies(out: &[Outbound]) -> Vec<String> {
    out.iter()
        .filter_map(|o| match o {
            Outbound::Send { message, .. } => Some(message.body.clone()),
            _ => None,
        })
        .collect()
}

fn participant(store: &MemoryStore, chat: i64) -> Participant {
    store.participant_by_chat(chat).unwrap().unwrap()
}

// =============================================================================
// REGISTRATION
// =============================================================================

#[test]
fn test_registration_crosses_branches_and_activates() {
    let mut store = seed();
    let clock = clock();
    let svc = services(&clock);

    let out = handle(&mut store, 7, Event::Start { handle: Some("ada".into()) }, &svc).unwrap();
    let bodies = sent_bodies(&out);
    assert_eq!(bodies[0], Settings::default().start_text);
    assert_eq!(bodies[1], "Your name?");

    handle(&mut store, 7, text("Ada"), &svc).unwrap();
    handle(&mut store, 7, text("1815"), &svc).unwrap();
    let out = handle(&mut store, 7, text("London"), &svc).unwrap();

    let p = participant(&store, 7);
    assert_eq!(p.status, ParticipantStatus::Active);
    assert_eq!(p.conversation, Conversation::Idle);
    assert_eq!(store.value(p.id, FieldId(3)).unwrap().unwrap().value, "London");
    assert!(
        sent_bodies(&out).contains(&Settings::default().registration_complete_text)
    );
}

#[test]
fn test_rejected_answer_reprompts_and_holds_position() {
    let mut store = seed();
    let clock = clock();
    let svc = services(&clock);

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();

    let out = handle(&mut store, 7, text("MDCCCXV"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec!["Four digits, please.".to_string()]);

    let p = participant(&store, 7);
    assert_eq!(
        p.conversation,
        Conversation::Answering {
            field: FieldId(2),
            sub_flow: None
        }
    );
    assert!(store.value(p.id, FieldId(2)).unwrap().is_none());
}

#[test]
fn test_second_completion_does_not_reactivate() {
    let mut store = seed();
    let clock = clock();
    let svc = services(&clock);
    let mut settings = Settings::default();
    settings.milestone_interval = 1;
    store.put_settings(&settings).unwrap();
    store
        .put_group(&Group {
            id: GroupId(1),
            chat: -100,
            description: String::new(),
            status: GroupStatus::Admin,
        })
        .unwrap();

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();
    handle(&mut store, 7, text("1815"), &svc).unwrap();
    let first = handle(&mut store, 7, text("London"), &svc).unwrap();

    // One milestone notice on activation, none on later edits.
    let admin_sends = |out: &[Outbound]| {
        out.iter()
            .filter(|o| matches!(o, Outbound::Send { to: Recipient::Group(_), .. }))
            .count()
    };
    assert_eq!(admin_sends(&first), 1);
}

#[test]
fn test_boolean_fields_are_not_asked() {
    let mut store = seed();
    let clock = clock();
    let svc = services(&clock);
    let mut consent = field(4, "consent", 1, 15);
    consent.field_type = FieldType::Boolean;
    store.put_field(&consent).unwrap();

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    let out = handle(&mut store, 7, text("Ada"), &svc).unwrap();

    // Order 15 is skipped; the year question at order 20 comes next.
    assert_eq!(sent_bodies(&out), vec!["Your year?".to_string()]);
}

// =============================================================================
// SKIP AND DEFER
// =============================================================================

#[test]
fn test_skip_moves_on_without_a_value() {
    let mut store = seed();
    let mut year = store.field(FieldId(2)).unwrap().unwrap();
    year.is_skippable = true;
    store.put_field(&year).unwrap();
    let clock = clock();
    let svc = services(&clock);

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();
    let out = handle(&mut store, 7, text(&Settings::default().skip_label), &svc).unwrap();

    assert_eq!(sent_bodies(&out), vec!["Your city?".to_string()]);
    let p = participant(&store, 7);
    assert!(store.value(p.id, FieldId(2)).unwrap().is_none());
}

#[test]
fn test_defer_parks_and_menu_key_resumes() {
    let mut store = seed();
    store
        .put_menu_key(&MenuKey {
            id: MenuKeyId(1),
            label: "Resume".to_string(),
            parent: None,
            status: MenuKeyStatus::RestoreDeferred,
        })
        .unwrap();
    let clock = clock();
    let svc = services(&clock);
    let settings = Settings::default();

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();

    let out = handle(&mut store, 7, text(&settings.defer_label), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec![settings.deferred_text.clone()]);
    assert!(participant(&store, 7).deferred.is_some());

    let out = handle(&mut store, 7, text("Resume"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec!["Your year?".to_string()]);
    let p = participant(&store, 7);
    assert!(p.deferred.is_none());
    assert_eq!(
        p.conversation,
        Conversation::Answering {
            field: FieldId(2),
            sub_flow: None
        }
    );
}

// =============================================================================
// MESSAGE SUB-FLOWS
// =============================================================================

fn registered(store: &mut MemoryStore, chat: i64) {
    let clock = clock();
    let svc = services(&clock);
    handle(store, chat, Event::Start { handle: None }, &svc).unwrap();
    handle(store, chat, text("Ada"), &svc).unwrap();
    handle(store, chat, text("1815"), &svc).unwrap();
    handle(store, chat, text("London"), &svc).unwrap();
}

fn message(id: u64, reply: Option<ReplyCapability>) -> ConditionalMessage {
    ConditionalMessage {
        id: MessageId(id),
        key: format!("m{id}"),
        body: "Interested?".to_string(),
        photo: None,
        photo_handle: None,
        visibility_field: None,
        reply,
    }
}

#[test]
fn test_branch_sub_flow_confirms_and_returns_to_idle() {
    let mut store = seed();
    store.put_branch(&branch(3, "side", None)).unwrap();
    store.put_field(&field(10, "team", 3, 10)).unwrap();
    store
        .put_message(&message(
            1,
            Some(ReplyCapability::StartBranch {
                branch: BranchId(3),
                labels: vec!["Join".to_string()],
                confirmations: vec!["Welcome aboard!".to_string()],
            }),
        ))
        .unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    let out = handle(
        &mut store,
        7,
        Event::ReplyButton {
            message: MessageId(1),
            index: 0,
        },
        &svc,
    )
    .unwrap();
    assert_eq!(sent_bodies(&out), vec!["Your team?".to_string()]);

    let out = handle(&mut store, 7, text("Engine Room"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec!["Welcome aboard!".to_string()]);

    let p = participant(&store, 7);
    assert_eq!(p.conversation, Conversation::Idle);
    assert_eq!(
        store.value(p.id, FieldId(10)).unwrap().unwrap().value,
        "Engine Room"
    );
}

#[test]
fn test_single_field_sub_flow_stops_after_one_answer() {
    let mut store = seed();
    store
        .put_message(&message(
            1,
            Some(ReplyCapability::AnswerOneField {
                field: FieldId(1),
                labels: vec!["Rename".to_string()],
                confirmations: vec!["Noted.".to_string()],
            }),
        ))
        .unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    handle(
        &mut store,
        7,
        Event::ReplyButton {
            message: MessageId(1),
            index: 0,
        },
        &svc,
    )
    .unwrap();
    let out = handle(&mut store, 7, text("Augusta"), &svc).unwrap();

    // Only the confirmation; traversal does not continue to the year field.
    assert_eq!(sent_bodies(&out), vec!["Noted.".to_string()]);
    let p = participant(&store, 7);
    assert_eq!(p.conversation, Conversation::Idle);
    assert_eq!(store.value(p.id, FieldId(1)).unwrap().unwrap().value, "Augusta");
}

#[test]
fn test_pick_from_list_stores_pressed_label() {
    let mut store = seed();
    let mut size = field(20, "size", 1, 90);
    size.field_type = FieldType::Boolean;
    store.put_field(&size).unwrap();
    store
        .put_message(&message(
            1,
            Some(ReplyCapability::PickFromList {
                field: FieldId(20),
                labels: vec!["Yes".to_string(), "No".to_string()],
                confirmations: vec!["Great!".to_string(), "Maybe next time.".to_string()],
            }),
        ))
        .unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    let out = handle(
        &mut store,
        7,
        Event::ReplyButton {
            message: MessageId(1),
            index: 1,
        },
        &svc,
    )
    .unwrap();

    assert_eq!(sent_bodies(&out), vec!["Maybe next time.".to_string()]);
    let p = participant(&store, 7);
    assert_eq!(store.value(p.id, FieldId(20)).unwrap().unwrap().value, "No");
}

#[test]
fn test_gated_button_press_is_rejected() {
    let mut store = seed();
    let mut gated = message(
        1,
        Some(ReplyCapability::StartBranch {
            branch: BranchId(2),
            labels: vec!["Go".to_string()],
            confirmations: vec!["ok".to_string()],
        }),
    );
    gated.visibility_field = Some(FieldId(99));
    store.put_message(&gated).unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    let out = handle(
        &mut store,
        7,
        Event::ReplyButton {
            message: MessageId(1),
            index: 0,
        },
        &svc,
    )
    .unwrap();

    assert_eq!(sent_bodies(&out), vec![Settings::default().unknown_key_text]);
    assert_eq!(participant(&store, 7).conversation, Conversation::Idle);
}

// =============================================================================
// EDIT IN PLACE
// =============================================================================

#[test]
fn test_edit_updates_value_and_refreshes_panel() {
    let mut store = seed();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    let out = handle(
        &mut store,
        7,
        Event::EditField {
            field: FieldId(1),
            target: 555,
            panel_only: false,
        },
        &svc,
    )
    .unwrap();
    assert_eq!(sent_bodies(&out), vec!["Your name?".to_string()]);

    let out = handle(&mut store, 7, text("Augusta"), &svc).unwrap();
    let p = participant(&store, 7);
    assert_eq!(store.value(p.id, FieldId(1)).unwrap().unwrap().value, "Augusta");
    assert_eq!(p.conversation, Conversation::Idle);

    assert_eq!(sent_bodies(&out), vec!["Updated name.".to_string()]);
    match out.last().unwrap() {
        Outbound::EditText { target, body, .. } => {
            assert_eq!(*target, 555);
            assert!(body.contains("name: Augusta"));
        }
        other => panic!("expected an in-place edit, got {other:?}"),
    }
}

#[test]
fn test_panel_only_edit_refreshes_keyboard_only() {
    let mut store = seed();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    handle(
        &mut store,
        7,
        Event::EditField {
            field: FieldId(1),
            target: 555,
            panel_only: true,
        },
        &svc,
    )
    .unwrap();
    let out = handle(&mut store, 7, text("Augusta"), &svc).unwrap();

    assert!(matches!(
        out.last().unwrap(),
        Outbound::EditKeyboard { target: 555, .. }
    ));
}

#[test]
fn test_cancel_leaves_value_untouched() {
    let mut store = seed();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);
    let settings = Settings::default();

    handle(
        &mut store,
        7,
        Event::EditField {
            field: FieldId(1),
            target: 555,
            panel_only: false,
        },
        &svc,
    )
    .unwrap();
    let out = handle(&mut store, 7, text(&settings.cancel_label), &svc).unwrap();

    assert_eq!(sent_bodies(&out), vec![settings.edit_canceled_text.clone()]);
    let p = participant(&store, 7);
    assert_eq!(p.conversation, Conversation::Idle);
    assert_eq!(store.value(p.id, FieldId(1)).unwrap().unwrap().value, "Ada");
}

// =============================================================================
// UPLOADS
// =============================================================================

#[test]
fn test_image_answer_stores_blob_name_and_handle() {
    let mut store = seed();
    let mut badge = field(5, "badge", 2, 20);
    badge.field_type = FieldType::Image;
    badge.bucket = Some("badges".to_string());
    store.put_field(&badge).unwrap();
    let clock = clock();
    let svc = services(&clock);

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();
    handle(&mut store, 7, text("1815"), &svc).unwrap();
    handle(&mut store, 7, text("London"), &svc).unwrap();

    // "badge" is the last field of the chain, asked right after "city".
    let p = participant(&store, 7);
    assert_eq!(
        p.conversation,
        Conversation::Answering {
            field: FieldId(5),
            sub_flow: None
        }
    );

    handle(
        &mut store,
        7,
        Event::Message(RawAnswer::Attachment(Attachment {
            media: AttachmentMedia::Photo,
            handle: "h-77".to_string(),
            size_kb: 100,
            bytes: vec![1, 2, 3],
        })),
        &svc,
    )
    .unwrap();

    let value = store.value(p.id, FieldId(5)).unwrap().unwrap();
    assert_eq!(value.value, format!("Ada.{}.thumbnail.jpg", p.id.0));
    assert_eq!(value.file_handle.as_deref(), Some("h-77"));
}

#[test]
fn test_oversized_upload_reprompts_in_flow() {
    let mut store = seed();
    let mut paper = field(5, "paper", 2, 20);
    paper.field_type = FieldType::Pdf;
    paper.bucket = Some("papers".to_string());
    store.put_field(&paper).unwrap();
    let clock = clock();
    let svc = services(&clock);
    let settings = Settings::default();

    handle(&mut store, 7, Event::Start { handle: None }, &svc).unwrap();
    handle(&mut store, 7, text("Ada"), &svc).unwrap();
    handle(&mut store, 7, text("1815"), &svc).unwrap();
    handle(&mut store, 7, text("London"), &svc).unwrap();

    let out = handle(
        &mut store,
        7,
        Event::Message(RawAnswer::Attachment(Attachment {
            media: AttachmentMedia::Document {
                mime: Some("application/pdf".to_string()),
            },
            handle: "h-1".to_string(),
            size_kb: settings.max_document_kb + 1,
            bytes: vec![],
        })),
        &svc,
    )
    .unwrap();

    assert_eq!(sent_bodies(&out), vec![settings.file_too_large_text.clone()]);
    let p = participant(&store, 7);
    assert!(store.value(p.id, FieldId(5)).unwrap().is_none());
    assert_eq!(
        p.conversation,
        Conversation::Answering {
            field: FieldId(5),
            sub_flow: None
        }
    );
}

// =============================================================================
// MENU NAVIGATION
// =============================================================================

#[test]
fn test_menu_descend_and_ascend() {
    let mut store = seed();
    for (id, label, parent, status) in [
        (1u64, "About", None, MenuKeyStatus::ShowNews),
        (2, "More", None, MenuKeyStatus::ShowNews),
    ] {
        store
            .put_menu_key(&MenuKey {
                id: MenuKeyId(id),
                label: label.to_string(),
                parent: parent.map(MenuKeyId),
                status,
            })
            .unwrap();
    }
    store
        .put_menu_key(&MenuKey {
            id: MenuKeyId(3),
            label: "Back".to_string(),
            parent: Some(MenuKeyId(1)),
            status: MenuKeyStatus::GoUp,
        })
        .unwrap();
    store
        .put_menu_key(&MenuKey {
            id: MenuKeyId(4),
            label: "Detail".to_string(),
            parent: Some(MenuKeyId(1)),
            status: MenuKeyStatus::ShowCodes,
        })
        .unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);
    let settings = Settings::default();

    let out = handle(&mut store, 7, text("About"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec![settings.menu_text.clone()]);
    assert_eq!(participant(&store, 7).menu_position, Some(MenuKeyId(1)));

    let out = handle(&mut store, 7, text("Detail"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec![settings.codes_text.clone()]);

    let out = handle(&mut store, 7, text("Back"), &svc).unwrap();
    assert_eq!(sent_bodies(&out), vec![settings.menu_text.clone()]);
    assert_eq!(participant(&store, 7).menu_position, None);
}

#[test]
fn test_unknown_menu_text_reprompts_with_keyboard() {
    let mut store = seed();
    store
        .put_menu_key(&MenuKey {
            id: MenuKeyId(1),
            label: "News".to_string(),
            parent: None,
            status: MenuKeyStatus::ShowNews,
        })
        .unwrap();
    registered(&mut store, 7);
    let clock = clock();
    let svc = services(&clock);

    let out = handle(&mut store, 7, text("Nonsense"), &svc).unwrap();
    match &out[0] {
        Outbound::Send { message: OutMessage { body, keyboard, .. }, .. } => {
            assert_eq!(body, &Settings::default().unknown_key_text);
            assert_eq!(keyboard, &Keyboard::Reply(vec![vec!["News".to_string()]]));
        }
        other => panic!("expected send, got {other:?}"),
    }
}
