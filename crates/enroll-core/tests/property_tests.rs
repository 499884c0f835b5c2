//! # Property-Based Tests
//!
//! Proptest coverage for the invariants the engine leans on: traversal
//! monotonicity, keyboard layout, validation pipeline behavior, cycle
//! rejection and delivery idempotency.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use enroll_core::menu::layout_rows;
use enroll_core::scheduler::perform_pass;
use enroll_core::validate::prepare_text;
use enroll_core::{
    Branch, BranchId, ConditionalMessage, Conversation, Field, FieldId, FieldStatus, FieldType,
    FixedClock, MemoryStore, MessageId, Notification, NotificationId, NotificationStatus,
    Participant, ParticipantId, ParticipantStatus, Prepared, RenderContext, Renderer, Settings,
    Step, Store, ValidationRule, branch_chain_cycle, first_field, next_step,
};
use proptest::collection::vec;
use proptest::prelude::*;

struct IdentityRenderer;

impl Renderer for IdentityRenderer {
    fn render(
        &self,
        template: &str,
        _ctx: &RenderContext,
    ) -> Result<String, enroll_core::EnrollError> {
        Ok(template.to_string())
    }
}

fn branch(id: u64, next: Option<u64>) -> Branch {
    Branch {
        id: BranchId(id),
        key: format!("b{id}"),
        description: String::new(),
        is_deferrable: false,
        is_bot_editable: false,
        is_ui_editable: true,
        next_branch: next.map(BranchId),
    }
}

fn field(id: u64, branch: u64, order: u64, status: FieldStatus, field_type: FieldType) -> Field {
    Field {
        id: FieldId(id),
        key: format!("f{id}"),
        branch: BranchId(branch),
        order,
        prompt: "?".to_string(),
        field_type,
        status,
        is_skippable: false,
        bucket: None,
        answer_options: vec![],
        validation: vec![],
    }
}

fn askable(f: &Field) -> bool {
    f.status == FieldStatus::Normal && f.field_type != FieldType::Boolean
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Walking a branch visits askable fields in strictly increasing order
    /// and never yields an inactive or boolean field.
    #[test]
    fn traversal_is_monotonic_and_filtered(
        specs in vec((1u64..1000, 0u8..3), 1..20)
    ) {
        let mut store = MemoryStore::new();
        store.put_branch(&branch(1, None)).expect("branch");
        for (i, (order, kind)) in specs.iter().enumerate() {
            let (status, field_type) = match kind {
                0 => (FieldStatus::Normal, FieldType::FreeText),
                1 => (FieldStatus::Inactive, FieldType::FreeText),
                _ => (FieldStatus::Normal, FieldType::Boolean),
            };
            store
                .put_field(&field(i as u64 + 1, 1, *order, status, field_type))
                .expect("field");
        }

        let Ok(mut current) = first_field(&store, BranchId(1)) else {
            // Only reachable when the branch has no fields at all; the
            // generator always adds at least one.
            return Err(TestCaseError::fail("first_field on non-empty branch"));
        };
        let mut visited = 1usize;
        while let Step::Ask(next) = next_step(&store, &current).expect("step") {
            prop_assert!(next.order > current.order);
            prop_assert!(askable(&next));
            current = next;
            visited += 1;
            prop_assert!(visited <= specs.len());
        }
    }

    /// Keyboard layout never loses or reorders labels, and respects the
    /// single-column threshold.
    #[test]
    fn layout_preserves_labels(labels in vec("[a-z]{1,8}", 0..12)) {
        let rows = layout_rows(labels.clone());
        let flat: Vec<String> = rows.iter().flatten().cloned().collect();
        prop_assert_eq!(&flat, &labels);

        if labels.len() <= 3 {
            prop_assert!(rows.iter().all(|r| r.len() == 1));
        } else {
            prop_assert!(rows.iter().all(|r| r.len() <= 2));
        }
    }

    /// Strip followed by Uppercase leaves no whitespace and no lowercase,
    /// whatever the input.
    #[test]
    fn strip_and_uppercase_normalize(input in ".{0,40}") {
        let f = Field {
            validation: vec![
                ValidationRule::Strip { pattern: r"\s".to_string() },
                ValidationRule::Uppercase,
            ],
            ..field(1, 1, 10, FieldStatus::Normal, FieldType::FreeText)
        };
        let today = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap().date_naive();
        match prepare_text(&f, &Settings::default(), &input, today).expect("prepare") {
            Prepared::Value(v) => {
                prop_assert!(!v.chars().any(char::is_whitespace));
                prop_assert!(!v.chars().any(char::is_lowercase));
            }
            other => return Err(TestCaseError::fail(format!("unexpected {other:?}"))),
        }
    }

    /// The match rule accepts exactly the inputs whose digits start at
    /// position zero.
    #[test]
    fn match_pattern_is_prefix_anchored(input in "[a-z0-9]{0,12}") {
        let f = Field {
            validation: vec![ValidationRule::MatchPattern {
                pattern: r"\d+".to_string(),
                error_text: "no".to_string(),
            }],
            ..field(1, 1, 10, FieldStatus::Normal, FieldType::FreeText)
        };
        let today = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap().date_naive();
        let out = prepare_text(&f, &Settings::default(), &input, today).expect("prepare");
        let starts_with_digit = input.chars().next().is_some_and(|c| c.is_ascii_digit());
        match out {
            Prepared::Value(_) => prop_assert!(starts_with_digit),
            Prepared::Reprompt(_) => prop_assert!(!starts_with_digit),
            Prepared::Upload { .. } => return Err(TestCaseError::fail("upload from text")),
        }
    }

    /// A straight chain of branches is accepted; closing it into a ring is
    /// rejected, whichever link closes the ring.
    #[test]
    fn chains_accepted_rings_rejected(len in 2u64..8) {
        let mut store = MemoryStore::new();
        for id in 2..=len {
            let next = if id == len { None } else { Some(id + 1) };
            store.put_branch(&branch(id, next)).expect("branch");
        }

        let straight = branch(1, Some(2));
        prop_assert_eq!(branch_chain_cycle(&store, &straight).expect("check"), None);

        // Re-point the tail at the head and try to save the head again.
        store.put_branch(&branch(len, Some(1))).expect("branch");
        prop_assert!(
            branch_chain_cycle(&store, &straight).expect("check").is_some()
        );
    }

    /// However many eligible recipients exist, a delivered notification is
    /// never delivered twice.
    #[test]
    fn delivery_is_idempotent(participants in 0u64..12) {
        let mut store = MemoryStore::new();
        for id in 1..=participants {
            store
                .put_participant(&Participant {
                    id: ParticipantId(id),
                    chat: id as i64,
                    handle: None,
                    status: ParticipantStatus::Active,
                    is_blocked: false,
                    created_at: Utc::now(),
                    conversation: Conversation::Idle,
                    deferred: None,
                    menu_position: None,
                })
                .expect("participant");
        }
        store
            .put_message(&ConditionalMessage {
                id: MessageId(1),
                key: "hello".to_string(),
                body: "hello".to_string(),
                photo: None,
                photo_handle: None,
                visibility_field: None,
                reply: None,
            })
            .expect("message");
        store
            .put_notification(&Notification {
                id: NotificationId(1),
                message: MessageId(1),
                fire_at: Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap(),
                status: NotificationStatus::Planned,
            })
            .expect("notification");

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 5, 1, 11, 0, 0).unwrap());
        let first = perform_pass(&mut store, &clock, &IdentityRenderer).expect("pass");
        let second = perform_pass(&mut store, &clock, &IdentityRenderer).expect("pass");

        prop_assert_eq!(first.len() as u64, participants);
        prop_assert!(second.is_empty());
    }
}
