//! # Computed Fields
//!
//! Fields the engine fills in by rendering their prompt template over the
//! participant's stored values: on-create fields when the participant record
//! is created, after-registration fields on activation and whenever a
//! conversational context closes.

use crate::services::{RenderContext, Renderer};
use crate::store::Store;
use crate::types::{EnrollError, FieldStatus, Participant, ParticipantFieldValue};
use crate::validate::{Prepared, prepare_text};
use chrono::NaiveDate;

/// Flat template context for a participant: identity keys plus one entry
/// per stored answer, keyed by field key.
pub fn participant_context<S: Store>(
    store: &S,
    participant: &Participant,
) -> Result<RenderContext, EnrollError> {
    let mut ctx = RenderContext::new();
    ctx.insert("id".to_string(), participant.id.0.to_string());
    ctx.insert("chat".to_string(), participant.chat.to_string());
    if let Some(handle) = &participant.handle {
        ctx.insert("handle".to_string(), handle.clone());
    }
    for value in store.values_for(participant.id)? {
        if let Some(field) = store.field(value.field)? {
            ctx.insert(field.key, value.value);
        }
    }
    Ok(ctx)
}

/// Evaluate every computed field of the given status for one participant.
///
/// A rendered value that fails its field's preparation is skipped, not an
/// error: a partially filled participant simply does not produce it yet.
pub fn compute_fields<S: Store, R: Renderer>(
    store: &mut S,
    participant: &Participant,
    status: FieldStatus,
    renderer: &R,
    today: NaiveDate,
) -> Result<(), EnrollError> {
    debug_assert!(status.is_computed());

    let settings = store.settings()?;
    for field in store.fields_with_status(status)? {
        let ctx = participant_context(store, participant)?;
        let rendered = renderer.render(&field.prompt, &ctx)?;
        if let Prepared::Value(value) = prepare_text(&field, &settings, &rendered, today)? {
            store.put_value(&ParticipantFieldValue::plain(
                participant.id,
                field.id,
                value,
            ))?;
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{
        BranchId, Conversation, Field, FieldId, FieldType, ParticipantId, ParticipantStatus,
    };
    use chrono::Utc;

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

    fn participant() -> Participant {
        Participant {
            id: ParticipantId(4),
            chat: 44,
            handle: Some("ada".to_string()),
            status: ParticipantStatus::Inactive,
            is_blocked: false,
            created_at: Utc::now(),
            conversation: Conversation::Idle,
            deferred: None,
            menu_position: None,
        }
    }

    fn computed_field(id: u64, prompt: &str, status: FieldStatus) -> Field {
        Field {
            id: FieldId(id),
            key: format!("computed{id}"),
            branch: BranchId(1),
            order: 100 + id,
            prompt: prompt.to_string(),
            field_type: FieldType::FreeText,
            status,
            is_skippable: false,
            bucket: None,
            answer_options: vec![],
            validation: vec![],
        }
    }

    #[test]
    fn test_context_includes_identity_and_answers() {
        let mut store = MemoryStore::new();
        let p = participant();
        store
            .put_field(&computed_field(1, "unused", FieldStatus::Normal))
            .unwrap();
        store
            .put_value(&ParticipantFieldValue::plain(p.id, FieldId(1), "yes"))
            .unwrap();

        let ctx = participant_context(&store, &p).unwrap();
        assert_eq!(ctx.get("id").map(String::as_str), Some("4"));
        assert_eq!(ctx.get("handle").map(String::as_str), Some("ada"));
        assert_eq!(ctx.get("computed1").map(String::as_str), Some("yes"));
    }

    #[test]
    fn test_compute_renders_over_stored_answers() {
        let mut store = MemoryStore::new();
        let p = participant();
        let mut name = computed_field(1, "?", FieldStatus::Normal);
        name.key = "name".to_string();
        store.put_field(&name).unwrap();
        store
            .put_value(&ParticipantFieldValue::plain(p.id, FieldId(1), "Ada"))
            .unwrap();
        store
            .put_field(&computed_field(
                2,
                "badge-{{ name }}-{{ id }}",
                FieldStatus::ComputedAfterRegistration,
            ))
            .unwrap();

        compute_fields(
            &mut store,
            &p,
            FieldStatus::ComputedAfterRegistration,
            &SubstRenderer,
            Utc::now().date_naive(),
        )
        .unwrap();

        assert_eq!(
            store.value(p.id, FieldId(2)).unwrap().unwrap().value,
            "badge-Ada-4"
        );
    }

    #[test]
    fn test_compute_only_touches_requested_status() {
        let mut store = MemoryStore::new();
        let p = participant();
        store
            .put_field(&computed_field(
                1,
                "on-create",
                FieldStatus::ComputedOnCreate,
            ))
            .unwrap();
        store
            .put_field(&computed_field(
                2,
                "after",
                FieldStatus::ComputedAfterRegistration,
            ))
            .unwrap();

        compute_fields(
            &mut store,
            &p,
            FieldStatus::ComputedOnCreate,
            &SubstRenderer,
            Utc::now().date_naive(),
        )
        .unwrap();

        assert!(store.value(p.id, FieldId(1)).unwrap().is_some());
        assert!(store.value(p.id, FieldId(2)).unwrap().is_none());
    }
}
