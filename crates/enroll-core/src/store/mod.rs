//! # Entity Store
//!
//! Persistence boundary of the engine. The [`Store`] trait exposes entity
//! CRUD plus the targeted queries the engine needs; [`MemoryStore`] is the
//! deterministic BTreeMap backend, [`RedbStore`](redb_store::RedbStore) the
//! ACID on-disk backend.
//!
//! Derived queries are provided methods so both backends stay small; a
//! backend overrides them only when it can do better than a scan.

mod redb_store;

pub use redb_store::RedbStore;

use crate::types::{
    Branch, BranchId, CacheSlot, ConditionalMessage, DeliveryStatus, EnrollError, Field, FieldId,
    FieldStatus, Group, GroupId, GroupStatus, MenuKey, MenuKeyId, MessageId, Notification,
    NotificationId, Participant, ParticipantFieldValue, ParticipantId, ParticipantStatus, Settings,
};
use std::collections::BTreeMap;

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Entity storage consumed by the engine.
pub trait Store {
    // --- settings ---
    fn settings(&self) -> Result<Settings, EnrollError>;
    fn put_settings(&mut self, settings: &Settings) -> Result<(), EnrollError>;

    // --- branches ---
    fn branch(&self, id: BranchId) -> Result<Option<Branch>, EnrollError>;
    fn branches(&self) -> Result<Vec<Branch>, EnrollError>;
    fn put_branch(&mut self, branch: &Branch) -> Result<(), EnrollError>;

    // --- fields ---
    fn field(&self, id: FieldId) -> Result<Option<Field>, EnrollError>;
    fn fields(&self) -> Result<Vec<Field>, EnrollError>;
    fn put_field(&mut self, field: &Field) -> Result<(), EnrollError>;

    // --- participants ---
    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, EnrollError>;
    fn participants(&self) -> Result<Vec<Participant>, EnrollError>;
    fn put_participant(&mut self, participant: &Participant) -> Result<(), EnrollError>;

    // --- stored answers ---
    fn value(
        &self,
        participant: ParticipantId,
        field: FieldId,
    ) -> Result<Option<ParticipantFieldValue>, EnrollError>;
    fn values(&self) -> Result<Vec<ParticipantFieldValue>, EnrollError>;
    /// Upsert: at most one row per `(participant, field)`.
    fn put_value(&mut self, value: &ParticipantFieldValue) -> Result<(), EnrollError>;

    // --- conditional messages ---
    fn message(&self, id: MessageId) -> Result<Option<ConditionalMessage>, EnrollError>;
    fn messages(&self) -> Result<Vec<ConditionalMessage>, EnrollError>;
    fn put_message(&mut self, message: &ConditionalMessage) -> Result<(), EnrollError>;

    // --- menu keys ---
    fn menu_key(&self, id: MenuKeyId) -> Result<Option<MenuKey>, EnrollError>;
    fn menu_keys(&self) -> Result<Vec<MenuKey>, EnrollError>;
    fn put_menu_key(&mut self, key: &MenuKey) -> Result<(), EnrollError>;

    // --- notifications ---
    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, EnrollError>;
    fn notifications(&self) -> Result<Vec<Notification>, EnrollError>;
    fn put_notification(&mut self, notification: &Notification) -> Result<(), EnrollError>;

    // --- groups ---
    fn groups(&self) -> Result<Vec<Group>, EnrollError>;
    fn put_group(&mut self, group: &Group) -> Result<(), EnrollError>;

    // =========================================================================
    // DERIVED QUERIES (provided)
    // =========================================================================

    fn branch_by_key(&self, key: &str) -> Result<Option<Branch>, EnrollError> {
        Ok(self.branches()?.into_iter().find(|b| b.key == key))
    }

    fn field_by_key(&self, key: &str) -> Result<Option<Field>, EnrollError> {
        Ok(self.fields()?.into_iter().find(|f| f.key == key))
    }

    /// Fields of a branch sorted by `(order, id)`.
    fn fields_in_branch(&self, branch: BranchId) -> Result<Vec<Field>, EnrollError> {
        let mut fields: Vec<Field> = self
            .fields()?
            .into_iter()
            .filter(|f| f.branch == branch)
            .collect();
        fields.sort_by_key(|f| (f.order, f.id));
        Ok(fields)
    }

    fn fields_with_status(&self, status: FieldStatus) -> Result<Vec<Field>, EnrollError> {
        Ok(self
            .fields()?
            .into_iter()
            .filter(|f| f.status == status)
            .collect())
    }

    fn participant_by_chat(&self, chat: i64) -> Result<Option<Participant>, EnrollError> {
        Ok(self.participants()?.into_iter().find(|p| p.chat == chat))
    }

    /// Smallest unused participant id.
    fn next_participant_id(&self) -> Result<ParticipantId, EnrollError> {
        let max = self
            .participants()?
            .iter()
            .map(|p| p.id.0)
            .max()
            .unwrap_or(0);
        Ok(ParticipantId(max + 1))
    }

    fn active_participant_count(&self) -> Result<u64, EnrollError> {
        Ok(self
            .participants()?
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
            .count() as u64)
    }

    fn values_for(
        &self,
        participant: ParticipantId,
    ) -> Result<Vec<ParticipantFieldValue>, EnrollError> {
        Ok(self
            .values()?
            .into_iter()
            .filter(|v| v.participant == participant)
            .collect())
    }

    /// Personal-notification values still waiting for delivery.
    fn pending_personal_values(&self) -> Result<Vec<ParticipantFieldValue>, EnrollError> {
        Ok(self
            .values()?
            .into_iter()
            .filter(|v| v.delivery == DeliveryStatus::ToDeliver)
            .collect())
    }

    /// Menu keys at one tree level, in id order.
    fn menu_children(&self, parent: Option<MenuKeyId>) -> Result<Vec<MenuKey>, EnrollError> {
        Ok(self
            .menu_keys()?
            .into_iter()
            .filter(|k| k.parent == parent)
            .collect())
    }

    fn groups_with_status(&self, status: GroupStatus) -> Result<Vec<Group>, EnrollError> {
        Ok(self
            .groups()?
            .into_iter()
            .filter(|g| g.status == status)
            .collect())
    }

    /// Write a transport file handle back into its cache slot.
    fn cache_file_handle(&mut self, slot: CacheSlot, handle: &str) -> Result<(), EnrollError> {
        match slot {
            CacheSlot::MessagePhoto(id) => {
                let Some(mut message) = self.message(id)? else {
                    return Err(EnrollError::MessageNotFound(id));
                };
                message.photo_handle = Some(handle.to_string());
                self.put_message(&message)
            }
            CacheSlot::Value { participant, field } => {
                let Some(mut value) = self.value(participant, field)? else {
                    return Err(EnrollError::FieldNotFound(field));
                };
                value.file_handle = Some(handle.to_string());
                self.put_value(&value)
            }
        }
    }
}

// =============================================================================
// IN-MEMORY BACKEND
// =============================================================================

/// Deterministic in-memory backend. BTreeMaps only, so every scan and every
/// derived query iterates in the same order on every run.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    settings: Settings,
    branches: BTreeMap<BranchId, Branch>,
    fields: BTreeMap<FieldId, Field>,
    participants: BTreeMap<ParticipantId, Participant>,
    values: BTreeMap<(ParticipantId, FieldId), ParticipantFieldValue>,
    messages: BTreeMap<MessageId, ConditionalMessage>,
    menu_keys: BTreeMap<MenuKeyId, MenuKey>,
    notifications: BTreeMap<NotificationId, Notification>,
    groups: BTreeMap<GroupId, Group>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn settings(&self) -> Result<Settings, EnrollError> {
        Ok(self.settings.clone())
    }

    fn put_settings(&mut self, settings: &Settings) -> Result<(), EnrollError> {
        self.settings = settings.clone();
        Ok(())
    }

    fn branch(&self, id: BranchId) -> Result<Option<Branch>, EnrollError> {
        Ok(self.branches.get(&id).cloned())
    }

    fn branches(&self) -> Result<Vec<Branch>, EnrollError> {
        Ok(self.branches.values().cloned().collect())
    }

    fn put_branch(&mut self, branch: &Branch) -> Result<(), EnrollError> {
        self.branches.insert(branch.id, branch.clone());
        Ok(())
    }

    fn field(&self, id: FieldId) -> Result<Option<Field>, EnrollError> {
        Ok(self.fields.get(&id).cloned())
    }

    fn fields(&self) -> Result<Vec<Field>, EnrollError> {
        Ok(self.fields.values().cloned().collect())
    }

    fn put_field(&mut self, field: &Field) -> Result<(), EnrollError> {
        self.fields.insert(field.id, field.clone());
        Ok(())
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, EnrollError> {
        Ok(self.participants.get(&id).cloned())
    }

    fn participants(&self) -> Result<Vec<Participant>, EnrollError> {
        Ok(self.participants.values().cloned().collect())
    }

    fn put_participant(&mut self, participant: &Participant) -> Result<(), EnrollError> {
        self.participants.insert(participant.id, participant.clone());
        Ok(())
    }

    fn value(
        &self,
        participant: ParticipantId,
        field: FieldId,
    ) -> Result<Option<ParticipantFieldValue>, EnrollError> {
        Ok(self.values.get(&(participant, field)).cloned())
    }

    fn values(&self) -> Result<Vec<ParticipantFieldValue>, EnrollError> {
        Ok(self.values.values().cloned().collect())
    }

    fn put_value(&mut self, value: &ParticipantFieldValue) -> Result<(), EnrollError> {
        self.values
            .insert((value.participant, value.field), value.clone());
        Ok(())
    }

    fn message(&self, id: MessageId) -> Result<Option<ConditionalMessage>, EnrollError> {
        Ok(self.messages.get(&id).cloned())
    }

    fn messages(&self) -> Result<Vec<ConditionalMessage>, EnrollError> {
        Ok(self.messages.values().cloned().collect())
    }

    fn put_message(&mut self, message: &ConditionalMessage) -> Result<(), EnrollError> {
        self.messages.insert(message.id, message.clone());
        Ok(())
    }

    fn menu_key(&self, id: MenuKeyId) -> Result<Option<MenuKey>, EnrollError> {
        Ok(self.menu_keys.get(&id).cloned())
    }

    fn menu_keys(&self) -> Result<Vec<MenuKey>, EnrollError> {
        Ok(self.menu_keys.values().cloned().collect())
    }

    fn put_menu_key(&mut self, key: &MenuKey) -> Result<(), EnrollError> {
        self.menu_keys.insert(key.id, key.clone());
        Ok(())
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, EnrollError> {
        Ok(self.notifications.get(&id).cloned())
    }

    fn notifications(&self) -> Result<Vec<Notification>, EnrollError> {
        Ok(self.notifications.values().cloned().collect())
    }

    fn put_notification(&mut self, notification: &Notification) -> Result<(), EnrollError> {
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    fn groups(&self) -> Result<Vec<Group>, EnrollError> {
        Ok(self.groups.values().cloned().collect())
    }

    fn put_group(&mut self, group: &Group) -> Result<(), EnrollError> {
        self.groups.insert(group.id, group.clone());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
