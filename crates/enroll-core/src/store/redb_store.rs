//! # Redb Backend
//!
//! ACID on-disk backend. One table per entity, `u64` keys (the stored
//! answers table keys on `(participant, field)`), postcard-encoded values.
//! Every operation is its own transaction; a put that returns `Ok` has been
//! committed.

use super::Store;
use crate::types::{
    Branch, BranchId, ConditionalMessage, EnrollError, Field, FieldId, Group, MenuKey, MenuKeyId,
    MessageId, Notification, NotificationId, Participant, ParticipantFieldValue, ParticipantId,
    Settings,
};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

// =============================================================================
// TABLE DEFINITIONS
// =============================================================================

const SETTINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("settings");
const BRANCHES: TableDefinition<u64, &[u8]> = TableDefinition::new("branches");
const FIELDS: TableDefinition<u64, &[u8]> = TableDefinition::new("fields");
const PARTICIPANTS: TableDefinition<u64, &[u8]> = TableDefinition::new("participants");
const VALUES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("values");
const MESSAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("messages");
const MENU_KEYS: TableDefinition<u64, &[u8]> = TableDefinition::new("menu_keys");
const NOTIFICATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("notifications");
const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Key of the single settings record.
const SETTINGS_KEY: u64 = 0;

// =============================================================================
// REDB STORE
// =============================================================================

/// Persistent entity store backed by a single redb database file.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish()
    }
}

fn io_err(e: impl std::fmt::Display) -> EnrollError {
    EnrollError::IoError(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> EnrollError {
    EnrollError::SerializationError(e.to_string())
}

impl RedbStore {
    /// Open (or create) the database and make sure every table exists, so
    /// later read transactions never hit a missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EnrollError> {
        let db = Database::create(path).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            txn.open_table(SETTINGS).map_err(io_err)?;
            txn.open_table(BRANCHES).map_err(io_err)?;
            txn.open_table(FIELDS).map_err(io_err)?;
            txn.open_table(PARTICIPANTS).map_err(io_err)?;
            txn.open_table(VALUES).map_err(io_err)?;
            txn.open_table(MESSAGES).map_err(io_err)?;
            txn.open_table(MENU_KEYS).map_err(io_err)?;
            txn.open_table(NOTIFICATIONS).map_err(io_err)?;
            txn.open_table(GROUPS).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db })
    }

    // --- generic helpers over u64-keyed tables ---

    fn get_record<T: DeserializeOwned>(
        &self,
        def: TableDefinition<u64, &[u8]>,
        id: u64,
    ) -> Result<Option<T>, EnrollError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(def).map_err(io_err)?;
        match table.get(id).map_err(io_err)? {
            Some(guard) => Ok(Some(postcard::from_bytes(guard.value()).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    fn all_records<T: DeserializeOwned>(
        &self,
        def: TableDefinition<u64, &[u8]>,
    ) -> Result<Vec<T>, EnrollError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(def).map_err(io_err)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, guard) = entry.map_err(io_err)?;
            records.push(postcard::from_bytes(guard.value()).map_err(ser_err)?);
        }
        Ok(records)
    }

    fn put_record<T: Serialize>(
        &mut self,
        def: TableDefinition<u64, &[u8]>,
        id: u64,
        record: &T,
    ) -> Result<(), EnrollError> {
        let bytes = postcard::to_allocvec(record).map_err(ser_err)?;
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(def).map_err(io_err)?;
            table.insert(id, bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)
    }
}

impl Store for RedbStore {
    fn settings(&self) -> Result<Settings, EnrollError> {
        Ok(self
            .get_record(SETTINGS, SETTINGS_KEY)?
            .unwrap_or_default())
    }

    fn put_settings(&mut self, settings: &Settings) -> Result<(), EnrollError> {
        self.put_record(SETTINGS, SETTINGS_KEY, settings)
    }

    fn branch(&self, id: BranchId) -> Result<Option<Branch>, EnrollError> {
        self.get_record(BRANCHES, id.0)
    }

    fn branches(&self) -> Result<Vec<Branch>, EnrollError> {
        self.all_records(BRANCHES)
    }

    fn put_branch(&mut self, branch: &Branch) -> Result<(), EnrollError> {
        self.put_record(BRANCHES, branch.id.0, branch)
    }

    fn field(&self, id: FieldId) -> Result<Option<Field>, EnrollError> {
        self.get_record(FIELDS, id.0)
    }

    fn fields(&self) -> Result<Vec<Field>, EnrollError> {
        self.all_records(FIELDS)
    }

    fn put_field(&mut self, field: &Field) -> Result<(), EnrollError> {
        self.put_record(FIELDS, field.id.0, field)
    }

    fn participant(&self, id: ParticipantId) -> Result<Option<Participant>, EnrollError> {
        self.get_record(PARTICIPANTS, id.0)
    }

    fn participants(&self) -> Result<Vec<Participant>, EnrollError> {
        self.all_records(PARTICIPANTS)
    }

    fn put_participant(&mut self, participant: &Participant) -> Result<(), EnrollError> {
        self.put_record(PARTICIPANTS, participant.id.0, participant)
    }

    fn value(
        &self,
        participant: ParticipantId,
        field: FieldId,
    ) -> Result<Option<ParticipantFieldValue>, EnrollError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(VALUES).map_err(io_err)?;
        match table.get((participant.0, field.0)).map_err(io_err)? {
            Some(guard) => Ok(Some(postcard::from_bytes(guard.value()).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    fn values(&self) -> Result<Vec<ParticipantFieldValue>, EnrollError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(VALUES).map_err(io_err)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, guard) = entry.map_err(io_err)?;
            records.push(postcard::from_bytes(guard.value()).map_err(ser_err)?);
        }
        Ok(records)
    }

    fn put_value(&mut self, value: &ParticipantFieldValue) -> Result<(), EnrollError> {
        let bytes = postcard::to_allocvec(value).map_err(ser_err)?;
        let txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = txn.open_table(VALUES).map_err(io_err)?;
            table
                .insert((value.participant.0, value.field.0), bytes.as_slice())
                .map_err(io_err)?;
        }
        txn.commit().map_err(io_err)
    }

    fn message(&self, id: MessageId) -> Result<Option<ConditionalMessage>, EnrollError> {
        self.get_record(MESSAGES, id.0)
    }

    fn messages(&self) -> Result<Vec<ConditionalMessage>, EnrollError> {
        self.all_records(MESSAGES)
    }

    fn put_message(&mut self, message: &ConditionalMessage) -> Result<(), EnrollError> {
        self.put_record(MESSAGES, message.id.0, message)
    }

    fn menu_key(&self, id: MenuKeyId) -> Result<Option<MenuKey>, EnrollError> {
        self.get_record(MENU_KEYS, id.0)
    }

    fn menu_keys(&self) -> Result<Vec<MenuKey>, EnrollError> {
        self.all_records(MENU_KEYS)
    }

    fn put_menu_key(&mut self, key: &MenuKey) -> Result<(), EnrollError> {
        self.put_record(MENU_KEYS, key.id.0, key)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, EnrollError> {
        self.get_record(NOTIFICATIONS, id.0)
    }

    fn notifications(&self) -> Result<Vec<Notification>, EnrollError> {
        self.all_records(NOTIFICATIONS)
    }

    fn put_notification(&mut self, notification: &Notification) -> Result<(), EnrollError> {
        self.put_record(NOTIFICATIONS, notification.id.0, notification)
    }

    fn groups(&self) -> Result<Vec<Group>, EnrollError> {
        self.all_records(GROUPS)
    }

    fn put_group(&mut self, group: &Group) -> Result<(), EnrollError> {
        self.put_record(GROUPS, group.id.0, group)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{Conversation, FieldStatus, FieldType, ParticipantStatus};
    use chrono::Utc;

    fn open_temp() -> (RedbStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("enroll.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_settings_default_until_written() {
        let (mut store, _dir) = open_temp();
        assert_eq!(store.settings().unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.milestone_interval = 7;
        store.put_settings(&settings).unwrap();
        assert_eq!(store.settings().unwrap().milestone_interval, 7);
    }

    #[test]
    fn test_branch_round_trip() {
        let (mut store, _dir) = open_temp();
        let branch = Branch {
            id: BranchId(3),
            key: "main".to_string(),
            description: "registration".to_string(),
            is_deferrable: true,
            is_bot_editable: true,
            is_ui_editable: false,
            next_branch: Some(BranchId(4)),
        };
        store.put_branch(&branch).unwrap();

        assert_eq!(store.branch(BranchId(3)).unwrap().unwrap(), branch);
        assert!(store.branch(BranchId(9)).unwrap().is_none());
        assert_eq!(store.branch_by_key("main").unwrap().unwrap().id, branch.id);
    }

    #[test]
    fn test_participant_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enroll.db");

        let participant = Participant {
            id: ParticipantId(1),
            chat: 555,
            handle: Some("p".to_string()),
            status: ParticipantStatus::Active,
            is_blocked: false,
            created_at: Utc::now(),
            conversation: Conversation::Idle,
            deferred: None,
            menu_position: None,
        };

        {
            let mut store = RedbStore::open(&path).unwrap();
            store.put_participant(&participant).unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(
            store.participant(ParticipantId(1)).unwrap().unwrap(),
            participant
        );
    }

    #[test]
    fn test_value_upsert_by_composite_key() {
        let (mut store, _dir) = open_temp();
        let mut value = ParticipantFieldValue::plain(ParticipantId(2), FieldId(5), "a");
        store.put_value(&value).unwrap();
        value.value = "b".to_string();
        store.put_value(&value).unwrap();

        assert_eq!(store.values().unwrap().len(), 1);
        assert_eq!(
            store.value(ParticipantId(2), FieldId(5)).unwrap().unwrap().value,
            "b"
        );
    }

    #[test]
    fn test_fields_in_branch_ordering_on_disk() {
        let (mut store, _dir) = open_temp();
        for (id, order) in [(1u64, 20u64), (2, 10), (3, 30)] {
            store
                .put_field(&Field {
                    id: FieldId(id),
                    key: format!("f{id}"),
                    branch: BranchId(1),
                    order,
                    prompt: "?".to_string(),
                    field_type: FieldType::FreeText,
                    status: FieldStatus::Normal,
                    is_skippable: false,
                    bucket: None,
                    answer_options: vec![],
                    validation: vec![],
                })
                .unwrap();
        }

        let orders: Vec<u64> = store
            .fields_in_branch(BranchId(1))
            .unwrap()
            .iter()
            .map(|f| f.order)
            .collect();
        assert_eq!(orders, vec![10, 20, 30]);
    }
}
