//! # Core Types Module
//!
//! Identifier newtypes, domain enums, entity records and the error type.
//!
//! Everything persisted derives `Serialize`/`Deserialize` and is encoded
//! with postcard in the redb backend. Identifier newtypes keep the entity
//! spaces apart at compile time while staying plain `u64` on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a question branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BranchId(pub u64);

/// Identifier of a field (a single question / datum).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FieldId(pub u64);

/// Identifier of a participant (one chat counterpart).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ParticipantId(pub u64);

/// Identifier of a conditional message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MessageId(pub u64);

/// Identifier of a menu tree node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MenuKeyId(pub u64);

/// Identifier of a broadcast notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NotificationId(pub u64);

/// Identifier of a group chat (broadcast target or admin channel).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GroupId(pub u64);

// =============================================================================
// BRANCHES
// =============================================================================

/// An ordered group of fields, optionally chained into the next branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    /// Stable admin-facing key, unique across branches.
    pub key: String,
    pub description: String,
    /// Participants may park this branch and come back later.
    pub is_deferrable: bool,
    /// Stored answers of this branch may be edited from the chat.
    pub is_bot_editable: bool,
    /// Stored answers of this branch may be edited from the admin tool.
    pub is_ui_editable: bool,
    /// Branch the flow continues into once this branch is exhausted.
    pub next_branch: Option<BranchId>,
}

// =============================================================================
// FIELDS
// =============================================================================

/// What kind of answer a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    FreeText,
    Boolean,
    Image,
    Pdf,
    Zip,
}

impl FieldType {
    /// Whether answers arrive as uploaded files.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, FieldType::Image | FieldType::Pdf | FieldType::Zip)
    }
}

/// Field lifecycle / computation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldStatus {
    /// Asked during traversal.
    Normal,
    /// Never asked, never computed.
    Inactive,
    /// Value computed from the participant record when it is created.
    ComputedOnCreate,
    /// Value computed from all stored answers when registration completes.
    ComputedAfterRegistration,
    /// Carrier for per-participant notification deliveries.
    PersonalNotification,
}

impl FieldStatus {
    /// Whether the engine fills this field in instead of asking for it.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(
            self,
            FieldStatus::ComputedOnCreate | FieldStatus::ComputedAfterRegistration
        )
    }
}

/// A single validation / preparation step, applied in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationRule {
    /// The value must match `pattern` at the start of the string.
    MatchPattern { pattern: String, error_text: String },
    /// The value parses as `%d.%m.%Y` and must not lie in the future.
    RejectFutureDate { error_text: String },
    /// The value parses as a four-digit year and must not lie in the future.
    RejectFutureYear { error_text: String },
    /// Every match of `pattern` is removed from the value.
    Strip { pattern: String },
    /// The value is uppercased.
    Uppercase,
}

/// A single question / datum inside a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    /// Stable admin-facing key, unique across fields.
    pub key: String,
    pub branch: BranchId,
    /// Position within the branch; traversal walks ascending order.
    pub order: u64,
    /// Question template. For computed fields this is the value template.
    pub prompt: String,
    pub field_type: FieldType,
    pub status: FieldStatus,
    pub is_skippable: bool,
    /// Blob container for uploads. Required for file-typed fields.
    pub bucket: Option<String>,
    /// Quick-answer labels shown as a reply keyboard under the question.
    pub answer_options: Vec<String>,
    pub validation: Vec<ValidationRule>,
}

impl Field {
    /// Structural invariants checked on every configuration save.
    pub fn check(&self) -> Result<(), EnrollError> {
        if self.prompt.is_empty() {
            return Err(EnrollError::Config(format!(
                "field '{}' has an empty prompt",
                self.key
            )));
        }
        if self.field_type.is_file() && self.bucket.is_none() {
            return Err(EnrollError::Config(format!(
                "file field '{}' has no bucket",
                self.key
            )));
        }
        if self.status.is_computed() && !self.validation.is_empty() {
            return Err(EnrollError::Config(format!(
                "computed field '{}' carries validation rules",
                self.key
            )));
        }
        Ok(())
    }
}

// =============================================================================
// PARTICIPANTS
// =============================================================================

/// Participant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    /// Registration completed at least once.
    Active,
    /// Still answering the registration flow.
    Inactive,
}

/// A sub-flow opened by a conditional-message reply button.
///
/// `index` selects which confirmation text is sent when the sub-flow ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFlow {
    pub message: MessageId,
    pub index: u32,
}

/// Where a conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Conversation {
    /// Browsing menus; free text selects menu keys.
    #[default]
    Idle,
    /// A question is awaiting its answer.
    Answering {
        field: FieldId,
        sub_flow: Option<SubFlow>,
    },
    /// A stored answer is being replaced; `target` is the message being
    /// refreshed in place. `panel_only` refreshes just its keyboard.
    Editing {
        field: FieldId,
        target: u64,
        panel_only: bool,
    },
}

/// Parked question snapshot written by *defer*, consumed by *restore*.
///
/// Lives beside [`Conversation`] rather than inside it: a participant keeps
/// browsing menus and answering sub-flows while a branch is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub field: FieldId,
    pub sub_flow: Option<SubFlow>,
}

/// One chat counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Transport-side chat reference.
    pub chat: i64,
    pub handle: Option<String>,
    pub status: ParticipantStatus,
    /// The transport reported this participant blocked the bot.
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub conversation: Conversation,
    pub deferred: Option<FlowContext>,
    /// Current node in the menu tree; `None` means the root level.
    pub menu_position: Option<MenuKeyId>,
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// Delivery state of a personal notification value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Inactive,
    ToDeliver,
    Delivered,
}

/// A stored answer. At most one per `(participant, field)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFieldValue {
    pub participant: ParticipantId,
    pub field: FieldId,
    pub value: String,
    /// Transport-side cached handle for re-sending an uploaded file.
    pub file_handle: Option<String>,
    /// Transport message that carried the answer, when one did.
    pub message: Option<u64>,
    /// Only meaningful on personal-notification fields.
    pub delivery: DeliveryStatus,
}

impl ParticipantFieldValue {
    /// Plain stored value with no delivery bookkeeping.
    #[must_use]
    pub fn plain(participant: ParticipantId, field: FieldId, value: impl Into<String>) -> Self {
        Self {
            participant,
            field,
            value: value.into(),
            file_handle: None,
            message: None,
            delivery: DeliveryStatus::Inactive,
        }
    }
}

// =============================================================================
// CONDITIONAL MESSAGES
// =============================================================================

/// Reply buttons a conditional message can carry.
///
/// `labels` and `confirmations` are parallel lists; the pressed button's
/// index selects both the action target and the confirmation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyCapability {
    /// Button starts a question branch as a sub-flow.
    StartBranch {
        branch: BranchId,
        labels: Vec<String>,
        confirmations: Vec<String>,
    },
    /// Button asks exactly one field; traversal stops after the answer.
    AnswerOneField {
        field: FieldId,
        labels: Vec<String>,
        confirmations: Vec<String>,
    },
    /// Button stores its label text as the field value directly.
    PickFromList {
        field: FieldId,
        labels: Vec<String>,
        confirmations: Vec<String>,
    },
}

impl ReplyCapability {
    #[must_use]
    pub fn labels(&self) -> &[String] {
        match self {
            ReplyCapability::StartBranch { labels, .. }
            | ReplyCapability::AnswerOneField { labels, .. }
            | ReplyCapability::PickFromList { labels, .. } => labels,
        }
    }

    #[must_use]
    pub fn confirmations(&self) -> &[String] {
        match self {
            ReplyCapability::StartBranch { confirmations, .. }
            | ReplyCapability::AnswerOneField { confirmations, .. }
            | ReplyCapability::PickFromList { confirmations, .. } => confirmations,
        }
    }
}

/// A menu/broadcast message whose visibility can be gated per participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalMessage {
    pub id: MessageId,
    /// Stable admin-facing key.
    pub key: String,
    /// Body template.
    pub body: String,
    /// Photo: an http(s) link or a blob object name.
    pub photo: Option<String>,
    /// Transport-side cached handle for the photo.
    pub photo_handle: Option<String>,
    /// When set, visible only to participants whose stored value for this
    /// boolean field is `"true"`.
    pub visibility_field: Option<FieldId>,
    pub reply: Option<ReplyCapability>,
}

impl ConditionalMessage {
    /// Structural invariants checked on every configuration save.
    pub fn check(&self) -> Result<(), EnrollError> {
        if self.body.is_empty() {
            return Err(EnrollError::Config(format!(
                "message '{}' has an empty body",
                self.key
            )));
        }
        if let Some(reply) = &self.reply {
            if reply.labels().is_empty() || reply.labels().len() != reply.confirmations().len() {
                return Err(EnrollError::Config(format!(
                    "message '{}' has mismatched reply labels and confirmations",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// MENU KEYS
// =============================================================================

/// What pressing a menu key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuKeyStatus {
    /// Shows a conditional message (honouring its visibility gate).
    Plain { message: MessageId },
    /// Navigates one menu level up.
    GoUp,
    /// Resumes the deferred branch; shown only while a snapshot exists.
    RestoreDeferred,
    /// Renders the registration summary of a branch.
    ShowProfile { branch: BranchId },
    /// Summary plus per-field edit buttons for bot-editable branches.
    EditProfile { branch: BranchId },
    /// Fixed informational panels driven by settings texts.
    ShowNews,
    ShowCodes,
    ShowPassStatus,
    /// Never shown.
    Inactive,
}

/// Node of the n-ary menu tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuKey {
    pub id: MenuKeyId,
    /// Button label; selection matches on this text.
    pub label: String,
    pub parent: Option<MenuKeyId>,
    pub status: MenuKeyStatus,
}

impl MenuKey {
    /// Structural invariants checked on every configuration save.
    pub fn check(&self) -> Result<(), EnrollError> {
        if self.label.is_empty() {
            return Err(EnrollError::Config(format!(
                "menu key {} has an empty label",
                self.id.0
            )));
        }
        if self.status == MenuKeyStatus::GoUp && self.parent.is_none() {
            return Err(EnrollError::Config(format!(
                "go-up key '{}' sits at the root level",
                self.label
            )));
        }
        Ok(())
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Broadcast notification status. Monotonic: never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationStatus {
    Inactive,
    ToDeliver,
    Planned,
    Delivered,
}

/// A scheduled broadcast of a conditional message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// The conditional message delivered by this broadcast. Its visibility
    /// gate is re-evaluated per recipient at send time.
    pub message: MessageId,
    pub fire_at: DateTime<Utc>,
    pub status: NotificationStatus,
}

// =============================================================================
// GROUPS
// =============================================================================

/// Group chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// Receives every performed notification.
    Broadcast,
    /// Receives operational notices (planned/sent broadcasts, milestones).
    Admin,
    Inactive,
}

/// A passive broadcast target or admin channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Transport-side chat reference.
    pub chat: i64,
    pub description: String,
    pub status: GroupStatus,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Single configuration record: user-facing texts and tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Key of the branch registration starts from.
    pub root_branch: String,
    /// Key of the field whose value names uploaded files.
    pub display_name_field: String,
    /// Admin notice every N completed registrations. 0 disables.
    pub milestone_interval: u64,

    // Button labels
    pub yes_label: String,
    pub no_label: String,
    pub skip_label: String,
    pub defer_label: String,
    pub cancel_label: String,

    // Flow texts
    pub start_text: String,
    pub help_text: String,
    pub registration_complete_text: String,
    pub deferred_text: String,
    pub menu_text: String,
    pub unknown_key_text: String,
    pub upload_without_context_text: String,
    pub edit_canceled_text: String,
    /// Template; rendered with `state` = the edited field key.
    pub edit_confirmed_template: String,

    // Validation texts
    pub wrong_attachment_text: String,
    pub file_too_large_text: String,
    pub boolean_expected_text: String,

    // Informational panels
    pub news_text: String,
    pub codes_text: String,
    pub pass_text: String,

    // Admin notices; rendered with `body` and `fire_at` / `count`.
    pub notification_planned_template: String,
    pub notification_sent_template: String,
    pub milestone_template: String,

    // Upload limits and photo storage
    pub max_image_kb: u64,
    pub max_document_kb: u64,
    /// Bucket conditional-message and notification photos live in.
    pub photo_bucket: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_branch: "main".to_string(),
            display_name_field: "name".to_string(),
            milestone_interval: 50,
            yes_label: "Yes".to_string(),
            no_label: "No".to_string(),
            skip_label: "Skip".to_string(),
            defer_label: "Answer later".to_string(),
            cancel_label: "Cancel".to_string(),
            start_text: "Welcome! Let's get you registered.".to_string(),
            help_text: "Use the keyboard below to navigate.".to_string(),
            registration_complete_text: "All done - you are registered.".to_string(),
            deferred_text: "Saved for later. You can resume from the menu.".to_string(),
            menu_text: "Choose an option:".to_string(),
            unknown_key_text: "Please use the keyboard below.".to_string(),
            upload_without_context_text: "There is no question awaiting a file right now."
                .to_string(),
            edit_canceled_text: "Change canceled.".to_string(),
            edit_confirmed_template: "Updated {{ state }}.".to_string(),
            wrong_attachment_text: "That is not the kind of answer this question expects."
                .to_string(),
            file_too_large_text: "This file is too large.".to_string(),
            boolean_expected_text: "Please answer with the buttons.".to_string(),
            news_text: "No news yet.".to_string(),
            codes_text: "No codes available.".to_string(),
            pass_text: "No pass on record.".to_string(),
            notification_planned_template: "Planned: {{ body }} at {{ fire_at }}".to_string(),
            notification_sent_template: "Sent: {{ body }}".to_string(),
            milestone_template: "{{ count }} participants registered.".to_string(),
            max_image_kb: 20_000,
            max_document_kb: 20_000,
            photo_bucket: "messages".to_string(),
        }
    }
}

// =============================================================================
// OUTBOUND ACTIONS
// =============================================================================

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Participant(ParticipantId),
    Group(GroupId),
}

/// A button that triggers an engine event when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

/// Callback payload carried by an inline button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    Reply { message: MessageId, index: u32 },
    EditField { field: FieldId },
}

/// Keyboard attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Keyboard {
    #[default]
    None,
    /// Plain reply keyboard: rows of labels.
    Reply(Vec<Vec<String>>),
    /// Inline keyboard: rows of callback buttons.
    Inline(Vec<Vec<InlineButton>>),
}

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSource {
    /// Direct http(s) link, resolved by the transport.
    Link(String),
    /// Transport-side cached handle.
    Handle(String),
    /// Blob store object, uploaded by the transport adapter.
    Blob { bucket: String, name: String },
}

/// Slot a fresh transport file handle is cached into after a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSlot {
    MessagePhoto(MessageId),
    Value {
        participant: ParticipantId,
        field: FieldId,
    },
}

/// One message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutMessage {
    pub body: String,
    pub keyboard: Keyboard,
    pub attachment: Option<FileSource>,
    /// Where to cache the handle the transport returns for a fresh upload.
    pub cache_to: Option<CacheSlot>,
}

impl OutMessage {
    /// Plain text message with no keyboard.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            keyboard: Keyboard::None,
            attachment: None,
            cache_to: None,
        }
    }

    /// Text message with a keyboard.
    #[must_use]
    pub fn with_keyboard(body: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            body: body.into(),
            keyboard,
            attachment: None,
            cache_to: None,
        }
    }
}

/// An effect the engine wants performed, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outbound {
    Send {
        to: Recipient,
        message: OutMessage,
    },
    /// Replace text and keyboard of an existing message.
    EditText {
        to: ParticipantId,
        target: u64,
        body: String,
        keyboard: Keyboard,
    },
    /// Replace only the keyboard of an existing message.
    EditKeyboard {
        to: ParticipantId,
        target: u64,
        keyboard: Keyboard,
    },
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Engine error type.
///
/// Participant mistakes never surface here: the validator turns them into
/// re-prompt outcomes. Errors mean broken configuration, missing records or
/// storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrollError {
    #[error("branch not found: {0:?}")]
    BranchNotFound(BranchId),

    #[error("field not found: {0:?}")]
    FieldNotFound(FieldId),

    #[error("participant not found: {0:?}")]
    ParticipantNotFound(ParticipantId),

    #[error("conditional message not found: {0:?}")]
    MessageNotFound(MessageId),

    #[error("menu key not found: {0:?}")]
    MenuKeyNotFound(MenuKeyId),

    #[error("notification not found: {0:?}")]
    NotificationNotFound(NotificationId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// TESTS
// =============================================================================
