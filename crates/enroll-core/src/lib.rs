//! # enroll-core
//!
//! The deterministic Registration Engine for Enroll - THE LOGIC.
//!
//! This crate implements the chat-driven registration and notification
//! engine: branch traversal, answer validation, menu navigation,
//! conditional messages and the notification passes.
//!
//! ## Architectural Constraints
//!
//! The engine:
//! - Is pure and synchronous; every entry point is a function over a
//!   [`store::Store`] that returns the outbound batch to perform
//! - Never performs I/O besides the store; the clock, template renderer
//!   and blob storage are trait seams the app crate implements
//! - Is deterministic: identical store contents and inputs produce an
//!   identical outbound batch

// =============================================================================
// MODULES
// =============================================================================

pub mod compute;
pub mod flow;
pub mod menu;
pub mod messages;
pub mod primitives;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod traverse;
pub mod types;
pub mod validate;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Branch, BranchId, ConditionalMessage, Conversation, DeliveryStatus, EnrollError,
    Field, FieldId, FieldStatus, FieldType, FlowContext, Group, GroupId, GroupStatus, Keyboard,
    MenuKey, MenuKeyId, MenuKeyStatus, MessageId, Notification, NotificationId, NotificationStatus,
    OutMessage, Outbound, Participant, ParticipantFieldValue, ParticipantId, ParticipantStatus,
    Recipient, ReplyCapability, Settings, SubFlow, ValidationRule,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use flow::{Event, Services, handle};
pub use scheduler::{perform_pass, personal_pass, plan_pass};
pub use services::{Blobs, Clock, FixedClock, NullBlobs, RenderContext, Renderer};
pub use store::{MemoryStore, RedbStore, Store};
pub use traverse::{Step, branch_chain_cycle, first_field, next_step};
pub use validate::{Attachment, AttachmentMedia, Prepared, RawAnswer};
