//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Record
//! payloads (branches, fields, messages and the rest) reuse the core
//! types directly; only interaction events get a dedicated wire shape.

use enroll_core::validate::{Attachment, AttachmentMedia};
use enroll_core::{Event, FieldId, MessageId, RawAnswer};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Engine status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub participants: usize,
    pub active_participants: usize,
    pub branches: usize,
    pub fields: usize,
    pub messages: usize,
    pub menu_keys: usize,
    pub pending_notifications: usize,
    pub groups: usize,
}

// =============================================================================
// INTERACTION REQUEST/RESPONSE
// =============================================================================

/// One inbound chat interaction, as posted by a transport bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    /// Transport-side chat identifier.
    pub chat: i64,
    pub event: EventBody,
}

/// Wire shape of an interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Start {
        handle: Option<String>,
    },
    Text {
        text: String,
    },
    Photo {
        handle: String,
        size_kb: u64,
        #[serde(default)]
        bytes: Vec<u8>,
    },
    Document {
        handle: String,
        mime: Option<String>,
        size_kb: u64,
        #[serde(default)]
        bytes: Vec<u8>,
    },
    EditField {
        field: u64,
        target: u64,
        #[serde(default)]
        panel_only: bool,
    },
    ReplyButton {
        message: u64,
        index: u32,
    },
    RestoreDeferred,
}

impl EventBody {
    /// Convert the wire shape into an engine event.
    #[must_use]
    pub fn into_event(self) -> Event {
        match self {
            EventBody::Start { handle } => Event::Start { handle },
            EventBody::Text { text } => Event::Message(RawAnswer::Text(text)),
            EventBody::Photo {
                handle,
                size_kb,
                bytes,
            } => Event::Message(RawAnswer::Attachment(Attachment {
                media: AttachmentMedia::Photo,
                handle,
                size_kb,
                bytes,
            })),
            EventBody::Document {
                handle,
                mime,
                size_kb,
                bytes,
            } => Event::Message(RawAnswer::Attachment(Attachment {
                media: AttachmentMedia::Document { mime },
                handle,
                size_kb,
                bytes,
            })),
            EventBody::EditField {
                field,
                target,
                panel_only,
            } => Event::EditField {
                field: FieldId(field),
                target,
                panel_only,
            },
            EventBody::ReplyButton { message, index } => Event::ReplyButton {
                message: MessageId(message),
                index,
            },
            EventBody::RestoreDeferred => Event::RestoreDeferred,
        }
    }
}

/// Interaction outcome: how many outbound actions the engine produced and
/// the transport performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub success: bool,
    pub outbound: usize,
    pub error: Option<String>,
}

impl InteractionResponse {
    #[must_use]
    pub fn success(outbound: usize) -> Self {
        Self {
            success: true,
            outbound,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            outbound: 0,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// RECORD SAVE RESPONSE
// =============================================================================

/// Outcome of a record write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl SaveResponse {
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// TICK RESPONSE
// =============================================================================

/// Outcome of one scheduler round triggered over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResponse {
    pub success: bool,
    pub outbound: usize,
    pub error: Option<String>,
}

impl TickResponse {
    #[must_use]
    pub fn success(outbound: usize) -> Self {
        Self {
            success: true,
            outbound,
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            outbound: 0,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
