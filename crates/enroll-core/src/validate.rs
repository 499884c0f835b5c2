//! # Field Value Validator / Preparer
//!
//! Turns a raw participant answer into either a storable value, an upload
//! plan, or a re-prompt text. Participant mistakes are outcomes, never
//! errors; `Err` here always means broken configuration.

use crate::primitives::{
    DATE_INPUT_FORMAT, FALSE_VALUE, IMAGE_MIMES, PDF_MIME, THUMBNAIL_MARKER, TRUE_VALUE,
    ZIP_MIMES, extension_for_mime,
};
use crate::types::{
    EnrollError, Field, FieldStatus, FieldType, ParticipantId, Settings, ValidationRule,
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;

// =============================================================================
// ANSWER SHAPES
// =============================================================================

/// What kind of upload the transport handed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentMedia {
    /// Native photo; transports normalize these to JPEG.
    Photo,
    /// Generic document with a declared mime type.
    Document { mime: Option<String> },
}

/// A file upload, already fetched from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media: AttachmentMedia,
    /// Transport-side file handle of the original upload.
    pub handle: String,
    pub size_kb: u64,
    pub bytes: Vec<u8>,
}

/// A raw inbound answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAnswer {
    Text(String),
    Attachment(Attachment),
}

// =============================================================================
// PREPARATION OUTCOME
// =============================================================================

/// Blob write that must accompany a stored upload value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSpec {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
}

/// Outcome of preparing one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Storable text value.
    Value(String),
    /// Storable value naming a blob that has to be written.
    Upload {
        value: String,
        blob: BlobSpec,
        /// Transport handle to cache, when re-sending the original is safe.
        file_handle: Option<String>,
    },
    /// The answer was rejected; send this text and keep waiting.
    Reprompt(String),
}

// =============================================================================
// TEXT PIPELINE
// =============================================================================

/// Run a text answer through the field's validation rules, in declaration
/// order. The first failing rule's text becomes the re-prompt.
pub fn prepare_text(
    field: &Field,
    settings: &Settings,
    text: &str,
    today: NaiveDate,
) -> Result<Prepared, EnrollError> {
    ensure_normal(field)?;

    if field.field_type.is_file() {
        return Ok(Prepared::Reprompt(settings.wrong_attachment_text.clone()));
    }

    if field.field_type == FieldType::Boolean {
        let stored = if text == settings.yes_label {
            TRUE_VALUE
        } else if text == settings.no_label {
            FALSE_VALUE
        } else {
            return Ok(Prepared::Reprompt(settings.boolean_expected_text.clone()));
        };
        return Ok(Prepared::Value(stored.to_string()));
    }

    let mut value = text.to_string();
    for rule in &field.validation {
        match rule {
            ValidationRule::MatchPattern {
                pattern,
                error_text,
            } => {
                let re = compile(field, pattern)?;
                // Anchored at the start only, matching the original
                // admin-facing contract for these patterns.
                let matches_prefix = re.find(&value).is_some_and(|m| m.start() == 0);
                if !matches_prefix {
                    return Ok(Prepared::Reprompt(error_text.clone()));
                }
            }
            ValidationRule::RejectFutureDate { error_text } => {
                match NaiveDate::parse_from_str(&value, DATE_INPUT_FORMAT) {
                    Ok(date) if date <= today => {}
                    _ => return Ok(Prepared::Reprompt(error_text.clone())),
                }
            }
            ValidationRule::RejectFutureYear { error_text } => {
                match value.parse::<i32>() {
                    Ok(year) if year <= today.year() => {}
                    _ => return Ok(Prepared::Reprompt(error_text.clone())),
                }
            }
            ValidationRule::Strip { pattern } => {
                let re = compile(field, pattern)?;
                value = re.replace_all(&value, "").into_owned();
            }
            ValidationRule::Uppercase => {
                value = value.to_uppercase();
            }
        }
    }

    Ok(Prepared::Value(value))
}

/// Only normal fields take answers; being asked to prepare one for a field
/// in any other status means the traversal upstream is broken.
fn ensure_normal(field: &Field) -> Result<(), EnrollError> {
    if field.status != FieldStatus::Normal {
        return Err(EnrollError::Config(format!(
            "field '{}' is not normal and cannot take an answer",
            field.key
        )));
    }
    Ok(())
}

fn compile(field: &Field, pattern: &str) -> Result<Regex, EnrollError> {
    Regex::new(pattern).map_err(|e| {
        EnrollError::Config(format!(
            "field '{}' has an invalid pattern '{pattern}': {e}",
            field.key
        ))
    })
}

// =============================================================================
// ATTACHMENT PIPELINE
// =============================================================================

/// Validate an upload against the field's type and limits, and plan the
/// blob write. `display_name` is the stored value of the display-name field;
/// its absence is a configuration-ordering error, not a participant mistake.
pub fn prepare_attachment(
    field: &Field,
    settings: &Settings,
    participant: ParticipantId,
    display_name: Option<&str>,
    attachment: &Attachment,
) -> Result<Prepared, EnrollError> {
    ensure_normal(field)?;

    if !field.field_type.is_file() {
        return Ok(Prepared::Reprompt(settings.wrong_attachment_text.clone()));
    }

    let Some(mime) = accepted_mime(field.field_type, &attachment.media) else {
        return Ok(Prepared::Reprompt(settings.wrong_attachment_text.clone()));
    };

    let limit_kb = match field.field_type {
        FieldType::Image => settings.max_image_kb,
        _ => settings.max_document_kb,
    };
    if attachment.size_kb > limit_kb {
        return Ok(Prepared::Reprompt(settings.file_too_large_text.clone()));
    }

    let bucket = field.bucket.clone().ok_or_else(|| {
        EnrollError::Config(format!("file field '{}' has no bucket", field.key))
    })?;
    let display_name = display_name.ok_or_else(|| {
        EnrollError::Config(format!(
            "no display-name value stored before file field '{}'; fix the field order",
            field.key
        ))
    })?;

    let marker = if mime.starts_with("image") {
        THUMBNAIL_MARKER
    } else {
        ""
    };
    let name = format!(
        "{display_name}.{}{marker}.{}",
        participant.0,
        extension_for_mime(&mime)
    );

    // An image sent as a document is re-sent by the transport as a photo,
    // so the document handle would go stale; the send path caches the
    // photo handle instead.
    let file_handle = match &attachment.media {
        AttachmentMedia::Document { .. } if mime.starts_with("image") => None,
        _ => Some(attachment.handle.clone()),
    };

    Ok(Prepared::Upload {
        value: name.clone(),
        blob: BlobSpec {
            bucket,
            name,
            content_type: mime,
        },
        file_handle,
    })
}

/// Mime type an upload is accepted under, or `None` when it does not fit
/// the field type.
fn accepted_mime(field_type: FieldType, media: &AttachmentMedia) -> Option<String> {
    match (field_type, media) {
        (FieldType::Image, AttachmentMedia::Photo) => Some("image/jpeg".to_string()),
        (FieldType::Image, AttachmentMedia::Document { mime: Some(m) })
            if IMAGE_MIMES.contains(&m.as_str()) =>
        {
            Some(m.clone())
        }
        (FieldType::Pdf, AttachmentMedia::Document { mime: Some(m) }) if m == PDF_MIME => {
            Some(m.clone())
        }
        (FieldType::Zip, AttachmentMedia::Document { mime: Some(m) })
            if ZIP_MIMES.contains(&m.as_str()) =>
        {
            // Archives declared with a generic mime still get the zip
            // extension on disk.
            Some("application/zip".to_string())
        }
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
