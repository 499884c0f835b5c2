//! # Runtime Adapters
//!
//! Production implementations of the engine's service seams: wall clock,
//! template rendering, directory-backed blob storage and the outbound
//! transport.

use chrono::{DateTime, Local, NaiveDate, Utc};
use enroll_core::{Clock, EnrollError, Outbound, RenderContext, Renderer};
use std::path::PathBuf;

// =============================================================================
// CLOCK
// =============================================================================

/// System clock; `today()` follows the host timezone, which is where the
/// deployment's date-bound validation rules are evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

// =============================================================================
// TEMPLATE RENDERER
// =============================================================================

/// Plain `{{ key }}` substitution renderer.
///
/// Placeholders without a context entry are left verbatim, so an admin
/// typo shows up in the delivered text instead of silently vanishing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl Renderer for TemplateRenderer {
    fn render(&self, template: &str, ctx: &RenderContext) -> Result<String, EnrollError> {
        let mut out = template.to_string();
        for (key, value) in ctx {
            out = out.replace(&format!("{{{{ {key} }}}}"), value);
        }
        Ok(out)
    }
}

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Blob storage over a local directory tree: one subdirectory per bucket,
/// one file per object.
#[derive(Debug, Clone)]
pub struct DirBlobs {
    root: PathBuf,
}

impl DirBlobs {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, name: &str) -> PathBuf {
        self.root.join(bucket).join(name)
    }
}

impl enroll_core::Blobs for DirBlobs {
    fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), EnrollError> {
        let dir = self.root.join(bucket);
        std::fs::create_dir_all(&dir)
            .map_err(|e| EnrollError::IoError(format!("Cannot create bucket '{bucket}': {e}")))?;
        std::fs::write(self.object_path(bucket, name), bytes)
            .map_err(|e| EnrollError::IoError(format!("Cannot write '{bucket}/{name}': {e}")))
    }

    fn get(&self, bucket: &str, name: &str) -> Result<Vec<u8>, EnrollError> {
        std::fs::read(self.object_path(bucket, name))
            .map_err(|e| EnrollError::IoError(format!("Cannot read '{bucket}/{name}': {e}")))
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Outbound delivery seam.
///
/// `deliver` returns the transport-side file handle of an uploaded
/// attachment when the platform reports one, so the engine's cache-back
/// slots can be filled.
pub trait Transport: Send + Sync {
    fn deliver(&self, outbound: &Outbound) -> Result<Option<String>, EnrollError>;
}

/// Transport that logs every outbound action instead of delivering it.
///
/// Stands in wherever no chat platform is wired up: local development,
/// the `tick` command and the API tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransport;

impl Transport for LoggingTransport {
    fn deliver(&self, outbound: &Outbound) -> Result<Option<String>, EnrollError> {
        match outbound {
            Outbound::Send { to, message } => {
                tracing::info!(recipient = ?to, body = %message.body, "send");
            }
            Outbound::EditText { to, target, body, .. } => {
                tracing::info!(recipient = ?to, target, body = %body, "edit_text");
            }
            Outbound::EditKeyboard { to, target, .. } => {
                tracing::info!(recipient = ?to, target, "edit_keyboard");
            }
        }
        Ok(None)
    }
}

// =============================================================================
// TESTS
// =============================================================================
