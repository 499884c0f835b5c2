//! # Service Seams
//!
//! Traits the engine consumes but never implements with real I/O: wall
//! clock, template rendering and blob storage. The app crate supplies the
//! production adapters; tests supply deterministic doubles.

use crate::types::EnrollError;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Template context: flat key/value pairs, deterministic iteration order.
pub type RenderContext = BTreeMap<String, String>;

// =============================================================================
// CLOCK
// =============================================================================

/// Source of the current moment.
///
/// `today()` is the calendar date in the deployment timezone; the engine
/// never reads the system clock directly.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Clock pinned to a fixed instant. Test double; also useful for replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub at: DateTime<Utc>,
}

impl FixedClock {
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn today(&self) -> NaiveDate {
        self.at.date_naive()
    }
}

// =============================================================================
// RENDERER
// =============================================================================

/// Pure `render(template, context) -> string` capability.
pub trait Renderer {
    fn render(&self, template: &str, ctx: &RenderContext) -> Result<String, EnrollError>;
}

// =============================================================================
// BLOBS
// =============================================================================

/// Content-addressed file storage, one namespace per bucket.
pub trait Blobs {
    fn put(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), EnrollError>;

    fn get(&self, bucket: &str, name: &str) -> Result<Vec<u8>, EnrollError>;
}

/// Blob store that accepts everything and retains nothing.
///
/// Used by tests exercising conversation logic that never reads blobs back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBlobs;

impl Blobs for NullBlobs {
    fn put(&self, _: &str, _: &str, _: &[u8], _: &str) -> Result<(), EnrollError> {
        Ok(())
    }

    fn get(&self, bucket: &str, name: &str) -> Result<Vec<u8>, EnrollError> {
        Err(EnrollError::IoError(format!(
            "no such blob: {bucket}/{name}"
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_reports_pinned_date() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.today(), at.date_naive());
    }

    #[test]
    fn test_null_blobs_never_returns_content() {
        let blobs = NullBlobs;
        blobs.put("b", "n", b"data", "text/plain").unwrap();
        assert!(blobs.get("b", "n").is_err());
    }
}
