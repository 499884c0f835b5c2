//! # Scheduler Loop
//!
//! Periodic driver for the engine's notification passes, plus the shared
//! outbound dispatch used by the interaction handler.
//!
//! Rounds are serialized through an in-process lease: the interval loop
//! and the manual tick endpoint take the same `tokio::sync::Mutex`, so
//! two rounds can never interleave their flip-then-send sequences.

use crate::api::AppState;
use crate::runtime::{LocalClock, TemplateRenderer, Transport};
use enroll_core::{EnrollError, Outbound, Store, perform_pass, personal_pass, plan_pass};
use std::time::Duration;

// =============================================================================
// PASSES
// =============================================================================

/// Run one full scheduler round: plan, deliver, personal.
pub fn run_passes<S: Store>(store: &mut S) -> Result<Vec<Outbound>, EnrollError> {
    let mut batch = plan_pass(store, &TemplateRenderer)?;
    batch.extend(perform_pass(store, &LocalClock, &TemplateRenderer)?);
    batch.extend(personal_pass(store, &TemplateRenderer)?);
    Ok(batch)
}

// =============================================================================
// OUTBOUND DISPATCH
// =============================================================================

/// Perform an outbound batch on the transport.
///
/// Returns how many actions went out. A failed delivery is logged and
/// skipped; the rest of the batch still runs. When the transport reports
/// a file handle for a sent attachment, it is written back into the
/// message or value that asked for it.
pub fn perform_outbound<S: Store>(
    store: &mut S,
    transport: &dyn Transport,
    batch: &[Outbound],
) -> usize {
    let mut performed = 0;
    for outbound in batch {
        match transport.deliver(outbound) {
            Ok(handle) => {
                performed += 1;
                if let (Some(handle), Outbound::Send { message, .. }) = (handle, outbound) {
                    if let Some(slot) = message.cache_to {
                        if let Err(e) = store.cache_file_handle(slot, &handle) {
                            tracing::warn!(error = %e, "file handle cache-back failed");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, outbound = ?outbound, "outbound delivery failed");
            }
        }
    }
    performed
}

// =============================================================================
// INTERVAL LOOP
// =============================================================================

/// Drive scheduler rounds on a fixed interval until the process stops.
pub async fn run_scheduler(state: AppState, tick_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
    tracing::info!(tick_secs, "scheduler loop started");

    loop {
        interval.tick().await;

        // A manual tick holds the lease; skip this round instead of queuing.
        let Ok(_lease) = state.scheduler_lease.try_lock() else {
            continue;
        };

        let mut store = state.store.write().await;
        match run_passes(&mut *store) {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                let performed = perform_outbound(&mut *store, state.transport.as_ref(), &batch);
                tracing::info!(outbound = performed, "scheduler round complete");
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduler round failed");
            }
        }
    }
}
