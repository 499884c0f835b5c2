//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers: the
//! interaction entry point for transport bridges, record read/write for
//! the external admin tool, and operational endpoints.

use super::{
    AppState,
    types::{
        HealthResponse, InteractionRequest, InteractionResponse, SaveResponse, StatusResponse,
        TickResponse,
    },
};
use crate::runtime::{LocalClock, TemplateRenderer};
use crate::scheduler::{perform_outbound, run_passes};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use enroll_core::{
    Branch, ConditionalMessage, EnrollError, Field, Group, MenuKey, Notification,
    NotificationStatus, Services, Settings, Store, branch_chain_cycle,
};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get engine status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;

    let response = collect_status(&*store).map(Json);
    match response {
        Ok(json) => (StatusCode::OK, json).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SaveResponse::error(format!("Status failed: {e}"))),
        )
            .into_response(),
    }
}

fn collect_status<S: Store>(store: &S) -> Result<StatusResponse, EnrollError> {
    let pending = store
        .notifications()?
        .iter()
        .filter(|n| {
            matches!(
                n.status,
                NotificationStatus::ToDeliver | NotificationStatus::Planned
            )
        })
        .count();

    Ok(StatusResponse {
        participants: store.participants()?.len(),
        active_participants: store.active_participant_count()? as usize,
        branches: store.branches()?.len(),
        fields: store.fields()?.len(),
        messages: store.messages()?.len(),
        menu_keys: store.menu_keys()?.len(),
        pending_notifications: pending,
        groups: store.groups()?.len(),
    })
}

// =============================================================================
// INTERACTION HANDLER
// =============================================================================

/// Handle one inbound chat interaction.
///
/// The engine runs under the store's write lock; the produced outbound
/// batch is performed before the response is sent, so the caller learns
/// how much actually went out.
pub async fn interaction_handler(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;
    let services = Services {
        clock: &LocalClock,
        renderer: &TemplateRenderer,
        blobs: state.blobs.as_ref(),
    };

    match enroll_core::handle(
        &mut *store,
        request.chat,
        request.event.into_event(),
        &services,
    ) {
        Ok(batch) => {
            let performed = perform_outbound(&mut *store, state.transport.as_ref(), &batch);
            (
                StatusCode::OK,
                Json(InteractionResponse::success(performed)),
            )
        }
        Err(e @ EnrollError::IoError(_) | e @ EnrollError::SerializationError(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(InteractionResponse::error(format!("Interaction failed: {e}"))),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(InteractionResponse::error(format!("Interaction failed: {e}"))),
        ),
    }
}

// =============================================================================
// TICK HANDLER
// =============================================================================

/// Run one scheduler round on demand.
pub async fn tick_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Same lease the interval loop takes; a manual tick never overlaps it.
    let _lease = state.scheduler_lease.lock().await;
    let mut store = state.store.write().await;

    match run_passes(&mut *store) {
        Ok(batch) => {
            let performed = perform_outbound(&mut *store, state.transport.as_ref(), &batch);
            (StatusCode::OK, Json(TickResponse::success(performed)))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TickResponse::error(format!("Tick failed: {e}"))),
        ),
    }
}

// =============================================================================
// RECORD HANDLERS
// =============================================================================

fn save_error(e: &EnrollError) -> (StatusCode, Json<SaveResponse>) {
    let status = match e {
        EnrollError::IoError(_) | EnrollError::SerializationError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(SaveResponse::error(format!("{e}"))))
}

fn list_error(e: &EnrollError) -> (StatusCode, Json<SaveResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(SaveResponse::error(format!("{e}"))),
    )
}

macro_rules! list_handler {
    ($name:ident, $getter:ident) => {
        /// List records of one kind.
        pub async fn $name(State(state): State<AppState>) -> impl IntoResponse {
            let store = state.store.read().await;
            match store.$getter() {
                Ok(records) => (StatusCode::OK, Json(records)).into_response(),
                Err(e) => list_error(&e).into_response(),
            }
        }
    };
}

list_handler!(list_branches_handler, branches);
list_handler!(list_fields_handler, fields);
list_handler!(list_messages_handler, messages);
list_handler!(list_menu_keys_handler, menu_keys);
list_handler!(list_notifications_handler, notifications);
list_handler!(list_groups_handler, groups);

/// Save a branch. Rejects a `next_branch` chain that would loop.
pub async fn put_branch_handler(
    State(state): State<AppState>,
    Json(branch): Json<Branch>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;

    match branch_chain_cycle(&*store, &branch) {
        Ok(None) => {}
        Ok(Some(looped)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SaveResponse::error(format!(
                    "branch chain would revisit branch {}",
                    looped.0
                ))),
            );
        }
        Err(e) => return save_error(&e),
    }

    match store.put_branch(&branch) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Save a field after running its consistency checks.
pub async fn put_field_handler(
    State(state): State<AppState>,
    Json(field): Json<Field>,
) -> impl IntoResponse {
    if let Err(e) = field.check() {
        return save_error(&e);
    }
    let mut store = state.store.write().await;
    match store.put_field(&field) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Save a conditional message after checking its reply lists.
pub async fn put_message_handler(
    State(state): State<AppState>,
    Json(message): Json<ConditionalMessage>,
) -> impl IntoResponse {
    if let Err(e) = message.check() {
        return save_error(&e);
    }
    let mut store = state.store.write().await;
    match store.put_message(&message) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Save a menu key.
pub async fn put_menu_key_handler(
    State(state): State<AppState>,
    Json(key): Json<MenuKey>,
) -> impl IntoResponse {
    if let Err(e) = key.check() {
        return save_error(&e);
    }
    let mut store = state.store.write().await;
    match store.put_menu_key(&key) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Save a notification. The delivery status never moves backwards; a
/// delivered notification stays delivered whatever the admin tool sends.
pub async fn put_notification_handler(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;

    match store.notification(notification.id) {
        Ok(Some(existing)) if notification.status < existing.status => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SaveResponse::error(format!(
                    "notification {} cannot move from {:?} back to {:?}",
                    notification.id.0, existing.status, notification.status
                ))),
            );
        }
        Ok(_) => {}
        Err(e) => return save_error(&e),
    }

    match store.message(notification.message) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SaveResponse::error(format!(
                    "notification {} names a missing message {}",
                    notification.id.0, notification.message.0
                ))),
            );
        }
        Err(e) => return save_error(&e),
    }

    match store.put_notification(&notification) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Save a group.
pub async fn put_group_handler(
    State(state): State<AppState>,
    Json(group): Json<Group>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;
    match store.put_group(&group) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}

/// Get the settings record.
pub async fn get_settings_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    match store.settings() {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(e) => list_error(&e).into_response(),
    }
}

/// Save the settings record. The root branch and display-name field it
/// names must already exist.
pub async fn put_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;

    match store.branch_by_key(&settings.root_branch) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SaveResponse::error(format!(
                    "root branch '{}' does not exist",
                    settings.root_branch
                ))),
            );
        }
        Err(e) => return save_error(&e),
    }
    match store.field_by_key(&settings.display_name_field) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SaveResponse::error(format!(
                    "display-name field '{}' does not exist",
                    settings.display_name_field
                ))),
            );
        }
        Err(e) => return save_error(&e),
    }

    match store.put_settings(&settings) {
        Ok(()) => (StatusCode::OK, Json(SaveResponse::success())),
        Err(e) => save_error(&e),
    }
}
