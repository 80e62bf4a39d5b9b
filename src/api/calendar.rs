//! Calendar scheduling endpoints.
//!
//! Read-only views over the [`CalendarStore`](crate::services::CalendarStore)
//! plus the inclusion toggle. All routes require the gateway bearer token.

use crate::api::handlers::AppState;
use crate::api::models::*;
use crate::core::logging::get_request_id;
use crate::core::{AppError, Result};
use crate::services::scheduling::{
    available_slots, detect_conflicts, parse_timestamp, parse_timezone, rank_suggestions,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(query)
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok(payload)
}

/// List the user's calendars with their inclusion flags.
#[utoipa::path(
    get,
    path = "/v1/productivity/calendars",
    tag = "calendar",
    params(UserQuery),
    responses(
        (status = 200, description = "Calendars of the user", body = CalendarListResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn list_calendars(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: std::result::Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<CalendarListResponse>> {
    state.verify_auth(&headers)?;
    let query = query_params(query)?;
    query.validate().map_err(AppError::Validation)?;

    let calendars = state.calendars.list_calendars(&query.user_id);
    Ok(Json(CalendarListResponse {
        user_id: query.user_id,
        calendars,
    }))
}

/// Include or exclude a calendar from the unified view.
#[utoipa::path(
    post,
    path = "/v1/productivity/calendars/{calendar_id}/toggle",
    tag = "calendar",
    params(("calendar_id" = String, Path, description = "Calendar identifier")),
    request_body = CalendarToggleRequest,
    responses(
        (status = 200, description = "Updated calendar", body = CalendarConfig),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Unknown calendar", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn toggle_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(calendar_id): Path<String>,
    payload: std::result::Result<Json<CalendarToggleRequest>, JsonRejection>,
) -> Result<Json<CalendarConfig>> {
    state.verify_auth(&headers)?;
    let payload = json_body(payload)?;
    if payload.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }

    state
        .calendars
        .set_calendar_included(&payload.user_id, &calendar_id, payload.included)
        .map(Json)
        .ok_or(AppError::CalendarNotFound(calendar_id))
}

/// Events of all included calendars, merged and sorted by start.
#[utoipa::path(
    get,
    path = "/v1/productivity/calendar/unified",
    tag = "calendar",
    params(UnifiedCalendarQuery),
    responses(
        (status = 200, description = "Unified event list", body = UnifiedCalendarResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn unified_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: std::result::Result<Query<UnifiedCalendarQuery>, QueryRejection>,
) -> Result<Json<UnifiedCalendarResponse>> {
    state.verify_auth(&headers)?;
    let query = query_params(query)?;
    if query.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }
    parse_timezone(&query.timezone)?;
    let from = query.start.as_deref().map(parse_timestamp).transpose()?;
    let until = query.end.as_deref().map(parse_timestamp).transpose()?;

    let events: Vec<_> = state
        .calendars
        .unified_events(&query.user_id)
        .into_iter()
        .filter(|event| from.map_or(true, |from| event.end >= from))
        .filter(|event| until.map_or(true, |until| event.start <= until))
        .collect();

    tracing::debug!(user_id = %query.user_id, events = events.len(), "Unified calendar built");
    Ok(Json(UnifiedCalendarResponse {
        user_id: query.user_id,
        timezone: query.timezone,
        events,
        partial_results: false,
        failed_providers: Vec::new(),
    }))
}

/// Overlapping events across the user's included calendars.
#[utoipa::path(
    get,
    path = "/v1/productivity/calendar/conflicts",
    tag = "calendar",
    params(UserQuery),
    responses(
        (status = 200, description = "Detected conflicts", body = ConflictResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn calendar_conflicts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: std::result::Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ConflictResponse>> {
    state.verify_auth(&headers)?;
    let query = query_params(query)?;
    query.validate().map_err(AppError::Validation)?;

    let events = state.calendars.unified_events(&query.user_id);
    let conflicts = detect_conflicts(&events);
    if !conflicts.is_empty() {
        tracing::info!(user_id = %query.user_id, conflicts = conflicts.len(), "Calendar conflicts found");
    }
    Ok(Json(ConflictResponse {
        user_id: query.user_id,
        conflicts,
    }))
}

/// Free slots within working hours on one day.
#[utoipa::path(
    post,
    path = "/v1/productivity/calendar/availability",
    tag = "calendar",
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Free slots", body = AvailabilityResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn calendar_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<AvailabilityRequest>, JsonRejection>,
) -> Result<Json<AvailabilityResponse>> {
    state.verify_auth(&headers)?;
    let payload = json_body(payload)?;
    payload.validate().map_err(AppError::Validation)?;
    let slot_query = payload.slot_query()?;

    let events = state.calendars.unified_events(&payload.user_id);
    let slots = available_slots(&events, &slot_query)?;

    tracing::debug!(user_id = %payload.user_id, slots = slots.len(), "Availability computed");
    Ok(Json(AvailabilityResponse {
        user_id: payload.user_id,
        timezone: payload.timezone,
        duration_minutes: payload.duration_minutes,
        slots,
    }))
}

/// Ranked meeting suggestions for one day.
#[utoipa::path(
    post,
    path = "/v1/productivity/calendar/suggestions",
    tag = "calendar",
    request_body = SuggestionRequest,
    responses(
        (status = 200, description = "Ranked suggestions", body = SuggestionResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn calendar_suggestions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<SuggestionResponse>> {
    state.verify_auth(&headers)?;
    let payload = json_body(payload)?;
    payload.validate().map_err(AppError::Validation)?;
    let slot_query = payload.availability.slot_query()?;
    let preferred = payload.preferred_window()?;

    let events = state.calendars.unified_events(&payload.availability.user_id);
    let slots = available_slots(&events, &slot_query)?;
    let suggestions = rank_suggestions(slots, payload.min_suggestions as usize, preferred);

    Ok(Json(SuggestionResponse {
        user_id: payload.availability.user_id,
        timezone: payload.availability.timezone,
        suggestions,
    }))
}
