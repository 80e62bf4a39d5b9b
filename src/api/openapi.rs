//! OpenAPI document served by the Swagger UI.

use utoipa::OpenApi;

/// OpenAPI documentation for the gateway API
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::chat_completions,
        crate::api::handlers::list_models,
        crate::api::handlers::health,
        crate::api::documents::upload_document,
        crate::api::documents::list_session_files,
        crate::api::documents::delete_session_file,
        crate::api::calendar::list_calendars,
        crate::api::calendar::toggle_calendar,
        crate::api::calendar::unified_calendar,
        crate::api::calendar::calendar_conflicts,
        crate::api::calendar::calendar_availability,
        crate::api::calendar::calendar_suggestions,
    ),
    components(
        schemas(
            crate::api::models::ChatCompletionRequest,
            crate::api::models::ChatCompletionResponse,
            crate::api::models::ChatCompletionChunk,
            crate::api::models::StreamChoice,
            crate::api::models::Delta,
            crate::api::models::Message,
            crate::api::models::Role,
            crate::api::models::Choice,
            crate::api::models::Usage,
            crate::api::models::ModelList,
            crate::api::models::ModelInfo,
            crate::api::models::HealthResponse,
            crate::api::models::UploadRequest,
            crate::api::models::UploadResponse,
            crate::api::models::SessionFile,
            crate::api::models::SessionFilesResponse,
            crate::api::models::DeleteFileResponse,
            crate::api::models::CalendarListResponse,
            crate::api::models::CalendarToggleRequest,
            crate::api::models::UnifiedCalendarResponse,
            crate::api::models::ConflictResponse,
            crate::api::models::AvailabilityRequest,
            crate::api::models::AvailabilityResponse,
            crate::api::models::SuggestionRequest,
            crate::api::models::SuggestionResponse,
            crate::services::calendar_store::CalendarConfig,
            crate::services::calendar_store::CalendarEvent,
            crate::services::calendar_store::CalendarProvider,
            crate::services::calendar_store::EventStatus,
            crate::services::scheduling::Conflict,
            crate::services::scheduling::ConflictKind,
            crate::services::scheduling::TimeSlot,
            crate::api::models::ErrorBody,
        )
    ),
    tags(
        (name = "completions", description = "OpenAI-compatible chat completions"),
        (name = "models", description = "Models offered by the upstream"),
        (name = "documents", description = "Session document uploads used as chat context"),
        (name = "calendar", description = "Unified calendar, conflicts and meeting slot search"),
        (name = "health", description = "Liveness and upstream reachability")
    ),
    info(
        title = "LLM Gateway API",
        version = "1.0.0",
        description = "OpenAI-compatible gateway in front of a single model server.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://127.0.0.1:5001", description = "Local development server")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
