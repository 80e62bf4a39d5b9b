//! API request and response models.
//!
//! This module defines the data structures exposed by the gateway:
//! OpenAI-compatible chat completion requests/responses and stream chunks,
//! model listings, health checks, the document endpoints and the calendar
//! scheduling endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub use crate::core::error::ErrorBody;
pub use crate::services::calendar_store::{CalendarConfig, CalendarEvent};
pub use crate::services::scheduling::{Conflict, TimeSlot};
pub use crate::transformer::{Role, UnifiedMessage as Message, Usage};

use crate::services::scheduling::{
    parse_date, parse_time_of_day, parse_timezone, SchedulingError, SlotQuery,
};

/// Chat completion request following OpenAI API format.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "model": "llama3:8b",
    "messages": [
        {"role": "system", "content": "You are a helpful assistant."},
        {"role": "user", "content": "Hello!"}
    ],
    "temperature": 0.7,
    "max_tokens": 256,
    "stream": false
}))]
pub struct ChatCompletionRequest {
    /// Model identifier
    pub model: String,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens to generate (at least 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Session whose uploaded documents provide context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Restrict context to these uploaded files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

fn default_temperature() -> f64 {
    0.7
}

impl ChatCompletionRequest {
    /// Check value ranges the schema cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == Some(0) {
            return Err("max_tokens must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "chatcmpl-3f9a1c2b7d",
    "object": "chat.completion",
    "created": 1677858242,
    "model": "llama3:8b",
    "choices": [{
        "index": 0,
        "message": {"role": "assistant", "content": "Hello! How can I help you today?"},
        "finish_reason": "stop"
    }],
    "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
}))]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// A single choice in the response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// Streaming response chunk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

/// A single choice in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    /// Serialized as `null` until the final chunk
    pub finish_reason: Option<String>,
}

/// Delta content in streaming responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Model list response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "object": "list",
    "data": [{"id": "llama3:8b", "object": "model"}]
}))]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    pub fn from_ids(ids: Vec<String>) -> Self {
        Self {
            object: "list".to_string(),
            data: ids
                .into_iter()
                .map(|id| ModelInfo {
                    id,
                    object: "model".to_string(),
                })
                .collect(),
        }
    }
}

/// Model information.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "ok", "upstream_reachable": true}))]
pub struct HealthResponse {
    pub status: String,
    pub upstream_reachable: bool,
}

/// Multipart form accepted by the upload endpoint.
#[derive(Debug, Clone, ToSchema)]
pub struct UploadRequest {
    /// Document to attach (`.pdf`, `.docx`, `.txt`, `.md` or `.csv`)
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,

    /// Chat session the document belongs to
    pub session_id: String,
}

/// Result of a processed upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub file_id: String,
    pub filename: String,
    pub status: String,
    pub session_id: String,
    pub chunks: usize,
}

/// A document attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionFile {
    pub file_id: String,
    pub filename: String,
    /// Unix timestamp (seconds)
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionFilesResponse {
    pub session_id: String,
    pub files: Vec<SessionFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponse {
    pub ok: bool,
}

// ============================================================================
// Calendar scheduling
// ============================================================================

fn check_user_id(user_id: &str) -> Result<(), String> {
    if user_id.trim().is_empty() {
        return Err("user_id must not be empty".to_string());
    }
    Ok(())
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Query selecting one user's calendar data.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub user_id: String,
}

impl UserQuery {
    pub fn validate(&self) -> Result<(), String> {
        check_user_id(&self.user_id)
    }
}

/// Query for the unified calendar view.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnifiedCalendarQuery {
    pub user_id: String,
    /// Echoed back; must be a known IANA zone. Defaults to `UTC`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Keep events ending at or after this instant
    pub start: Option<String>,
    /// Keep events starting at or before this instant
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendarListResponse {
    pub user_id: String,
    pub calendars: Vec<CalendarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendarToggleRequest {
    pub user_id: String,
    pub included: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnifiedCalendarResponse {
    pub user_id: String,
    pub timezone: String,
    pub events: Vec<CalendarEvent>,
    pub partial_results: bool,
    pub failed_providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConflictResponse {
    pub user_id: String,
    pub conflicts: Vec<Conflict>,
}

/// Free-slot search for one day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "u1",
    "date": "2026-02-23",
    "timezone": "Europe/Berlin",
    "duration_minutes": 30,
    "buffer_minutes": 10,
    "working_hours_start": "09:00",
    "working_hours_end": "17:00"
}))]
pub struct AvailabilityRequest {
    pub user_id: String,
    /// Day to search, `YYYY-MM-DD` in `timezone`
    pub date: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Meeting length, 5 to 600 minutes
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    /// Free time kept around every event, 0 to 180 minutes
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: u32,
    #[serde(default = "default_working_hours_start")]
    pub working_hours_start: String,
    #[serde(default = "default_working_hours_end")]
    pub working_hours_end: String,
}

fn default_duration_minutes() -> u32 {
    30
}

fn default_buffer_minutes() -> u32 {
    10
}

fn default_working_hours_start() -> String {
    "09:00".to_string()
}

fn default_working_hours_end() -> String {
    "17:00".to_string()
}

impl AvailabilityRequest {
    /// Check value ranges the schema cannot express.
    pub fn validate(&self) -> Result<(), String> {
        check_user_id(&self.user_id)?;
        if !(5..=600).contains(&self.duration_minutes) {
            return Err(format!(
                "duration_minutes must be between 5 and 600, got {}",
                self.duration_minutes
            ));
        }
        if self.buffer_minutes > 180 {
            return Err(format!(
                "buffer_minutes must be between 0 and 180, got {}",
                self.buffer_minutes
            ));
        }
        Ok(())
    }

    pub fn slot_query(&self) -> Result<SlotQuery, SchedulingError> {
        Ok(SlotQuery {
            date: parse_date(&self.date)?,
            timezone: parse_timezone(&self.timezone)?,
            duration: chrono::Duration::minutes(i64::from(self.duration_minutes)),
            buffer: chrono::Duration::minutes(i64::from(self.buffer_minutes)),
            working_start: parse_time_of_day(&self.working_hours_start)?,
            working_end: parse_time_of_day(&self.working_hours_end)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResponse {
    pub user_id: String,
    pub timezone: String,
    pub duration_minutes: u32,
    pub slots: Vec<TimeSlot>,
}

/// Free-slot search ranked into meeting suggestions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestionRequest {
    #[serde(flatten)]
    pub availability: AvailabilityRequest,
    /// Maximum number of suggestions, 1 to 10
    #[serde(default = "default_min_suggestions")]
    pub min_suggestions: u32,
    /// Preferred local start window, `HH:MM`; both ends are required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_end: Option<String>,
}

fn default_min_suggestions() -> u32 {
    3
}

impl SuggestionRequest {
    pub fn validate(&self) -> Result<(), String> {
        self.availability.validate()?;
        if !(1..=10).contains(&self.min_suggestions) {
            return Err(format!(
                "min_suggestions must be between 1 and 10, got {}",
                self.min_suggestions
            ));
        }
        Ok(())
    }

    /// The preferred window, when both ends are given.
    pub fn preferred_window(
        &self,
    ) -> Result<Option<(chrono::NaiveTime, chrono::NaiveTime)>, SchedulingError> {
        match (&self.preferred_start, &self.preferred_end) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                Ok(Some((parse_time_of_day(start)?, parse_time_of_day(end)?)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestionResponse {
    pub user_id: String,
    pub timezone: String,
    pub suggestions: Vec<TimeSlot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(req.temperature, 0.7);
        assert!(!req.stream);
        assert!(req.max_tokens.is_none());
        assert!(req.session_id.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_rejects_unknown_role() {
        let result = serde_json::from_value::<ChatCompletionRequest>(json!({
            "model": "m",
            "messages": [{"role": "tool", "content": "hi"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let mut req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [],
            "temperature": 2.5
        }))
        .unwrap();
        assert!(req.validate().is_err());

        req.temperature = 2.0;
        req.max_tokens = Some(0);
        assert!(req.validate().is_err());

        req.max_tokens = Some(1);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_chunk_serializes_null_finish_reason() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".into(),
            object: "chat.completion.chunk".into(),
            created: 1,
            model: "m".into(),
            choices: vec![StreamChoice {
                index: 0,
                delta: Delta {
                    content: Some("Hi".into()),
                },
                finish_reason: None,
            }],
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], serde_json::Value::Null);
        assert_eq!(value["choices"][0]["delta"], json!({"content": "Hi"}));
    }

    #[test]
    fn test_model_list_from_ids() {
        let list = ModelList::from_ids(vec!["a".into(), "b".into()]);
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(
            value,
            json!({"object": "list", "data": [
                {"id": "a", "object": "model"},
                {"id": "b", "object": "model"}
            ]})
        );
    }

    #[test]
    fn test_availability_defaults() {
        let req: AvailabilityRequest =
            serde_json::from_value(json!({"user_id": "u1", "date": "2026-02-23"})).unwrap();
        assert_eq!(req.timezone, "UTC");
        assert_eq!(req.duration_minutes, 30);
        assert_eq!(req.buffer_minutes, 10);
        assert!(req.validate().is_ok());

        let query = req.slot_query().unwrap();
        assert_eq!(query.working_start.to_string(), "09:00:00");
        assert_eq!(query.working_end.to_string(), "17:00:00");
        assert_eq!(query.buffer, chrono::Duration::minutes(10));
    }

    #[test]
    fn test_availability_ranges() {
        let mut req: AvailabilityRequest = serde_json::from_value(
            json!({"user_id": "u1", "date": "2026-02-23", "duration_minutes": 4}),
        )
        .unwrap();
        assert!(req.validate().is_err());
        req.duration_minutes = 600;
        req.buffer_minutes = 181;
        assert!(req.validate().is_err());
        req.buffer_minutes = 0;
        req.user_id = " ".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_suggestion_request_flattens_availability() {
        let req: SuggestionRequest = serde_json::from_value(json!({
            "user_id": "u1",
            "date": "2026-02-23",
            "timezone": "Europe/Berlin",
            "preferred_start": "13:00"
        }))
        .unwrap();
        assert_eq!(req.availability.timezone, "Europe/Berlin");
        assert_eq!(req.min_suggestions, 3);
        // One end alone does not form a window
        assert_eq!(req.preferred_window().unwrap(), None);
        assert!(req.validate().is_ok());
    }
}
