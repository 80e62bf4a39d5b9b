//! Unified calendar model consumed by the scheduling engine.
//!
//! Provider sync (connecting accounts, importing events) happens outside
//! the gateway; it feeds calendars and events into a [`CalendarStore`].
//! The scheduling endpoints only read from it and toggle which calendars
//! take part in the unified view.

use chrono::{DateTime, FixedOffset};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Calendar provider an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CalendarProvider {
    Google,
    Microsoft,
}

impl CalendarProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            CalendarProvider::Google => "google",
            CalendarProvider::Microsoft => "microsoft",
        }
    }
}

impl std::fmt::Display for CalendarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
}

/// A calendar of a connected account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CalendarConfig {
    pub id: String,
    pub provider: CalendarProvider,
    pub account_id: String,
    pub name: String,
    /// Whether events of this calendar appear in the unified view
    #[serde(default = "default_included")]
    pub included: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_included() -> bool {
    true
}

/// An event normalized across providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "evt_1a2b3c4d",
    "provider": "google",
    "calendar_id": "gcal_primary",
    "title": "Standup",
    "start": "2026-02-23T10:00:00+00:00",
    "end": "2026-02-23T10:30:00+00:00",
    "status": "confirmed",
    "attendees": [],
    "timezone": "UTC",
    "source_account_id": "google_5e6f7a8b"
}))]
pub struct CalendarEvent {
    pub id: String,
    pub provider: CalendarProvider,
    pub calendar_id: String,
    pub title: String,
    #[schema(value_type = String, format = DateTime)]
    pub start: DateTime<FixedOffset>,
    #[schema(value_type = String, format = DateTime)]
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub attendees: Vec<String>,
    /// IANA zone the event was authored in
    pub timezone: String,
    pub source_account_id: String,
}

/// Read side of the unified calendar, per user.
pub trait CalendarStore: Send + Sync {
    /// Calendars of a user, in the order they were added.
    fn list_calendars(&self, user_id: &str) -> Vec<CalendarConfig>;

    /// Include or exclude a calendar from the unified view. `None` when the
    /// user has no such calendar.
    fn set_calendar_included(
        &self,
        user_id: &str,
        calendar_id: &str,
        included: bool,
    ) -> Option<CalendarConfig>;

    /// Events of the user's included calendars, sorted by start.
    fn unified_events(&self, user_id: &str) -> Vec<CalendarEvent>;
}

#[derive(Debug, Default)]
struct UserCalendars {
    calendars: Vec<CalendarConfig>,
    events: Vec<CalendarEvent>,
}

/// Process-local [`CalendarStore`]. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCalendarStore {
    users: DashMap<String, UserCalendars>,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a calendar, replacing one with the same id.
    pub fn upsert_calendar(&self, user_id: &str, calendar: CalendarConfig) {
        let mut user = self.users.entry(user_id.to_string()).or_default();
        match user.calendars.iter_mut().find(|c| c.id == calendar.id) {
            Some(existing) => *existing = calendar,
            None => user.calendars.push(calendar),
        }
    }

    /// Add an event, replacing one with the same id.
    pub fn upsert_event(&self, user_id: &str, event: CalendarEvent) {
        let mut user = self.users.entry(user_id.to_string()).or_default();
        match user.events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => user.events.push(event),
        }
    }

    /// Drop a calendar together with its events. Returns false if unknown.
    pub fn remove_calendar(&self, user_id: &str, calendar_id: &str) -> bool {
        let Some(mut user) = self.users.get_mut(user_id) else {
            return false;
        };
        let before = user.calendars.len();
        user.calendars.retain(|c| c.id != calendar_id);
        if user.calendars.len() == before {
            return false;
        }
        user.events.retain(|e| e.calendar_id != calendar_id);
        true
    }
}

impl CalendarStore for InMemoryCalendarStore {
    fn list_calendars(&self, user_id: &str) -> Vec<CalendarConfig> {
        self.users
            .get(user_id)
            .map(|user| user.calendars.clone())
            .unwrap_or_default()
    }

    fn set_calendar_included(
        &self,
        user_id: &str,
        calendar_id: &str,
        included: bool,
    ) -> Option<CalendarConfig> {
        let mut user = self.users.get_mut(user_id)?;
        let calendar = user.calendars.iter_mut().find(|c| c.id == calendar_id)?;
        calendar.included = included;
        tracing::info!(
            user_id = %user_id,
            calendar_id = %calendar_id,
            included,
            "Calendar inclusion changed"
        );
        Some(calendar.clone())
    }

    fn unified_events(&self, user_id: &str) -> Vec<CalendarEvent> {
        let Some(user) = self.users.get(user_id) else {
            return Vec::new();
        };
        let mut events: Vec<CalendarEvent> = user
            .events
            .iter()
            .filter(|event| {
                user.calendars
                    .iter()
                    .any(|c| c.included && c.id == event.calendar_id)
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| event.start);
        events
    }
}
