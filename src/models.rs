use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Identity descriptor of the signed-in principal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub username: String,
    pub name: String,
}

/// Process-wide credential state. Either wholly absent (signed out) or fully
/// populated; never persisted, so a restart always comes back signed out.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: SecretString,
    /// Absent when the authority issued no refresh token; renewal then
    /// requires a full interactive sign-in
    pub refresh_token: Option<SecretString>,
    pub expires_on: DateTime<Utc>,
    pub account: Account,
}

/// Token endpoint response from the authority
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Graph `/me` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMe {
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

// --- Graph calendar wire types ---

#[derive(Debug, Clone, Deserialize)]
pub struct GraphEventsPage {
    #[serde(default)]
    pub value: Vec<GraphEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    pub id: String,
    pub subject: Option<String>,
    pub start: GraphDateTime,
    pub end: GraphDateTime,
    pub location: Option<GraphLocation>,
    pub body_preview: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    pub organizer: Option<GraphRecipient>,
    #[serde(default)]
    pub attendees: Vec<GraphRecipient>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDateTime {
    pub date_time: String,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLocation {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecipient {
    pub email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Normalized calendar event served to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub time_zone: String,
    pub location: String,
    pub description: String,
    pub is_all_day: bool,
    pub organizer: String,
    pub attendees: Vec<String>,
    pub categories: Vec<String>,
}

impl From<GraphEvent> for CalendarEvent {
    fn from(event: GraphEvent) -> Self {
        CalendarEvent {
            id: event.id,
            title: event.subject.unwrap_or_default(),
            start: event.start.date_time,
            end: event.end.date_time,
            time_zone: event.start.time_zone.unwrap_or_default(),
            location: event
                .location
                .and_then(|l| l.display_name)
                .unwrap_or_default(),
            description: event.body_preview.unwrap_or_default(),
            is_all_day: event.is_all_day,
            organizer: event
                .organizer
                .and_then(|o| o.email_address)
                .and_then(|e| e.name)
                .unwrap_or_default(),
            attendees: event
                .attendees
                .into_iter()
                .filter_map(|a| a.email_address.and_then(|e| e.name))
                .collect(),
            categories: event.categories,
        }
    }
}
