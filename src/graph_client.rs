use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use reqwest::StatusCode;

use crate::auth_manager::AuthManager;
use crate::errors::CalendarError;
use crate::models::{CalendarEvent, GraphEventsPage};

/// Fields requested from Graph for every event
const EVENT_FIELDS: &str =
    "subject,start,end,location,bodyPreview,attendees,isAllDay,organizer,categories";

/// Page size cap for one events request
const EVENT_PAGE_SIZE: &str = "100";

/// Days of history included when fetching "upcoming" events, so recently
/// finished classes still show on the calendar view
const LOOKBACK_DAYS: i64 = 7;

/// Calendar reads against Microsoft Graph on behalf of the signed-in user
pub struct CalendarClient {
    client: reqwest::Client,
    auth: AuthManager,
    graph_base_url: String,
}

impl CalendarClient {
    pub fn new(auth: AuthManager) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calendar-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let graph_base_url = auth.config().graph_base_url.clone();

        Ok(CalendarClient {
            client,
            auth,
            graph_base_url,
        })
    }

    pub fn auth_manager(&self) -> &AuthManager {
        &self.auth
    }

    pub fn auth_manager_mut(&mut self) -> &mut AuthManager {
        &mut self.auth
    }

    /// Fetch events whose start is at or after `start` and whose end is at or
    /// before `end`, ascending by start time, capped at one page.
    ///
    /// On an authorization failure from Graph despite the pre-check, performs
    /// exactly one token refresh followed by one retry; a second rejection is
    /// surfaced as `AuthenticationExpired`. Non-authorization failures are
    /// surfaced immediately with no retry.
    pub async fn fetch_events_in_window(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        if start > end {
            return Err(CalendarError::InvalidWindow { start, end });
        }

        let start_iso = start.to_rfc3339_opts(SecondsFormat::Millis, true);
        let end_iso = end.to_rfc3339_opts(SecondsFormat::Millis, true);
        let url = format!("{}/me/calendar/events", self.graph_base_url);
        let filter = format!(
            "start/dateTime ge '{}' and end/dateTime le '{}'",
            start_iso, end_iso
        );
        tracing::info!("Fetching calendar events from {} to {}", start_iso, end_iso);

        let mut refreshed = false;
        loop {
            let token = self.auth.get_valid_access_token().await?;
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("$select", EVENT_FIELDS),
                    ("$filter", filter.as_str()),
                    ("$orderby", "start/dateTime"),
                    ("$top", EVENT_PAGE_SIZE),
                ])
                .bearer_auth(&token)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(CalendarError::AuthenticationExpired);
                }
                tracing::warn!("Graph rejected the access token, refreshing and retrying once");
                refreshed = true;
                self.auth
                    .refresh_access_token()
                    .await
                    .map_err(|_| CalendarError::AuthenticationExpired)?;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                tracing::error!("Error fetching calendar events: {} {}", status, message);
                return Err(CalendarError::Upstream {
                    status: status.as_u16(),
                    message,
                });
            }

            let page: GraphEventsPage = response.json().await?;
            tracing::info!("Calendar events found: {}", page.value.len());

            // Graph already filters and orders; re-apply both locally so the
            // contract holds even if the upstream query is loosely honored
            let mut events: Vec<CalendarEvent> = page
                .value
                .into_iter()
                .map(CalendarEvent::from)
                .filter(|e| within_window(e, start, end))
                .collect();
            events.sort_by(|a, b| {
                match (parse_graph_instant(&a.start), parse_graph_instant(&b.start)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => a.start.cmp(&b.start),
                }
            });
            return Ok(events);
        }
    }

    /// Fetch events from `LOOKBACK_DAYS` ago through `days_ahead` days from
    /// now, matching what the calendar view renders by default.
    ///
    /// `days_ahead` comes straight from a query parameter, so horizons that
    /// don't fit the calendar are rejected rather than trusted.
    pub async fn fetch_events_ahead(
        &mut self,
        days_ahead: i64,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let today = Utc::now().date_naive();
        let start = (today - Duration::days(LOOKBACK_DAYS))
            .and_time(NaiveTime::MIN)
            .and_utc();
        let end_date = days_ahead
            .checked_add(1)
            .and_then(Duration::try_days)
            .and_then(|ahead| today.checked_add_signed(ahead))
            .ok_or(CalendarError::InvalidHorizon { days: days_ahead })?;
        let end = end_date.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1);

        self.fetch_events_in_window(start, end).await
    }
}

/// Graph emits local-naive timestamps like `2026-09-01T10:00:00.0000000`;
/// RFC 3339 is accepted too. Unparsable values yield None.
fn parse_graph_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Events with unparsable timestamps are kept; the upstream filter is the
/// source of truth for those.
fn within_window(event: &CalendarEvent, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    match (
        parse_graph_instant(&event.start),
        parse_graph_instant(&event.end),
    ) {
        (Some(event_start), Some(event_end)) => event_start >= start && event_end <= end,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use crate::errors::AuthError;
    use crate::models::{Account, TokenState};
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> OAuthConfig {
        OAuthConfig {
            client_id: Some("test-client".to_string()),
            client_secret: Some("test-secret".to_string()),
            authority_base_url: base_url.to_string(),
            graph_base_url: format!("{}/v1.0", base_url),
            ..OAuthConfig::default()
        }
    }

    fn signed_in_client(base_url: &str, expires_in_secs: i64) -> CalendarClient {
        let mut auth = AuthManager::new(test_config(base_url)).unwrap();
        auth.token_state = Some(TokenState {
            access_token: SecretString::new("A".to_string()),
            refresh_token: Some(SecretString::new("R".to_string())),
            expires_on: Utc::now() + Duration::seconds(expires_in_secs),
            account: Account {
                username: "student@example.edu".to_string(),
                name: "Test Student".to_string(),
            },
        });
        CalendarClient::new(auth).unwrap()
    }

    fn graph_event(id: &str, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": id,
            "subject": format!("Event {}", id),
            "start": { "dateTime": start, "timeZone": "UTC" },
            "end": { "dateTime": end, "timeZone": "UTC" }
        })
    }

    fn window(start: &str, end: &str) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            start.parse::<DateTime<Utc>>().unwrap(),
            end.parse::<DateTime<Utc>>().unwrap(),
        )
    }

    #[test]
    fn test_parse_graph_instant_formats() {
        assert!(parse_graph_instant("2026-09-01T10:00:00.0000000").is_some());
        assert!(parse_graph_instant("2026-09-01T10:00:00Z").is_some());
        assert!(parse_graph_instant("2026-09-01T10:00:00+02:00").is_some());
        assert!(parse_graph_instant("next tuesday").is_none());
    }

    #[tokio::test]
    async fn test_fetch_filters_and_sorts_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    graph_event("late", "2026-09-03T10:00:00.0000000", "2026-09-03T11:00:00.0000000"),
                    graph_event("outside", "2026-08-20T10:00:00.0000000", "2026-08-20T11:00:00.0000000"),
                    graph_event("early", "2026-09-01T09:00:00.0000000", "2026-09-01T10:00:00.0000000")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let events = client.fetch_events_in_window(start, end).await.unwrap();

        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_fetch_retries_once_after_unauthorized() {
        let server = MockServer::start().await;
        // First events call is rejected, the retry succeeds
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    graph_event("e1", "2026-09-01T09:00:00.0000000", "2026-09-01T10:00:00.0000000")
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "B",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let events = client.fetch_events_in_window(start, end).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(client.auth_manager().is_authenticated());
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_second_unauthorized() {
        let server = MockServer::start().await;
        // Exactly two upstream event calls, never a third
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "B",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let result = client.fetch_events_in_window(start, end).await;
        assert!(matches!(result, Err(CalendarError::AuthenticationExpired)));
    }

    #[tokio::test]
    async fn test_fetch_surfaces_expired_auth_when_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let result = client.fetch_events_in_window(start, end).await;
        assert!(matches!(result, Err(CalendarError::AuthenticationExpired)));
        // Failed refresh collapsed state; no credential survives
        assert!(!client.auth_manager().is_authenticated());
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_non_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me/calendar/events"))
            .respond_with(ResponseTemplate::new(503).set_body_string("throttled"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/common/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let result = client.fetch_events_in_window(start, end).await;
        match result {
            Err(CalendarError::Upstream { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "throttled");
            }
            other => panic!("expected Upstream error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_fetch_ahead_rejects_unrepresentable_horizon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = signed_in_client(&server.uri(), 3600);
        // Legal i64 query values far beyond any calendar must fail cleanly
        for days in [100_000_000_000, i64::MAX, i64::MIN] {
            let result = client.fetch_events_ahead(days).await;
            assert!(matches!(
                result,
                Err(CalendarError::InvalidHorizon { days: d }) if d == days
            ));
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_inverted_window() {
        let server = MockServer::start().await;
        let mut client = signed_in_client(&server.uri(), 3600);
        let (start, end) = window("2026-09-30T00:00:00Z", "2026-09-01T00:00:00Z");
        let result = client.fetch_events_in_window(start, end).await;
        assert!(matches!(result, Err(CalendarError::InvalidWindow { .. })));
    }

    #[tokio::test]
    async fn test_fetch_requires_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let auth = AuthManager::new(test_config(&server.uri())).unwrap();
        let mut client = CalendarClient::new(auth).unwrap();
        let (start, end) = window("2026-09-01T00:00:00Z", "2026-09-30T23:59:59Z");
        let result = client.fetch_events_in_window(start, end).await;
        assert!(matches!(
            result,
            Err(CalendarError::Auth(AuthError::NotAuthenticated))
        ));
    }
}
