use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ApiConfig;
use crate::errors::{AuthError, CalendarError};
use crate::graph_client::CalendarClient;
use crate::models::{Account, CalendarEvent};

#[derive(Serialize)]
struct StatusResponse {
    authenticated: bool,
    user: Option<Account>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    auth_url: String,
}

#[derive(Serialize)]
struct SignOutResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct EventsResponse {
    success: bool,
    count: usize,
    events: Vec<CalendarEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<Account>,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str) -> Self {
        ErrorResponse {
            success: false,
            error: error.to_string(),
            message: None,
            details: None,
        }
    }

    fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            message: Some(message.to_string()),
            ..ErrorResponse::new(error)
        }
    }
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

#[derive(Deserialize)]
struct EventsQuery {
    days: Option<i64>,
}

type SharedClient = web::Data<Arc<Mutex<CalendarClient>>>;

// GET /auth/status
async fn auth_status(data: SharedClient) -> HttpResponse {
    let client = data.lock().await;
    let auth = client.auth_manager();

    HttpResponse::Ok().json(StatusResponse {
        authenticated: auth.is_authenticated(),
        user: auth.current_user().cloned(),
    })
}

// GET /auth/signin
async fn auth_signin(data: SharedClient) -> HttpResponse {
    let client = data.lock().await;

    match client.auth_manager().begin_authorization() {
        Ok(auth_url) => HttpResponse::Ok().json(SignInResponse { auth_url }),
        Err(e) => {
            tracing::error!("Error generating auth URL: {}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "Failed to initiate sign-in" }))
        }
    }
}

// GET /oauth/callback?code=...
async fn oauth_callback(
    data: SharedClient,
    api_config: web::Data<ApiConfig>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return HttpResponse::BadRequest()
            .content_type("text/html; charset=utf-8")
            .body(failure_page("No authorization code provided"));
    };

    let mut client = data.lock().await;
    match client.auth_manager_mut().complete_authorization(code).await {
        Ok(state) => {
            let name = if state.account.name.is_empty() {
                "User".to_string()
            } else {
                state.account.name.clone()
            };
            HttpResponse::Ok()
                .content_type("text/html; charset=utf-8")
                .body(success_page(&name, &api_config.frontend_url))
        }
        Err(e) => {
            tracing::error!("Error in OAuth callback: {}", e);
            HttpResponse::InternalServerError()
                .content_type("text/html; charset=utf-8")
                .body(failure_page(&e.to_string()))
        }
    }
}

// POST /auth/signout
async fn auth_signout(data: SharedClient) -> HttpResponse {
    let mut client = data.lock().await;
    client.auth_manager_mut().sign_out();

    HttpResponse::Ok().json(SignOutResponse {
        success: true,
        message: "Signed out successfully".to_string(),
    })
}

// GET /events?days=N
async fn get_events(data: SharedClient, query: web::Query<EventsQuery>) -> HttpResponse {
    let mut client = data.lock().await;
    if !client.auth_manager().is_authenticated() {
        return not_authenticated_response();
    }

    let days = query.days.unwrap_or(30);
    match client.fetch_events_ahead(days).await {
        Ok(events) => {
            let user = client.auth_manager().current_user().cloned();
            HttpResponse::Ok().json(EventsResponse {
                success: true,
                count: events.len(),
                events,
                user,
            })
        }
        Err(e) => calendar_error_response(e),
    }
}

// GET /events/{start_date}/{end_date}
async fn get_events_range(data: SharedClient, path: web::Path<(String, String)>) -> HttpResponse {
    let mut client = data.lock().await;
    if !client.auth_manager().is_authenticated() {
        return not_authenticated_response();
    }

    let (start_raw, end_raw) = path.into_inner();
    let (Some(start), Some(end)) = (parse_window_date(&start_raw), parse_window_date(&end_raw))
    else {
        return HttpResponse::BadRequest().json(ErrorResponse::new(
            "Invalid date format. Use ISO format (YYYY-MM-DD)",
        ));
    };

    match client.fetch_events_in_window(start, end).await {
        Ok(events) => HttpResponse::Ok().json(EventsResponse {
            success: true,
            count: events.len(),
            events,
            user: None,
        }),
        Err(e) => calendar_error_response(e),
    }
}

fn not_authenticated_response() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::with_message(
        "Not authenticated",
        "Please sign in to access calendar events",
    ))
}

/// Map fetch failures onto the three user-visible categories: never signed
/// in, was signed in but the session is gone, and transient upstream trouble
fn calendar_error_response(error: CalendarError) -> HttpResponse {
    tracing::error!("Error fetching calendar events: {}", error);
    match error {
        CalendarError::Auth(AuthError::NotAuthenticated) => not_authenticated_response(),
        CalendarError::AuthenticationExpired
        | CalendarError::Auth(AuthError::RefreshFailed { .. })
        | CalendarError::Auth(AuthError::NoRefreshToken) => {
            HttpResponse::Unauthorized().json(ErrorResponse::with_message(
                "Authentication expired",
                "Please sign in again",
            ))
        }
        CalendarError::InvalidWindow { .. } => HttpResponse::BadRequest().json(
            ErrorResponse::new("Invalid date range: start must not be after end"),
        ),
        CalendarError::InvalidHorizon { .. } => HttpResponse::BadRequest().json(
            ErrorResponse::new("Invalid days parameter"),
        ),
        other => {
            let mut body = ErrorResponse::new("Failed to fetch calendar events");
            body.details = Some(other.to_string());
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// Accept plain dates (midnight UTC) or full RFC 3339 timestamps
fn parse_window_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn success_page(name: &str, frontend_url: &str) -> String {
    format!(
        r#"<html>
  <head>
    <style>
      body {{ font-family: sans-serif; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; }}
      .container {{ text-align: center; }}
      h1 {{ color: #667eea; }}
      .success {{ color: #10b981; font-size: 48px; }}
    </style>
    <script>
      setTimeout(() => {{
        window.close();
        window.location.href = '{frontend_url}';
      }}, 2000);
    </script>
  </head>
  <body>
    <div class="container">
      <div class="success">&#10003;</div>
      <h1>Sign-in Successful!</h1>
      <p>Welcome, {name}!</p>
      <p>Redirecting to calendar...</p>
    </div>
  </body>
</html>"#
    )
}

fn failure_page(message: &str) -> String {
    format!(
        r#"<html>
  <head>
    <style>
      body {{ font-family: sans-serif; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; }}
      .container {{ text-align: center; }}
      h1 {{ color: #ef4444; }}
    </style>
  </head>
  <body>
    <div class="container">
      <h1>Sign-in Failed</h1>
      <p>{message}</p>
    </div>
  </body>
</html>"#
    )
}

/// Route table, exposed separately so tests can mount it with
/// `actix_web::test`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/status", web::get().to(auth_status))
        .route("/auth/signin", web::get().to(auth_signin))
        .route("/oauth/callback", web::get().to(oauth_callback))
        .route("/auth/signout", web::post().to(auth_signout))
        .route("/events", web::get().to(get_events))
        .route(
            "/events/{start_date}/{end_date}",
            web::get().to(get_events_range),
        );
}

pub struct ApiServer {
    client: Arc<Mutex<CalendarClient>>,
    config: ApiConfig,
}

impl ApiServer {
    pub fn new(client: CalendarClient, config: ApiConfig) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            config,
        }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let client = self.client.clone();
        let config = self.config.clone();
        let port = self.config.port;
        tracing::info!("Calendar bridge listening on 127.0.0.1:{}", port);

        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();

            App::new()
                .app_data(web::Data::new(client.clone()))
                .app_data(web::Data::new(config.clone()))
                .wrap(cors)
                .wrap(Logger::default())
                .configure(configure_routes)
        })
        .bind(("127.0.0.1", port))?
        .run()
        .await
    }
}
