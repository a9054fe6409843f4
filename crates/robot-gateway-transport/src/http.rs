//! JSON-over-HTTP routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use robot_gateway_core::{IdentityProvider, OperationLogStore, RobotTransport};
use robot_gateway_session::Gateway;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{AdminUser, AuthUser},
    error::ApiError,
    websocket,
};

/// Default number of entries returned by the logs route.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Gateway over runtime-selected collaborators.
pub type DynGateway = Gateway<Arc<dyn RobotTransport>, Arc<dyn OperationLogStore>>;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: DynGateway,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(gateway: DynGateway, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { gateway, identity }
    }
}

/// Build the full router: HTTP API plus the `/ws` live channel.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/robot/connect", post(connect))
        .route("/api/robot/terminate", post(terminate))
        .route("/api/robot/command", post(command))
        .route("/api/robot/status", get(status))
        .route("/api/robot/video", get(video))
        .route("/api/robot/session", get(session))
        .route("/api/robot/logs", get(logs))
        .route("/api/robot/logs/stream", get(log_stream))
        .route("/api/system/health", get(health))
        .route("/ws", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

async fn connect(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let address = body(payload)?
        .ip_address
        .ok_or_else(|| ApiError::BadRequest("IP address is required".into()))?;

    let session = state.gateway.connect(&address, &user.id).await?;
    Ok(Json(json!({
        "message": format!("Connected to robot at {}", session.robot_address),
        "session": session,
    })))
}

async fn terminate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, ApiError> {
    state.gateway.terminate(&user.id).await?;
    Ok(Json(json!({ "message": "Session terminated" })))
}

async fn command(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let text = body(payload)?
        .command
        .ok_or_else(|| ApiError::BadRequest("Command is required".into()))?;

    let kind = state.gateway.send(&text, &user.id).await?;
    Ok(Json(json!({ "message": format!("Command {kind} sent") })))
}

async fn status(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.gateway.get_snapshot().await?))
}

async fn video(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let frame = state.gateway.get_frame().await?;
    Ok(Json(json!({
        "frame": BASE64.encode(&frame.data),
        "capturedAt": frame.captured_at,
    })))
}

async fn session(State(state): State<AppState>, AuthUser(_): AuthUser) -> impl IntoResponse {
    Json(state.gateway.status())
}

async fn logs(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(state.gateway.query_logs(limit).await?))
}

async fn log_stream(State(state): State<AppState>, AdminUser(user): AdminUser) -> impl IntoResponse {
    tracing::debug!(user = %user.id, "Log stream opened");
    Sse::new(state.gateway.log_feed().sse_stream()).keep_alive(KeepAlive::default())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connected": state.gateway.status().is_connected(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use robot_gateway_core::{GatewayConfig, Role, StaticIdentity, User};
    use robot_gateway_driver::SimulatedRobot;
    use robot_gateway_session::storage::MemoryLogStore;
    use tower::ServiceExt;

    use super::*;

    const ADMIN: &str = "admin-token";
    const OPERATOR: &str = "operator-token";

    fn app_with(robot: Arc<SimulatedRobot>, config: GatewayConfig) -> Router {
        let transport: Arc<dyn RobotTransport> = robot;
        let store: Arc<dyn OperationLogStore> = Arc::new(MemoryLogStore::new());
        let identity = StaticIdentity::new()
            .with_token(ADMIN, User::new("root", Role::Admin))
            .with_token(OPERATOR, User::new("olivia", Role::Operator));
        router(AppState::new(
            Gateway::with_config(transport, store, config),
            Arc::new(identity),
        ))
    }

    fn app() -> (Router, Arc<SimulatedRobot>) {
        let robot = Arc::new(SimulatedRobot::new());
        (app_with(Arc::clone(&robot), GatewayConfig::default()), robot)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        payload: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match payload {
            Some(payload) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/api/system/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "connected": false}));
    }

    #[tokio::test]
    async fn test_rejects_missing_or_unknown_token() {
        let (app, _) = app();
        let (status, _) = call(&app, "GET", "/api/robot/status", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(&app, "GET", "/api/robot/session", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_session_flow() {
        let (app, robot) = app();
        let connect = json!({"ipAddress": "192.168.1.100"});

        let (status, body) =
            call(&app, "POST", "/api/robot/connect", Some(OPERATOR), Some(connect.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["robotAddress"], "192.168.1.100");

        let (status, body) =
            call(&app, "POST", "/api/robot/connect", Some(OPERATOR), Some(connect)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_connected");

        let (status, body) = call(
            &app,
            "POST",
            "/api/robot/command",
            Some(OPERATOR),
            Some(json!({"command": "forward"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Command forward sent");
        assert_eq!(robot.sent_commands().len(), 1);

        let (status, body) = call(&app, "GET", "/api/robot/status", Some(OPERATOR), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["speed"], 0.5);
        assert_eq!(body["mode"], "Manual");

        let (status, body) = call(&app, "GET", "/api/robot/video", Some(OPERATOR), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No video frame available");

        let (_, body) = call(&app, "GET", "/api/robot/session", Some(OPERATOR), None).await;
        assert_eq!(body["state"], "connected");

        let (status, _) = call(&app, "POST", "/api/robot/terminate", Some(OPERATOR), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            "/api/robot/command",
            Some(OPERATOR),
            Some(json!({"command": "stop"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "not_connected");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/api/robot/connect",
            Some(OPERATOR),
            Some(json!({"ipAddress": "300.1.1.1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_address");

        let (status, body) =
            call(&app, "POST", "/api/robot/connect", Some(OPERATOR), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "IP address is required");
        assert!(body.get("kind").is_none());

        call(
            &app,
            "POST",
            "/api/robot/connect",
            Some(OPERATOR),
            Some(json!({"ipAddress": "10.0.0.1"})),
        )
        .await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/robot/command",
            Some(OPERATOR),
            Some(json!({"command": "fly"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "unknown_command");

        let (status, _) =
            call(&app, "POST", "/api/robot/command", Some(OPERATOR), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_command_timeout_maps_to_504() {
        let robot = Arc::new(SimulatedRobot::new());
        let config = GatewayConfig {
            command_timeout: Duration::from_millis(20),
            ..GatewayConfig::default()
        };
        let app = app_with(Arc::clone(&robot), config);
        call(
            &app,
            "POST",
            "/api/robot/connect",
            Some(OPERATOR),
            Some(json!({"ipAddress": "10.0.0.1"})),
        )
        .await;
        robot.update_faults(|f| f.command_delay = Duration::from_millis(500));

        let (status, body) = call(
            &app,
            "POST",
            "/api/robot/command",
            Some(OPERATOR),
            Some(json!({"command": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "command_timeout");
    }

    #[tokio::test]
    async fn test_logs_are_admin_only() {
        let (app, _) = app();
        call(
            &app,
            "POST",
            "/api/robot/connect",
            Some(OPERATOR),
            Some(json!({"ipAddress": "10.0.0.1"})),
        )
        .await;
        call(&app, "POST", "/api/robot/terminate", Some(OPERATOR), None).await;

        let (status, _) = call(&app, "GET", "/api/robot/logs", Some(OPERATOR), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "GET", "/api/robot/logs/stream", Some(OPERATOR), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "GET", "/api/robot/logs", Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["operation"], "Session terminated");
        assert_eq!(body[0]["userId"], "olivia");
        assert_eq!(body[1]["operation"], "Session established: 10.0.0.1");

        let (_, body) = call(&app, "GET", "/api/robot/logs?limit=1", Some(ADMIN), None).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (status, _) = call(&app, "GET", "/api/robot/logs?limit=abc", Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_log_stream_is_event_stream() {
        let (app, _) = app();
        let request = Request::builder()
            .uri("/api/robot/logs/stream")
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
    }
}
