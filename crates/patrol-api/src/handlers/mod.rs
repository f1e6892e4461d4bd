//! HTTP API handlers. Every id crossing this boundary is an opaque token.

pub mod messages;
pub mod orders;
pub mod status;
pub mod users;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use patrol_core::codec::{EntityType, IdCodec};
use patrol_core::config::{MessagingSettings, StorageBackend};
use patrol_services::{
    DispatchError, Directory, Dispatcher, MessageRepository, Notifier, SendError, StoreError,
    Violation,
};

/// Returned whenever a path or body id fails to decode.
pub const INVALID_IDS_MESSAGE: &str = "Un ou plusieurs identifiants sont invalides";

#[derive(Clone)]
pub struct ApiState {
    pub codec: Arc<IdCodec>,
    pub directory: Arc<dyn Directory>,
    pub messages: Arc<dyn MessageRepository>,
    pub dispatcher: Dispatcher,
    pub settings: MessagingSettings,
    /// Storage backend in use, reported by `/status`.
    pub backend: StorageBackend,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        codec: Arc<IdCodec>,
        directory: Arc<dyn Directory>,
        messages: Arc<dyn MessageRepository>,
        notifier: Arc<dyn Notifier>,
        settings: MessagingSettings,
        backend: StorageBackend,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            codec.clone(),
            directory.clone(),
            messages.clone(),
            notifier,
            settings.clone(),
        );
        Self {
            codec,
            directory,
            messages,
            dispatcher,
            settings,
            backend,
            started_at: Instant::now(),
        }
    }

    /// Decode a token of the expected type or fail with 400.
    fn decode(&self, token: &str, entity: EntityType) -> Result<u64, ApiError> {
        self.codec
            .decode(token, entity)
            .map_err(|_| ApiError::BadRequest(INVALID_IDS_MESSAGE.to_string()))
    }

    fn encode(&self, entity: EntityType, id: u64) -> Result<String, ApiError> {
        self.codec.encode(entity, id).map_err(|e| {
            tracing::error!(%entity, error = %e, "failed to encode id");
            ApiError::Internal("failed to encode identifier".to_string())
        })
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        status: "success",
        data,
    }))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(Vec<Violation>),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unprocessable(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "status": "error", "violations": violations }),
            ),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, error_body(m)),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, error_body(m)),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, error_body(m)),
            Self::Conflict(m) => (StatusCode::CONFLICT, error_body(m)),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(m)),
        };
        (status, Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "status": "error", "message": message })
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Backend(m) => {
                tracing::error!(error = %m, "storage backend failure");
                Self::Internal("storage error".to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Malformed(v) => Self::Unprocessable(v),
            DispatchError::InvalidIdentifier { .. } => {
                Self::BadRequest(INVALID_IDS_MESSAGE.to_string())
            }
        }
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Malformed(v) => Self::Unprocessable(v),
            SendError::InvalidIdentifier { .. } => {
                Self::BadRequest(INVALID_IDS_MESSAGE.to_string())
            }
            SendError::Unauthorized => {
                Self::Forbidden("sender may not message this receiver on this order".to_string())
            }
            SendError::Storage(inner) => inner.into(),
        }
    }
}

/// Unwrap a JSON body or turn the rejection into a 422.
fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::Unprocessable(vec![Violation::new(
            "body",
            rejection.body_text(),
        )])),
    }
}

// Re-export handler functions for use in router setup.
pub use messages::{handle_order_messages, handle_send_message, handle_send_multi};
pub use orders::{
    handle_assign_agent, handle_create_order, handle_list_assignments, handle_remove_assignment,
    handle_set_order_status,
};
pub use status::handle_status;
pub use users::handle_create_user;
