use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_TRAP_NAME_CHARS: usize = 100;
pub const CAUGHT_MESSAGE: &str = "Request caught! 🦞";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trap {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Trap {
    /// Display name for a new trap: truncated to `MAX_TRAP_NAME_CHARS`, or
    /// `Trap {id}` when nothing usable was supplied.
    pub fn display_name(id: &str, requested: Option<&str>) -> String {
        let trimmed: String = requested
            .unwrap_or_default()
            .chars()
            .take(MAX_TRAP_NAME_CHARS)
            .collect();
        if trimmed.is_empty() {
            format!("Trap {id}")
        } else {
            trimmed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CapturedRequest {
    pub id: i64,
    pub trap_id: String,
    pub method: String,
    pub path: String,
    pub headers: String,
    pub body: String,
    pub query: String,
    pub ip: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapturedRequest {
    pub trap_id: String,
    pub method: String,
    pub path: String,
    pub headers: String,
    pub body: String,
    pub query: String,
    pub ip: String,
    pub content_type: String,
}

/// API view of a captured request with the header and query blobs expanded.
#[derive(Debug, Serialize)]
pub struct CapturedRequestView {
    pub id: i64,
    pub trap_id: String,
    pub method: String,
    pub path: String,
    pub headers: serde_json::Value,
    pub body: String,
    pub query: serde_json::Value,
    pub ip: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<CapturedRequest> for CapturedRequestView {
    fn from(request: CapturedRequest) -> Self {
        Self {
            headers: parse_blob(&request.headers),
            query: parse_blob(&request.query),
            id: request.id,
            trap_id: request.trap_id,
            method: request.method,
            path: request.path,
            body: request.body,
            ip: request.ip,
            content_type: request.content_type,
            created_at: request.created_at,
        }
    }
}

fn parse_blob(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
}

#[derive(Debug, Serialize)]
pub struct TrapRequestsResponse {
    pub trap: Trap,
    pub requests: Vec<CapturedRequestView>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub message: &'static str,
    pub trap_id: String,
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTrapRequest {
    #[serde(default)]
    pub name: Option<String>,
}
