//! Turning an arbitrary inbound request into a storable record.

use std::net::SocketAddr;

use axum::http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};

use crate::domain::NewCapturedRequest;

mod body;

pub use body::CaptureBody;

/// Builds the record for one captured request. Never fails.
pub fn build_record(
    trap_id: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &CaptureBody,
    ip: String,
) -> NewCapturedRequest {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());

    NewCapturedRequest {
        trap_id: trap_id.to_owned(),
        method: method.as_str().to_owned(),
        path,
        headers: headers_to_json(headers).to_string(),
        body: body.normalize(),
        query: query_to_json(uri.query()).to_string(),
        ip,
        content_type: body::declared_content_type(headers).unwrap_or_default(),
    }
}

/// Header name to value, or to an array of values when the header repeats.
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        map.insert(name.as_str().to_owned(), value);
    }
    Value::Object(map)
}

/// Form-decoded query parameters; repeated keys collect into an array.
pub fn query_to_json(query: Option<&str>) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(&*key) {
            None => {
                map.insert(key.into_owned(), value);
            }
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}

/// Client address for a captured request.
///
/// With `trust_proxy` the left-most `X-Forwarded-For` entry wins; otherwise the
/// socket peer is used. Empty when neither is known.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_owned();
        }
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}
