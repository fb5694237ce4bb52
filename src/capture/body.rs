use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::BytesRejection, FromRequest, Request},
    http::{header::CONTENT_TYPE, HeaderMap},
};

/// A request body as the HTTP layer understood it.
///
/// The shape comes from what the bytes actually parse as, not only from the
/// declared content type: a `Content-Type: application/json` request whose body
/// is not valid JSON ends up as `Raw`.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureBody {
    Empty,
    Raw(Bytes),
    Text(String),
    Structured(serde_json::Value),
}

impl CaptureBody {
    pub fn classify(content_type: Option<&str>, bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }

        let media = content_type.map(media_type).unwrap_or_default();
        if is_json(&media) {
            // serde_json's recursion limit turns pathologically deep documents
            // into a parse error, which lands them in `Raw` below.
            if let Ok(value) = serde_json::from_slice(&bytes) {
                return Self::Structured(value);
            }
        }
        if is_textual(&media) {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                return Self::Text(text.to_owned());
            }
        }
        Self::Raw(bytes)
    }

    /// Canonical string form used for storage. Total over every input.
    ///
    /// Invalid UTF-8 in raw bodies is replaced with U+FFFD, so the stored text
    /// can lose information for binary payloads.
    pub fn normalize(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

fn is_textual(media: &str) -> bool {
    media.starts_with("text/") || media == "application/x-www-form-urlencoded"
}

pub(crate) fn declared_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

#[async_trait]
impl<S> FromRequest<S> for CaptureBody
where
    S: Send + Sync,
{
    type Rejection = BytesRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = declared_content_type(req.headers());
        let bytes = Bytes::from_request(req, state).await?;
        Ok(Self::classify(content_type.as_deref(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_body_is_empty_regardless_of_content_type() {
        let body = CaptureBody::classify(Some("application/json"), Bytes::new());
        assert_eq!(body, CaptureBody::Empty);
        assert_eq!(body.normalize(), "");
    }

    #[test]
    fn json_is_structured_and_compacted() {
        let body = CaptureBody::classify(
            Some("application/json; charset=utf-8"),
            Bytes::from_static(b"{ \"a\" : 1 }"),
        );
        assert_eq!(body, CaptureBody::Structured(json!({"a": 1})));

        let stored: serde_json::Value = serde_json::from_str(&body.normalize()).unwrap();
        assert_eq!(stored, json!({"a": 1}));
    }

    #[test]
    fn vendor_json_suffix_is_structured() {
        let body = CaptureBody::classify(
            Some("application/vnd.api+json"),
            Bytes::from_static(b"[1,2]"),
        );
        assert_eq!(body.normalize(), "[1,2]");
    }

    #[test]
    fn unparsable_json_falls_back_to_raw() {
        let body = CaptureBody::classify(
            Some("application/json"),
            Bytes::from_static(b"{not json"),
        );
        assert!(matches!(body, CaptureBody::Raw(_)));
        assert_eq!(body.normalize(), "{not json");
    }

    #[test]
    fn text_and_forms_are_kept_verbatim() {
        let text = CaptureBody::classify(Some("text/plain"), Bytes::from_static(b"hello"));
        assert_eq!(text, CaptureBody::Text("hello".to_owned()));

        let form = CaptureBody::classify(
            Some("application/x-www-form-urlencoded"),
            Bytes::from_static(b"a=1&b=%20"),
        );
        assert_eq!(form.normalize(), "a=1&b=%20");
    }

    #[test]
    fn binary_never_fails() {
        let body = CaptureBody::classify(
            Some("application/octet-stream"),
            Bytes::from_static(b"\x00\x01\xFF"),
        );
        assert_eq!(body.normalize(), "\u{0}\u{1}\u{FFFD}");

        let mislabelled = CaptureBody::classify(Some("text/plain"), Bytes::from_static(b"\xFF\xFE"));
        assert!(matches!(mislabelled, CaptureBody::Raw(_)));
        assert_eq!(mislabelled.normalize(), "\u{FFFD}\u{FFFD}");
    }

    #[test]
    fn deeply_nested_json_degrades_to_raw() {
        let depth = 10_000;
        let payload = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        let body = CaptureBody::classify(Some("application/json"), Bytes::from(payload.clone()));
        assert!(matches!(body, CaptureBody::Raw(_)));
        assert_eq!(body.normalize(), payload);
    }
}
