//! The response envelope and content-type negotiation.
//!
//! Every action answers with the same wire shape:
//!
//! ```text
//! { "RequestId": string?, "Error": {"Code": string, "Message": string}?, "Data": any? }
//! ```
//!
//! Each field is omitted when empty, so a successful call without payload
//! renders as `{}` and a decoded envelope tells "succeeded with no payload"
//! apart from "failed" by the presence of `Error`.

use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// The content types with precomputed header values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json,      // application/json
    JsonUtf8,  // application/json; charset=UTF-8
    Xml,       // application/xml
    XmlUtf8,   // application/xml; charset=UTF-8
    Form,      // application/x-www-form-urlencoded
    Multipart, // multipart/form-data
    Text,      // text/plain
}

impl ContentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json      => "application/json",
            Self::JsonUtf8  => "application/json; charset=UTF-8",
            Self::Xml       => "application/xml",
            Self::XmlUtf8   => "application/xml; charset=UTF-8",
            Self::Form      => "application/x-www-form-urlencoded",
            Self::Multipart => "multipart/form-data",
            Self::Text      => "text/plain",
        }
    }

    pub const fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }

    /// Matches the exact strings of the table above.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "application/json"                  => Some(Self::Json),
            "application/json; charset=UTF-8"   => Some(Self::JsonUtf8),
            "application/xml"                   => Some(Self::Xml),
            "application/xml; charset=UTF-8"    => Some(Self::XmlUtf8),
            "application/x-www-form-urlencoded" => Some(Self::Form),
            "multipart/form-data"               => Some(Self::Multipart),
            "text/plain"                        => Some(Self::Text),
            _                                   => None,
        }
    }
}

/// Sets `Content-Type` on `headers`. Known types hit the static table;
/// anything else is passed through. An empty `ct` does nothing.
pub(crate) fn set_content_type(headers: &mut HeaderMap, ct: &str) {
    if ct.is_empty() {
        return;
    }

    let value = match ContentType::parse(ct) {
        Some(known) => known.header_value(),
        None => match HeaderValue::from_str(ct) {
            Ok(v) => v,
            Err(e) => {
                warn!(content_type = ct, "ignoring invalid content type: {e}");
                return;
            }
        },
    };
    headers.insert(CONTENT_TYPE, value);
}

// ── Response ─────────────────────────────────────────────────────────────────

/// The response envelope.
///
/// `T` defaults to [`serde_json::Value`], which is what render hooks receive
/// and what clients decode into when the payload type is unknown.
///
/// ```rust
/// use action_svc::{Error, Response};
///
/// let ok: Response = serde_json::from_str(r#"{"Data":"test"}"#).unwrap();
/// assert!(ok.error.is_empty());
/// assert_eq!(ok.data, Some(serde_json::json!("test")));
///
/// let failed = Response::<()> {
///     request_id: "r-1".into(),
///     error: Error::INVALID_ACTION.with_message("no action"),
///     data: None,
/// };
/// assert_eq!(
///     serde_json::to_string(&failed).unwrap(),
///     r#"{"RequestId":"r-1","Error":{"Code":"InvalidAction","Message":"no action"}}"#,
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response<T = Value> {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Error::is_empty")]
    pub error: Error,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn success(request_id: impl Into<String>, data: T) -> Self {
        Self { request_id: request_id.into(), error: Error::default(), data: Some(data) }
    }

    pub fn failure(request_id: impl Into<String>, error: Error) -> Self {
        Self { request_id: request_id.into(), error, data: None }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}
