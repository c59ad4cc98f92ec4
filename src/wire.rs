//! Wire envelopes for the two API channels.
//!
//! [`RestRequest`] / [`RestResponse`] carry one request/response exchange on
//! the HTTP channel, including the continuation producer that drives
//! paginated fetches. [`StreamRequest`] / [`StreamMessage`] carry outgoing
//! frames and inbound frames on the streaming channel, correlated by request
//! id.
//!
//! Query strings built from a parameter map are produced as stable-sorted,
//! URL-encoded `k=v` pairs joined by `&` — several venues sign over exactly
//! this canonical form, so the bytes here must match the server side.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ExchangeError, Result};
use crate::time::TimePoint;

// ---------------------------------------------------------------------------
// URL and query composition
// ---------------------------------------------------------------------------

/// Serialize query parameters as stable-sorted, URL-encoded `k=v` pairs.
///
/// A [`BTreeMap`] keeps iteration order sorted by key; values are
/// form-urlencoded (space becomes `+`), matching the canonical form venue
/// signature schemes expect.
pub fn encode_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| {
            let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{k}={encoded}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Join a path and an optional query string with `?`.
pub fn path_with_query(path: &str, query_string: &str) -> String {
    if query_string.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{query_string}")
    }
}

/// Compose `base_url + path`.
pub fn compose_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

// ---------------------------------------------------------------------------
// REST request
// ---------------------------------------------------------------------------

/// A single HTTP request to a venue.
///
/// Built by adapter request builders, optionally signed, then executed by the
/// request pipeline.
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// Correlation id, unique per session.
    pub id: String,
    /// Scheme and authority, e.g. `https://www.okx.com`.
    pub base_url: String,
    /// HTTP method.
    pub method: reqwest::Method,
    /// Path component, e.g. `/api/v5/market/tickers`.
    pub path: String,
    /// Canonical query string (already encoded and sorted).
    pub query_string: String,
    /// Request headers. Signers insert credential headers here.
    pub headers: BTreeMap<String, String>,
    /// Raw request body, usually serialized JSON.
    pub payload: Option<String>,
    /// Structured form of `payload`, kept so response handlers can read back
    /// what was sent (order symbol, client id) without reparsing.
    pub json_payload: Option<Value>,
    /// Free-form tag the adapter can use to disambiguate requests sharing a
    /// path (e.g. recent vs archive pagination phase).
    pub tag: Option<String>,
}

impl RestRequest {
    /// Create a request with an empty query and no body.
    pub fn new(id: String, base_url: &str, method: reqwest::Method, path: &str) -> Self {
        Self {
            id,
            base_url: base_url.to_owned(),
            method,
            path: path.to_owned(),
            query_string: String::new(),
            headers: BTreeMap::new(),
            payload: None,
            json_payload: None,
            tag: None,
        }
    }

    /// Set the query string from a parameter map (stable-sorted, encoded).
    pub fn with_query_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.query_string = encode_query(&params);
        self
    }

    /// Set a pre-encoded query string verbatim.
    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    /// Set a JSON body, keeping both raw and structured forms.
    pub fn with_json_payload(mut self, payload: Value) -> Result<Self> {
        self.payload = Some(serde_json::to_string(&payload)?);
        self.json_payload = Some(payload);
        Ok(self)
    }

    /// Tag the request.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Path plus query string, the form most signature schemes cover.
    pub fn path_with_query_string(&self) -> String {
        path_with_query(&self.path, &self.query_string)
    }

    /// The full URL including query string.
    pub fn url(&self) -> String {
        compose_url(&self.base_url, &self.path_with_query_string())
    }

    /// Look up a query parameter by key from the encoded query string.
    pub fn query_param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query_string.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Produces the next request of a chain at send time, signing against the
/// supplied time point. Consumed once per pipeline iteration.
pub type RequestProducer = Box<dyn FnOnce(TimePoint) -> Result<RestRequest> + Send>;

/// A continuation returned by a paginated response handler: the next request
/// of the chain plus the inter-request delay that keeps the session under the
/// venue's rate limits.
pub struct Continuation {
    /// Producer for the next request.
    pub producer: RequestProducer,
    /// Delay before issuing it.
    pub delay: std::time::Duration,
}

// ---------------------------------------------------------------------------
// REST response
// ---------------------------------------------------------------------------

/// A venue's HTTP response, paired with the request that produced it.
pub struct RestResponse {
    /// HTTP status code.
    pub status: reqwest::StatusCode,
    /// Raw response body.
    pub payload: String,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Body parsed as JSON when the content type is JSON.
    pub json_payload: Option<Value>,
    /// The originating request.
    pub request: RestRequest,
}

impl RestResponse {
    /// Assemble a response, deserializing the body when `content_type`
    /// indicates JSON. A malformed JSON body is an error (the caller logs and
    /// drops it without tearing anything down).
    pub fn assemble(
        status: reqwest::StatusCode,
        payload: String,
        headers: BTreeMap<String, String>,
        request: RestRequest,
    ) -> Result<Self> {
        let is_json = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.starts_with("application/json"));
        let json_payload = if is_json && !payload.is_empty() {
            Some(serde_json::from_str(&payload).map_err(ExchangeError::Json)?)
        } else {
            None
        };
        Ok(Self {
            status,
            payload,
            headers,
            json_payload,
            request,
        })
    }
}

impl std::fmt::Debug for RestResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestResponse")
            .field("status", &self.status)
            .field("payload", &self.payload)
            .field("request", &self.request.path_with_query_string())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stream request
// ---------------------------------------------------------------------------

/// An outgoing frame on the streaming channel.
///
/// Frames carrying an `id` (order operations) are remembered until a
/// correlated response arrives; fire-and-forget frames (subscribe, ping) may
/// reuse the id slot for logging only.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Correlation id, unique per session.
    pub id: String,
    /// Raw text payload to send.
    pub payload: String,
    /// Structured form of `payload` when it was built from JSON.
    pub json_payload: Option<Value>,
    /// Free-form tag for the adapter.
    pub tag: Option<String>,
}

impl StreamRequest {
    /// A frame with a raw text payload (e.g. a bare `ping`).
    pub fn from_text(id: String, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
            json_payload: None,
            tag: None,
        }
    }

    /// A frame with a JSON payload.
    pub fn from_json(id: String, payload: Value) -> Result<Self> {
        Ok(Self {
            id,
            payload: serde_json::to_string(&payload)?,
            json_payload: Some(payload),
            tag: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Stream message
// ---------------------------------------------------------------------------

/// The small discriminator the adapter extracts from an inbound frame.
///
/// The core dispatches on this summary alone: a frame with no request id is a
/// push; otherwise it answers an outgoing request and is classified as
/// success or error.
#[derive(Debug, Clone, Default)]
pub struct PayloadSummary {
    /// Event name (`subscribe`, `login`, `error`, ...).
    pub event: Option<String>,
    /// Operation name echoed from a request (`order`, `cancel-order`, ...).
    pub op: Option<String>,
    /// Channel the push belongs to (`bbo-tbt`, `trades`, ...).
    pub channel: Option<String>,
    /// Venue status code, `"0"` meaning success on most venues.
    pub code: Option<String>,
}

/// An inbound frame on the streaming channel, after JSON deserialization and
/// summary extraction.
#[derive(Debug)]
pub struct StreamMessage {
    /// Registry key of the connection that received the frame.
    pub connection_key: String,
    /// Raw text payload.
    pub payload: String,
    /// Body parsed as JSON.
    pub json_payload: Value,
    /// Adapter-extracted classification summary.
    pub summary: PayloadSummary,
    /// Correlation id of the outgoing request this frame answers, if any.
    pub request_id: Option<String>,
    /// The outgoing request itself, claimed from the in-flight map.
    pub request: Option<StreamRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encodes_query_sorted_by_key() {
        let q = encode_query(&params(&[("symbol", "BTC-USDT"), ("after", "123"), ("limit", "100")]));
        assert_eq!(q, "after=123&limit=100&symbol=BTC-USDT");
    }

    #[test]
    fn url_encodes_values() {
        let q = encode_query(&params(&[("note", "a b&c")]));
        assert_eq!(q, "note=a+b%26c");
    }

    #[test]
    fn composes_path_and_url() {
        let req = RestRequest::new(
            "1".into(),
            "https://api.example.com",
            reqwest::Method::GET,
            "/v1/tickers",
        )
        .with_query_params(params(&[("instId", "BTC-USDT")]));
        assert_eq!(req.path_with_query_string(), "/v1/tickers?instId=BTC-USDT");
        assert_eq!(req.url(), "https://api.example.com/v1/tickers?instId=BTC-USDT");
        assert_eq!(req.query_param("instId").as_deref(), Some("BTC-USDT"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn assembles_json_response_when_content_type_matches() {
        let req = RestRequest::new("1".into(), "https://x", reqwest::Method::GET, "/p");
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".into(), "application/json; charset=utf-8".into());
        let resp = RestResponse::assemble(
            reqwest::StatusCode::OK,
            r#"{"code":"0"}"#.into(),
            headers,
            req,
        )
        .unwrap();
        assert_eq!(resp.json_payload.unwrap()["code"], "0");
    }

    #[test]
    fn leaves_non_json_bodies_raw() {
        let req = RestRequest::new("1".into(), "https://x", reqwest::Method::GET, "/p");
        let resp = RestResponse::assemble(
            reqwest::StatusCode::OK,
            "pong".into(),
            BTreeMap::new(),
            req,
        )
        .unwrap();
        assert!(resp.json_payload.is_none());
        assert_eq!(resp.payload, "pong");
    }

    #[test]
    fn json_round_trip_is_lossless_for_string_fields() {
        let value = serde_json::json!({"px": "50000.10", "sz": "0.001"});
        let req = StreamRequest::from_json("7".into(), value.clone()).unwrap();
        let back: Value = serde_json::from_str(&req.payload).unwrap();
        assert_eq!(back, value);
        assert_eq!(back["px"], "50000.10");
    }
}
