//! Request signing
//!
//! Every private API call must carry `X-S`, `X-T`, `X-S-Common` and
//! `X-B3-Traceid` headers. Most of the pipeline is deterministic and lives
//! here; the one opaque step (`mnsv2`) runs inside the live page and is
//! reached through the [`SigningOracle`] trait.
//!
//! Pipeline for one request:
//!
//! 1. string-to-sign: `uri` + compact JSON body (POST) or `uri?k=v&..` (GET)
//! 2. `md5_hex(string-to-sign)`
//! 3. `x3 = oracle.mnsv2(string-to-sign, digest)`
//! 4. `X-S = "XYS_" + b64({x0, x1, x2, x3, x4})`
//! 5. `X-S-Common = b64({.., a1, xt, xs, b1, mrc(xt + xs + b1), ..})`

pub mod encoding;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use encoding::{b64_decode, b64_encode, md5_hex, mrc, trace_id};

/// Prefix of the `X-S` header value
pub const XS_PREFIX: &str = "XYS_";

const XS_CLIENT_VERSION: &str = "4.2.1";
const XS_PLATFORM: &str = "xhs-pc-web";
const XS_OS: &str = "Mac OS";

const COMMON_SDK_VERSION: &str = "4.2.2";
const COMMON_WEB_VERSION: &str = "4.74.0";
const COMMON_FINGERPRINT_VERSION: u32 = 154;

/// Errors produced while signing a request
#[derive(Error, Debug)]
pub enum SignError {
    /// The browser-held signing primitive failed or returned garbage
    #[error("signing oracle failed: {0}")]
    Oracle(String),

    /// The session has no `a1` cookie yet
    #[error("session has no a1 cookie")]
    MissingA1,

    /// Payload serialization failed
    #[error("failed to encode signing payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Session fingerprint needed to sign requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignContext {
    /// `a1` session cookie
    pub a1: String,

    /// `b1` device token from the page's local storage
    pub b1: String,
}

impl SignContext {
    pub fn new(a1: impl Into<String>, b1: impl Into<String>) -> Self {
        Self {
            a1: a1.into(),
            b1: b1.into(),
        }
    }
}

/// The header bundle attached to one signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// `X-S`
    pub xs: String,

    /// `X-T`, unix milliseconds as a decimal string
    pub xt: String,

    /// `X-S-Common`
    pub xs_common: String,

    /// `X-B3-Traceid`
    pub trace_id: String,
}

/// Request data as it participates in the string-to-sign
#[derive(Debug, Clone, PartialEq)]
pub enum RequestData {
    /// No body or query
    Empty,
    /// JSON body of a POST, keys kept in insertion order
    Json(Value),
    /// Ordered query parameters of a GET
    Query(QueryParams),
    /// A bare string payload
    Text(String),
}

impl RequestData {
    /// `x4` tag of the `X-S` payload
    fn data_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            _ => "object",
        }
    }
}

/// Ordered GET parameters
///
/// Order is part of the signed bytes, so parameters are kept exactly as
/// pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    /// Append a list parameter, joined with `,`
    #[must_use]
    pub fn with_list<S: AsRef<str>>(self, key: impl Into<String>, values: &[S]) -> Self {
        let joined = values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self.with(key, joined)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `k=v&k2=v2` with every value percent-escaped (space becomes `%20`)
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Build the exact bytes that get digested and handed to the oracle
///
/// GET requests are also sent with this very query string, so what is signed
/// is what goes over the wire.
pub fn build_sign_string(uri: &str, data: &RequestData) -> Result<String, SignError> {
    Ok(match data {
        RequestData::Empty => uri.to_string(),
        RequestData::Json(body) => format!("{uri}{}", serde_json::to_string(body)?),
        RequestData::Query(params) if params.is_empty() => uri.to_string(),
        RequestData::Query(params) => format!("{uri}?{}", params.to_query_string()),
        RequestData::Text(text) => format!("{uri}{text}"),
    })
}

#[derive(Serialize)]
struct XsPayload<'a> {
    x0: &'a str,
    x1: &'a str,
    x2: &'a str,
    x3: &'a str,
    x4: &'a str,
}

#[derive(Serialize)]
struct XsCommonPayload<'a> {
    s0: u8,
    s1: &'a str,
    x0: &'a str,
    x1: &'a str,
    x2: &'a str,
    x3: &'a str,
    x4: &'a str,
    x5: &'a str,
    x6: &'a str,
    x7: &'a str,
    x8: &'a str,
    x9: i32,
    x10: u32,
    x11: &'a str,
}

/// `X-S` value for an oracle token
pub fn build_xs(x3: &str, data: &RequestData) -> Result<String, SignError> {
    let payload = XsPayload {
        x0: XS_CLIENT_VERSION,
        x1: XS_PLATFORM,
        x2: XS_OS,
        x3,
        x4: data.data_type(),
    };
    Ok(format!(
        "{XS_PREFIX}{}",
        b64_encode(serde_json::to_vec(&payload)?)
    ))
}

/// `X-S-Common` value tying the signature to the session fingerprint
pub fn build_xs_common(ctx: &SignContext, xs: &str, xt: &str) -> Result<String, SignError> {
    let checksum_input = format!("{xt}{xs}{}", ctx.b1);
    let payload = XsCommonPayload {
        s0: 3,
        s1: "",
        x0: "1",
        x1: COMMON_SDK_VERSION,
        x2: XS_OS,
        x3: XS_PLATFORM,
        x4: COMMON_WEB_VERSION,
        x5: &ctx.a1,
        x6: xt,
        x7: xs,
        x8: &ctx.b1,
        x9: mrc(&checksum_input),
        x10: COMMON_FINGERPRINT_VERSION,
        x11: "normal",
    };
    Ok(b64_encode(serde_json::to_vec(&payload)?))
}

/// The opaque signing primitive held by the live page
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Evaluate `mnsv2(sign_str, digest)` and return the `x3` token
    async fn mnsv2(&self, sign_str: &str, digest: &str) -> Result<String, SignError>;
}

/// Turns request data plus session fingerprint into [`SignatureHeaders`]
#[derive(Clone)]
pub struct Signer {
    oracle: Arc<dyn SigningOracle>,
}

impl Signer {
    pub fn new(oracle: Arc<dyn SigningOracle>) -> Self {
        Self { oracle }
    }

    /// Sign one request
    ///
    /// `xt` is taken fresh on every call. Oracle failures surface as
    /// [`SignError::Oracle`] and are never retried here.
    pub async fn sign(
        &self,
        uri: &str,
        data: &RequestData,
        ctx: &SignContext,
    ) -> Result<SignatureHeaders, SignError> {
        if ctx.a1.is_empty() {
            return Err(SignError::MissingA1);
        }

        let sign_str = build_sign_string(uri, data)?;
        let digest = md5_hex(&sign_str);
        let x3 = self.oracle.mnsv2(&sign_str, &digest).await?;
        if x3.is_empty() {
            return Err(SignError::Oracle("empty mnsv2 result".into()));
        }

        let xs = build_xs(&x3, data)?;
        let xt = crate::utils::unix_millis().to_string();
        let xs_common = build_xs_common(ctx, &xs, &xt)?;

        tracing::trace!(uri, digest = %digest, xt = %xt, "Signed request");

        Ok(SignatureHeaders {
            xs,
            xt,
            xs_common,
            trace_id: trace_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records its inputs and answers with a fixed token
    struct RecordingOracle {
        calls: Mutex<Vec<(String, String)>>,
        answer: Result<String, String>,
    }

    impl RecordingOracle {
        fn answering(token: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Ok(token.to_string()),
            }
        }

        fn failing(msg: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer: Err(msg.to_string()),
            }
        }
    }

    #[async_trait]
    impl SigningOracle for RecordingOracle {
        async fn mnsv2(&self, sign_str: &str, digest: &str) -> Result<String, SignError> {
            self.calls
                .lock()
                .unwrap()
                .push((sign_str.to_string(), digest.to_string()));
            self.answer.clone().map_err(SignError::Oracle)
        }
    }

    fn decode_json(encoded: &str) -> Value {
        serde_json::from_slice(&b64_decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_sign_string_post_keeps_key_order() {
        let body = json!({"keyword": "咖啡", "page": 1, "page_size": 20, "a": true});
        let s = build_sign_string("/api/sns/web/v1/search/notes", &RequestData::Json(body)).unwrap();
        assert_eq!(
            s,
            r#"/api/sns/web/v1/search/notes{"keyword":"咖啡","page":1,"page_size":20,"a":true}"#
        );
    }

    #[test]
    fn test_sign_string_get_empty() {
        let uri = "/api/sns/web/v2/user/me";
        assert_eq!(build_sign_string(uri, &RequestData::Empty).unwrap(), uri);
        assert_eq!(
            build_sign_string(uri, &RequestData::Query(QueryParams::new())).unwrap(),
            uri
        );
    }

    #[test]
    fn test_sign_string_get_escapes_values() {
        let params = QueryParams::new()
            .with("note_id", "abc")
            .with("cursor", "")
            .with("q", "a b&c")
            .with_list("image_formats", &["jpg", "webp", "avif"]);
        let s = build_sign_string("/api/x", &RequestData::Query(params)).unwrap();
        assert_eq!(
            s,
            "/api/x?note_id=abc&cursor=&q=a%20b%26c&image_formats=jpg%2Cwebp%2Cavif"
        );
    }

    #[test]
    fn test_xs_payload_round_trips() {
        let xs = build_xs("token-x3", &RequestData::Json(json!({}))).unwrap();
        let encoded = xs.strip_prefix(XS_PREFIX).unwrap();
        let bytes = b64_decode(encoded).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"x0":"4.2.1","x1":"xhs-pc-web","x2":"Mac OS","x3":"token-x3","x4":"object"}"#
        );

        let xs = build_xs("t", &RequestData::Text("raw".into())).unwrap();
        assert_eq!(decode_json(xs.strip_prefix(XS_PREFIX).unwrap())["x4"], "string");
    }

    #[test]
    fn test_xs_common_payload() {
        let ctx = SignContext::new("a1value", "b1token");
        let common = build_xs_common(&ctx, "XYS_abc", "1700000000000").unwrap();
        let decoded = decode_json(&common);

        assert_eq!(decoded["x5"], "a1value");
        assert_eq!(decoded["x6"], "1700000000000");
        assert_eq!(decoded["x7"], "XYS_abc");
        assert_eq!(decoded["x8"], "b1token");
        assert_eq!(decoded["x9"], mrc("1700000000000XYS_abcb1token"));
        assert_eq!(decoded["x9"], -877_346_814);
        assert_eq!(decoded["x10"], 154);

        let keys: Vec<&str> = decoded.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["s0", "s1", "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11"]
        );
    }

    #[tokio::test]
    async fn test_signer_passes_digest_to_oracle() {
        let oracle = Arc::new(RecordingOracle::answering("x3token"));
        let signer = Signer::new(oracle.clone());
        let ctx = SignContext::new("a1", "b1");

        let headers = signer
            .sign("/api/sns/web/v1/search/notes", &RequestData::Empty, &ctx)
            .await
            .unwrap();

        let calls = oracle.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/api/sns/web/v1/search/notes");
        assert_eq!(calls[0].1, "1e43292f7c85526956ef6850037ad3f5");

        assert!(headers.xs.starts_with(XS_PREFIX));
        assert!(headers.xt.parse::<i64>().is_ok());
        assert_eq!(headers.trace_id.len(), 16);

        let common = decode_json(&headers.xs_common);
        assert_eq!(common["x6"], headers.xt.as_str());
        assert_eq!(common["x7"], headers.xs.as_str());
    }

    #[tokio::test]
    async fn test_signer_surfaces_oracle_failure() {
        let signer = Signer::new(Arc::new(RecordingOracle::failing("mnsv2 is not a function")));
        let err = signer
            .sign("/api/x", &RequestData::Empty, &SignContext::new("a1", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::Oracle(msg) if msg.contains("mnsv2")));
    }

    #[tokio::test]
    async fn test_signer_requires_a1() {
        let oracle = Arc::new(RecordingOracle::answering("x3"));
        let signer = Signer::new(oracle.clone());
        let err = signer
            .sign("/api/x", &RequestData::Empty, &SignContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::MissingA1));
        assert!(oracle.calls.lock().unwrap().is_empty());
    }
}
