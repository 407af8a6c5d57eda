use crate::config::{DeliveryConfig, PayloadFormat};
use crate::error::{RelayError, Result};
use crate::types::FileRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Value of the `source` field in envelope payloads.
pub const SOURCE: &str = "file-processor";

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub filename: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRequest {
    pub fn new(record: &FileRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            content: record.content.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn payload(&self, format: PayloadFormat) -> Value {
        match format {
            PayloadFormat::Envelope => json!({
                "filename": self.filename,
                "content": self.content,
                "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                "source": SOURCE,
            }),
            PayloadFormat::Hl7v2 => json!({
                "resourceType": "Hl7v2Message",
                "src": self.content.trim(),
                "status": "received",
                "config": {
                    "resourceType": "Hl7v2Config",
                    "id": "default",
                },
            }),
        }
    }
}

/// What came back from the downstream, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub http_status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_success: Option<bool>,
}

impl DeliveryResponse {
    pub fn status(http_status_code: u16) -> Self {
        Self {
            http_status_code,
            id: None,
            processing_success: None,
        }
    }

    /// Build a response from a JSON body the downstream returned.
    ///
    /// `processing_success` comes from a boolean field of that name when
    /// present, otherwise from the resource `status` field.
    pub fn from_body(http_status_code: u16, body: &Value) -> Self {
        let id = match body.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let processing_success = body
            .get("processing_success")
            .and_then(Value::as_bool)
            .or_else(|| match body.get("status").and_then(Value::as_str) {
                Some("processed") | Some("success") => Some(true),
                Some("error") => Some(false),
                _ => None,
            });
        Self {
            http_status_code,
            id,
            processing_success,
        }
    }
}

// ---------------------------------------------------------------------------
// SendError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Connection refused, timeout, reset: nothing confirms the payload arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Anything else that went wrong during the send call.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type SendResult = std::result::Result<DeliveryResponse, SendError>;

// ---------------------------------------------------------------------------
// DeliveryClient
// ---------------------------------------------------------------------------

pub trait DeliveryClient {
    fn send(&mut self, request: &DeliveryRequest) -> SendResult;
}

impl<C: DeliveryClient + ?Sized> DeliveryClient for Box<C> {
    fn send(&mut self, request: &DeliveryRequest) -> SendResult {
        (**self).send(request)
    }
}

// ---------------------------------------------------------------------------
// HttpDeliveryClient
// ---------------------------------------------------------------------------

/// Blocking JSON-over-HTTP client.
///
/// Performs exactly one POST per `send`; retries belong to the engine.
pub struct HttpDeliveryClient {
    http: reqwest::blocking::Client,
    url: String,
    auth: Option<(String, String)>,
    format: PayloadFormat,
}

impl HttpDeliveryClient {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("filerelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::HttpClient(e.to_string()))?;
        let auth = config
            .basic_auth()
            .map(|(u, p)| (u.to_string(), p.to_string()));
        if let Some((user, _)) = &auth {
            tracing::info!(user = %user, "using basic authentication");
        }
        Ok(Self {
            http,
            url: config.url(),
            auth,
            format: config.payload_format,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DeliveryClient for HttpDeliveryClient {
    fn send(&mut self, request: &DeliveryRequest) -> SendResult {
        tracing::debug!(filename = %request.filename, url = %self.url, "posting payload");

        let mut req = self
            .http
            .post(&self.url)
            .json(&request.payload(self.format));
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = req.send().map_err(send_error)?;
        let status = resp.status().as_u16();

        if !matches!(status, 200 | 201) {
            let body = resp.text().unwrap_or_default();
            tracing::debug!(
                filename = %request.filename,
                http_status = status,
                body = %truncate(&body, 512),
                "downstream rejected request"
            );
            return Ok(DeliveryResponse::status(status));
        }

        let body = resp.text().map_err(send_error)?;
        if body.trim().is_empty() {
            return Ok(DeliveryResponse::status(status));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SendError::Unexpected(format!("invalid JSON response: {e}")))?;
        Ok(DeliveryResponse::from_body(status, &value))
    }
}

fn send_error(e: reqwest::Error) -> SendError {
    if e.is_builder() || e.is_decode() {
        SendError::Unexpected(e.to_string())
    } else {
        SendError::Transport(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn request(name: &str, content: &str) -> DeliveryRequest {
        DeliveryRequest {
            filename: name.to_string(),
            content: content.to_string(),
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn config(base_url: String) -> DeliveryConfig {
        DeliveryConfig {
            base_url,
            ..Default::default()
        }
    }

    #[test]
    fn envelope_payload_shape() {
        let payload = request("a.txt", "MSH|^~\\&|\n").payload(PayloadFormat::Envelope);
        assert_eq!(payload["filename"], "a.txt");
        assert_eq!(payload["content"], "MSH|^~\\&|\n");
        assert_eq!(payload["source"], "file-processor");
        assert_eq!(payload["timestamp"], "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn hl7v2_payload_trims_content() {
        let payload = request("a.hl7", "  MSH|^~\\&|\r\n").payload(PayloadFormat::Hl7v2);
        assert_eq!(payload["resourceType"], "Hl7v2Message");
        assert_eq!(payload["src"], "MSH|^~\\&|");
        assert_eq!(payload["status"], "received");
        assert_eq!(payload["config"]["id"], "default");
    }

    #[test]
    fn response_from_body_variants() {
        let r = DeliveryResponse::from_body(201, &json!({"id": "m-1", "status": "processed"}));
        assert_eq!(r.id.as_deref(), Some("m-1"));
        assert_eq!(r.processing_success, Some(true));

        let r = DeliveryResponse::from_body(200, &json!({"status": "error"}));
        assert_eq!(r.processing_success, Some(false));

        let r = DeliveryResponse::from_body(
            200,
            &json!({"processing_success": false, "status": "processed"}),
        );
        assert_eq!(r.processing_success, Some(false));

        let r = DeliveryResponse::from_body(200, &json!({"status": "received", "id": 7}));
        assert_eq!(r.processing_success, None);
        assert_eq!(r.id.as_deref(), Some("7"));
    }

    #[test]
    fn posts_envelope_and_parses_success() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/Hl7v2Message")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "filename": "a.txt",
                "content": "hello",
                "source": "file-processor",
            })))
            .with_status(201)
            .with_body(r#"{"id":"msg-42","status":"processed"}"#)
            .create();

        let mut client = HttpDeliveryClient::new(&config(server.url())).unwrap();
        let resp = client.send(&request("a.txt", "hello")).unwrap();

        mock.assert();
        assert_eq!(resp.http_status_code, 201);
        assert_eq!(resp.id.as_deref(), Some("msg-42"));
        assert_eq!(resp.processing_success, Some(true));
    }

    #[test]
    fn sends_basic_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/Hl7v2Message")
            .match_header("authorization", "Basic cmVsYXk6c2VjcmV0")
            .with_status(200)
            .with_body(r#"{"processing_success":true}"#)
            .create();

        let mut cfg = config(server.url());
        cfg.username = Some("relay".to_string());
        cfg.password = Some("secret".to_string());
        let mut client = HttpDeliveryClient::new(&cfg).unwrap();
        let resp = client.send(&request("a.txt", "x")).unwrap();

        mock.assert();
        assert_eq!(resp.processing_success, Some(true));
    }

    #[test]
    fn server_error_is_a_response_not_an_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/Hl7v2Message")
            .with_status(500)
            .with_body("boom")
            .create();

        let mut client = HttpDeliveryClient::new(&config(server.url())).unwrap();
        let resp = client.send(&request("a.txt", "x")).unwrap();
        assert_eq!(resp, DeliveryResponse::status(500));
    }

    #[test]
    fn invalid_json_is_unexpected() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/Hl7v2Message")
            .with_status(200)
            .with_body("<html>")
            .create();

        let mut client = HttpDeliveryClient::new(&config(server.url())).unwrap();
        let err = client.send(&request("a.txt", "x")).unwrap_err();
        assert!(matches!(err, SendError::Unexpected(_)));
    }

    #[test]
    fn connection_refused_is_transport() {
        // Port 1 is reserved and nothing listens there.
        let mut client = HttpDeliveryClient::new(&config("http://127.0.0.1:1".to_string())).unwrap();
        let err = client.send(&request("a.txt", "x")).unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
