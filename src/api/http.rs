//! HTTP implementation of the triage backend

use super::types::{
    AssistantReply, FinalizeOutcome, FinalizeRequest, ReportDocument, SessionId,
};
use super::ApiError;
use crate::config::ClientConfig;
use crate::runtime::traits::{
    AccessService, ConversationService, FinalizationService, HistoryService, ReportService,
};
use crate::symptoms::{Symptom, SymptomSet};
use crate::transcript::{Message, MessageId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, Instant};

/// Triage backend reached over HTTP/JSON
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.api_key.clone(), config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// Send a request, classifying transport failures and non-success statuses
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.with_key(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::network(format!("Connection failed: {e}"))
            } else {
                ApiError::network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.execute(builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::malformed(format!("Failed to parse response: {e} - body: {body}")))
    }

    async fn download(
        &self,
        request: RequestBuilder,
        session_id: &SessionId,
    ) -> Result<ReportDocument, ApiError> {
        let response = self.execute(request).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read report: {e}")))?;
        Ok(ReportDocument {
            bytes: bytes.to_vec(),
            content_type,
            file_name: ReportDocument::default_file_name(session_id),
        })
    }
}

fn log_outcome<T>(
    operation: &str,
    session_id: Option<&SessionId>,
    start: Instant,
    result: &Result<T, ApiError>,
) {
    let duration_ms = start.elapsed().as_millis();
    let session = session_id.map(SessionId::as_str).unwrap_or("-");
    match result {
        Ok(_) => {
            tracing::info!(
                operation,
                session_id = %session,
                duration_ms = %duration_ms,
                "Backend request completed"
            );
        }
        Err(e) => {
            tracing::error!(
                operation,
                session_id = %session,
                duration_ms = %duration_ms,
                error = %e.message,
                transport = e.is_transport(),
                "Backend request failed"
            );
        }
    }
}

/// Turn a non-success response into a rejection, keeping the server's reason
pub(crate) fn classify_error(status: u16, body: &str) -> ApiError {
    ApiError::rejected(status, extract_detail(body))
}

/// The `detail` field of an error body: a string, or a list of `{ "msg": .. }`
fn extract_detail(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    match parsed.get("detail")? {
        serde_json::Value::String(detail) if !detail.trim().is_empty() => {
            Some(detail.trim().to_string())
        }
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

/// Numeric ids travel as JSON numbers
fn wire_session_id(session_id: &SessionId) -> serde_json::Value {
    session_id
        .as_str()
        .parse::<i64>()
        .map_or_else(|_| serde_json::Value::from(session_id.as_str()), serde_json::Value::from)
}

#[async_trait]
impl AccessService for HttpBackend {
    async fn redeem(&self, credential: &str) -> Result<SessionId, ApiError> {
        let start = Instant::now();
        let request = self
            .client
            .post(self.url("/sessions/start"))
            .json(&StartSessionRequest {
                access_code: credential,
            });
        let result = self
            .execute_json::<StartSessionResponse>(request)
            .await
            .map(|r| SessionId::new(r.session_id));
        log_outcome("redeem", result.as_ref().ok(), start, &result);
        result
    }
}

#[async_trait]
impl HistoryService for HttpBackend {
    async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>, ApiError> {
        let start = Instant::now();
        let request = self
            .client
            .get(self.url(&format!("/chat/{session_id}/history")));
        let result = self
            .execute_json::<HistoryResponse>(request)
            .await
            .map(normalize_history);
        log_outcome("history", Some(session_id), start, &result);
        result
    }
}

#[async_trait]
impl ConversationService for HttpBackend {
    async fn send(&self, session_id: &SessionId, text: &str) -> Result<AssistantReply, ApiError> {
        let start = Instant::now();
        let request = self
            .client
            .post(self.url(&format!("/chat/{session_id}")))
            .json(&ChatRequest { content: text });
        let result = self
            .execute_json::<ChatResponse>(request)
            .await
            .map(normalize_reply);
        if let Ok(reply) = &result {
            if reply.off_topic {
                tracing::info!(session_id = %session_id, "Assistant flagged utterance as off topic");
            }
        }
        log_outcome("send", Some(session_id), start, &result);
        result
    }
}

#[async_trait]
impl FinalizationService for HttpBackend {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeOutcome, ApiError> {
        let start = Instant::now();
        let body = CompleteSessionRequest {
            session_id: wire_session_id(&request.session_id),
            patient_name: &request.patient_name,
            symptoms: request.symptoms.iter().map(WireSymptomOut::from).collect(),
        };
        let http_request = self
            .client
            .post(self.url("/api/reports/complete-session"))
            .json(&body);
        let result = self
            .execute_json::<CompleteSessionResponse>(http_request)
            .await
            .map(|r| {
                if r.success {
                    FinalizeOutcome::succeeded(r.report_path)
                } else {
                    FinalizeOutcome::declined(r.message)
                }
            });
        log_outcome("finalize", Some(&request.session_id), start, &result);
        result
    }
}

#[async_trait]
impl ReportService for HttpBackend {
    async fn fetch_report(&self, session_id: &SessionId) -> Result<ReportDocument, ApiError> {
        let start = Instant::now();
        let request = self
            .client
            .get(self.url(&format!("/api/reports/download/{session_id}")));
        let result = self.download(request, session_id).await;
        log_outcome("fetch_report", Some(session_id), start, &result);
        result
    }
}

// ============================================================================
// Normalization
// ============================================================================

fn normalize_history(response: HistoryResponse) -> Vec<Message> {
    response
        .messages
        .into_iter()
        .filter_map(|m| {
            let id = MessageId::new(m.id);
            match m.role.as_str() {
                "user" if !m.text.trim().is_empty() => Some(Message::user(id, m.text)),
                "user" => None,
                "ai" | "assistant" => Some(Message::assistant(id, m.text)),
                other => {
                    tracing::debug!(role = %other, "Skipping history message with unknown role");
                    None
                }
            }
        })
        .collect()
}

fn normalize_reply(response: ChatResponse) -> AssistantReply {
    AssistantReply {
        text: response.reply.unwrap_or_default(),
        symptoms: response.extracted.and_then(WireExtraction::into_symptoms),
        off_topic: response.off_topic,
    }
}

impl WireExtraction {
    /// Snapshot carried by the extraction, if any.
    ///
    /// A `symptoms` list wins over the flat single-symptom form; entries
    /// without a name are dropped.
    fn into_symptoms(self) -> Option<SymptomSet> {
        match self.symptoms {
            Some(list) => Some(list.into_iter().filter_map(WireSymptom::into_symptom).collect()),
            None => self.single.into_symptom().map(|s| SymptomSet::new(vec![s])),
        }
    }
}

impl WireSymptom {
    fn into_symptom(self) -> Option<Symptom> {
        let name = self.symptom.filter(|n| !n.trim().is_empty())?;
        Some(Symptom {
            name,
            severity: self.severity.map(Scalar::into_text),
            duration: self.duration.map(Scalar::into_text),
            frequency: self.frequency.map(Scalar::into_text),
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_text)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    access_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    #[serde(deserialize_with = "string_or_number")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    role: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    off_topic: bool,
    #[serde(default)]
    extracted: Option<WireExtraction>,
}

#[derive(Debug, Deserialize)]
struct WireExtraction {
    #[serde(default)]
    symptoms: Option<Vec<WireSymptom>>,
    #[serde(flatten)]
    single: WireSymptom,
}

#[derive(Debug, Default, Deserialize)]
struct WireSymptom {
    #[serde(default)]
    symptom: Option<String>,
    #[serde(default)]
    severity: Option<Scalar>,
    #[serde(default)]
    duration: Option<Scalar>,
    #[serde(default)]
    frequency: Option<Scalar>,
}

#[derive(Debug, Serialize)]
struct CompleteSessionRequest<'a> {
    session_id: serde_json::Value,
    patient_name: &'a str,
    symptoms: Vec<WireSymptomOut<'a>>,
}

#[derive(Debug, Serialize)]
struct WireSymptomOut<'a> {
    symptom: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency: Option<&'a str>,
}

impl<'a> From<&'a Symptom> for WireSymptomOut<'a> {
    fn from(s: &'a Symptom) -> Self {
        Self {
            symptom: &s.name,
            severity: s.severity.as_deref(),
            duration: s.duration.as_deref(),
            frequency: s.frequency.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompleteSessionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    report_path: Option<String>,
}
