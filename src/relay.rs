//! Forwards a translation request to the chat-completions API and turns
//! whatever comes back into a single translated string or a single error.

use crate::config::Settings;
use crate::lang::Direction;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const TEMPERATURE: f32 = 0.3;
pub const MAX_TOKENS: u32 = 2048;

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build client")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    pub api_config: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationResult {
    pub fn succeeded(text: impl Into<String>) -> Self {
        Self { success: true, result: Some(text.into()), error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(reason.into()) }
    }

    /// A malformed reply (success without text, failure without reason) still
    /// yields something to show.
    pub fn into_outcome(self) -> Result<String, String> {
        match (self.success, self.result, self.error) {
            (true, Some(text), _) => Ok(text),
            (_, _, Some(reason)) => Err(reason),
            _ => Err(RelayError::Format.to_string()),
        }
    }
}

impl From<Result<String, RelayError>> for TranslationResult {
    fn from(r: Result<String, RelayError>) -> Self {
        match r {
            Ok(text) => Self::succeeded(text),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("缺少API密钥配置")]
    MissingApiKey,
    #[error("API错误: {0}")]
    Api(String),
    #[error("API错误: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("翻译失败: 响应格式异常")]
    Format,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct TranslationPayload {
    translation: String,
}

pub async fn translate(request: &TranslationRequest) -> Result<String, RelayError> {
    let cfg = &request.api_config;
    let api_key = cfg.api_key.trim();
    if api_key.is_empty() {
        return Err(RelayError::MissingApiKey);
    }

    let direction = Direction::detect(&request.text);
    let system = direction.system_prompt();
    let req = ChatRequest {
        model: cfg.model.as_str(),
        messages: vec![
            ChatMessage { role: "system", content: &system },
            ChatMessage { role: "user", content: &request.text },
        ],
        temperature: TEMPERATURE,
        response_format: ResponseFormat { kind: "json_object" },
        max_tokens: MAX_TOKENS,
    };

    log::debug!(
        "POST {} ({} chars, model {}, to {})",
        cfg.endpoint(),
        request.text.chars().count(),
        req.model,
        direction.target_language()
    );
    let resp = CLIENT.post(cfg.endpoint()).bearer_auth(api_key).json(&req).send().await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(RelayError::Api(api_error_message(status, &body)));
    }
    let content = completion_content(&body)?;
    Ok(extract_translation(&content))
}

/// Never fails; exactly one of `result` / `error` is set.
pub async fn relay(request: TranslationRequest) -> TranslationResult {
    let res = translate(&request).await;
    match &res {
        Ok(out) => log::info!("translation ok ({} chars)", out.chars().count()),
        Err(e) => log::warn!("translation failed: {}", e),
    }
    res.into()
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .ok()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().map(str::to_string).unwrap_or_else(|| status.to_string()))
}

/// `choices[0].message.content`, typed first, then by JSON pointer. A 2xx
/// body carrying `{"error": {"message"}}` is still a provider error.
fn completion_content(body: &str) -> Result<String, RelayError> {
    if let Ok(parsed) = serde_json::from_str::<ChatResponse>(body) {
        if let Some(c) = parsed.choices.into_iter().next() {
            return Ok(c.message.content);
        }
    }
    log::debug!("unexpected completion shape, trying best-effort extraction");
    let content = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(|v| v.pointer("/choices/0/message/content"))
        .and_then(|c| c.as_str())
        .map(str::to_string);
    if let Some(content) = content {
        return Ok(content);
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) if !b.error.message.trim().is_empty() => Err(RelayError::Api(b.error.message)),
        _ => Err(RelayError::Format),
    }
}

/// The model is asked for `{"translation": ...}`; anything else is shown as is.
pub fn extract_translation(content: &str) -> String {
    match serde_json::from_str::<TranslationPayload>(content.trim()) {
        Ok(p) => p.translation,
        Err(e) => {
            log::debug!("content is not a translation object ({}), using raw text", e);
            content.to_string()
        }
    }
}

pub type RequestId = u64;

struct Job {
    id: RequestId,
    request: TranslationRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayReply {
    pub id: RequestId,
    pub result: TranslationResult,
}

/// Handle to the background relay. Dropping it shuts the worker down once
/// outstanding calls finish.
pub struct RelayHandle {
    jobs: Sender<Job>,
    replies: Receiver<RelayReply>,
}

impl RelayHandle {
    pub fn submit(&self, id: RequestId, request: TranslationRequest) -> bool {
        self.jobs.send(Job { id, request }).is_ok()
    }

    pub fn try_recv(&self) -> Option<RelayReply> {
        match self.replies.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<RelayReply> {
        match self.replies.recv_timeout(timeout) {
            Ok(r) => Some(r),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Starts the relay thread. Each job runs as its own task, so a call whose
/// popup was closed never holds up the next one.
pub fn spawn_worker() -> anyhow::Result<RelayHandle> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<RelayReply>();

    thread::Builder::new().name("seltrans-relay".into()).spawn(move || {
        log::info!("relay worker started");
        while let Ok(Job { id, request }) = job_rx.recv() {
            log::info!("request {}: {} chars", id, request.text.chars().count());
            let reply_tx = reply_tx.clone();
            rt.spawn(async move {
                let result = relay(request).await;
                let _ = reply_tx.send(RelayReply { id, result });
            });
        }
        rt.shutdown_timeout(Duration::from_secs(1));
        log::info!("relay worker stopped");
    })?;

    Ok(RelayHandle { jobs: job_tx, replies: reply_rx })
}
