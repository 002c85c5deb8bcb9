use std::time::Duration;

use numa_contracts::AnalysisError;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::non_empty_env;
use crate::preprocess::EncodedImage;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_CONNECTIVITY_URL: &str = "https://www.google.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MEAL_PROMPT: &str = r#"Analyze this meal image and provide a detailed nutritional breakdown. Please respond in the following JSON format only:

{
    "ingredients": ["ingredient1", "ingredient2", "ingredient3"],
    "estimated_calories": 450,
    "macros": {
        "protein": 25.5,
        "carbs": 35.2,
        "fat": 18.7
    },
    "confidence": 0.85,
    "analysis_text": "Brief description of the meal"
}

Be as accurate as possible. If you cannot identify food clearly, set confidence to 0.3 or lower. Include all visible ingredients."#;

#[derive(Debug, Clone, PartialEq)]
pub struct VisionConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub connectivity_url: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 500,
            temperature: 0.1,
            timeout: REQUEST_TIMEOUT,
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
        }
    }
}

impl VisionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = non_empty_env("OPENAI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env("NUMA_VISION_MODEL") {
            config.model = model;
        }
        if let Some(url) = non_empty_env("NUMA_CONNECTIVITY_URL") {
            config.connectivity_url = url;
        }
        config
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below the HTTP layer (DNS, TLS, connect, read, timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

pub trait VisionTransport: Send + Sync {
    /// GETs `url` and returns the status code.
    fn probe(&self, url: &str) -> Result<u16, TransportError>;

    fn post_json(
        &self,
        url: &str,
        bearer: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: HttpClient,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisionTransport for ReqwestTransport {
    fn probe(&self, url: &str) -> Result<u16, TransportError> {
        let response = self.http.get(url).send()?;
        Ok(response.status().as_u16())
    }

    fn post_json(
        &self,
        url: &str,
        bearer: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(payload)
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatMessage {
    pub content: String,
}

pub struct VisionClient<T: VisionTransport = ReqwestTransport> {
    transport: T,
    config: VisionConfig,
}

impl VisionClient<ReqwestTransport> {
    pub fn new(config: VisionConfig) -> Self {
        Self::with_transport(ReqwestTransport::new(), config)
    }
}

impl<T: VisionTransport> VisionClient<T> {
    pub fn with_transport(transport: T, config: VisionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fails fast with `NoInternetConnection` unless the probe URL answers 200.
    pub fn check_connectivity(&self) -> Result<(), AnalysisError> {
        match self.transport.probe(&self.config.connectivity_url) {
            Ok(200) => Ok(()),
            Ok(status) => {
                log::warn!("connectivity probe answered HTTP {status}");
                Err(AnalysisError::NoInternetConnection)
            }
            Err(err) => {
                log::warn!("connectivity probe failed: {}", err.message);
                Err(AnalysisError::NoInternetConnection)
            }
        }
    }

    pub fn build_payload(&self, image: &EncodedImage) -> Value {
        json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": MEAL_PROMPT},
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": image.data_url(),
                            "detail": "high",
                        }
                    }
                ]
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    pub fn request_analysis(
        &self,
        api_key: &str,
        image: &EncodedImage,
    ) -> Result<ChatCompletion, AnalysisError> {
        let payload = self.build_payload(image);
        let endpoint = self.config.endpoint();
        log::info!(
            "requesting meal analysis from {endpoint} ({} image bytes)",
            image.byte_len
        );
        let response = self
            .transport
            .post_json(&endpoint, api_key, &payload, self.config.timeout)
            .map_err(classify_transport_error)?;
        classify_status(&response)?;
        serde_json::from_str(&response.body).map_err(|err| {
            log::error!(
                "failed to decode completion: {err}; raw response: {}",
                truncate_text(&response.body, 512)
            );
            AnalysisError::InvalidResponse
        })
    }
}

pub fn classify_status(response: &TransportResponse) -> Result<(), AnalysisError> {
    match response.status {
        200 => Ok(()),
        401 => Err(AnalysisError::ApiKeyMissing),
        429 => Err(AnalysisError::RateLimitExceeded),
        408 => Err(AnalysisError::RequestTimeout),
        status => {
            let message = if response.body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                response.body.clone()
            };
            Err(AnalysisError::ApiRequestFailed(message))
        }
    }
}

pub fn classify_transport_error(err: TransportError) -> AnalysisError {
    let lowered = err.message.to_ascii_lowercase();
    if err.timed_out || lowered.contains("timeout") || lowered.contains("timed out") {
        AnalysisError::RequestTimeout
    } else {
        AnalysisError::Unknown(err.message)
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
