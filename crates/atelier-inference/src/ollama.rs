//! Ollama inference backend implementation.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use atelier_core::defaults;
use atelier_core::{Error, GenerationBackend, ImagePart, Result};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = defaults::OLLAMA_URL;

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = defaults::GEN_MODEL;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = defaults::GEN_TIMEOUT_SECS;

/// Ollama inference backend.
///
/// Text prompts go to the generation model; prompts carrying images go to
/// the vision model, which defaults to the generation model.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    gen_model: String,
    vision_model: String,
    gen_timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_OLLAMA_URL.to_string(),
            DEFAULT_GEN_MODEL.to_string(),
            None,
        )
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(base_url: String, gen_model: String, vision_model: Option<String>) -> Self {
        let gen_timeout = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(GEN_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(gen_timeout))
            .build()
            .unwrap_or_else(|_| Client::new());

        let vision_model = vision_model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| gen_model.clone());

        info!(
            "Initializing Ollama backend: url={}, gen={}, vision={}",
            base_url, gen_model, vision_model
        );

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gen_model,
            vision_model,
            gen_timeout_secs: gen_timeout,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let gen_model =
            std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string());
        let vision_model = std::env::var(defaults::ENV_OLLAMA_VISION_MODEL).ok();

        Self::with_config(base_url, gen_model, vision_model)
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    /// Check if the backend is available and responding.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!("Ollama health check passed");
                    Ok(true)
                } else {
                    warn!("Ollama health check failed: {}", resp.status());
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("Ollama health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Internal generation method shared by all generate variants.
    async fn generate_internal(
        &self,
        system: &str,
        prompt: &str,
        images: &[ImagePart],
        format: Option<serde_json::Value>,
    ) -> Result<String> {
        let start = Instant::now();
        let model = if images.is_empty() {
            &self.gen_model
        } else {
            &self.vision_model
        };

        debug!(
            json_format = format.is_some(),
            image_count = images.len(),
            "Starting generation via chat API"
        );

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage::new("system", system));
        }
        let mut user = ChatMessage::new("user", prompt);
        user.images = images
            .iter()
            .map(|img| base64::engine::general_purpose::STANDARD.encode(&img.data))
            .collect();
        messages.push(user);

        let think = if format.is_some() { Some(false) } else { None };
        let request = ChatRequest {
            model: model.clone(),
            messages,
            stream: false,
            format,
            think,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > defaults::SLOW_GENERATION_MS {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64-encoded images for vision models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            images: Vec::new(),
        }
    }
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement. Set to `"json"` for guaranteed valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Disable thinking/reasoning for models that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.gen_model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_internal(system, prompt, &[], None).await
    }

    #[instrument(skip(self, prompt), fields(subsystem = "inference", component = "ollama", op = "generate_json", model = %self.gen_model, prompt_len = prompt.len()))]
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.generate_internal("", prompt, &[], Some(serde_json::json!("json")))
            .await
    }

    #[instrument(skip(self, prompt, images), fields(subsystem = "inference", component = "ollama", op = "generate_json_with_images", model = %self.vision_model, prompt_len = prompt.len(), image_count = images.len()))]
    async fn generate_json_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
    ) -> Result<String> {
        self.generate_internal("", prompt, images, Some(serde_json::json!("json")))
            .await
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": content},
            "done": true
        }))
    }

    // ==========================================================================
    // Configuration Tests
    // ==========================================================================

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_OLLAMA_URL, "http://127.0.0.1:11434");
        assert!(!DEFAULT_GEN_MODEL.is_empty());
    }

    #[test]
    fn test_vision_model_defaults_to_gen_model() {
        let backend = OllamaBackend::with_config("http://x".into(), "gen".into(), None);
        assert_eq!(backend.vision_model(), "gen");
        assert_eq!(backend.model_name(), "gen");

        let backend =
            OllamaBackend::with_config("http://x/".into(), "gen".into(), Some("llava".into()));
        assert_eq!(backend.vision_model(), "llava");
        assert_eq!(backend.base_url, "http://x");
    }

    // ==========================================================================
    // Request/Response Struct Tests
    // ==========================================================================

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "llama3".to_string(),
            messages: vec![ChatMessage::new("system", "Be helpful"), ChatMessage::new("user", "Hello")],
            stream: false,
            format: None,
            think: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("format"));
        assert!(!json.contains("think"));
        assert!(!json.contains("images"));
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"message": {"role": "assistant", "content": "Hello there!"}, "done": true}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.message.content, "Hello there!");
        assert!(response.message.images.is_empty());
    }

    // ==========================================================================
    // HTTP Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_generate_posts_to_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "qwen", "stream": false})))
            .respond_with(chat_reply("Coats"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "qwen".into(), None);
        assert_eq!(backend.generate("Classify").await.unwrap(), "Coats");
    }

    #[tokio::test]
    async fn test_generate_json_requests_json_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"format": "json", "think": false})))
            .respond_with(chat_reply(r#"{"colors": []}"#))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "qwen".into(), None);
        let out = backend.generate_json("Extract").await.unwrap();
        assert_eq!(out, r#"{"colors": []}"#);
    }

    #[tokio::test]
    async fn test_images_go_to_vision_model_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llava",
                "messages": [{"role": "user", "images": ["AQID"]}]
            })))
            .respond_with(chat_reply(r#"{"brightness": "dark"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let backend =
            OllamaBackend::with_config(server.uri(), "qwen".into(), Some("llava".into()));
        let image = ImagePart::new(vec![1, 2, 3], "image/jpeg");
        let out = backend
            .generate_json_with_images("Brightness?", &[image])
            .await
            .unwrap();
        assert!(out.contains("dark"));
    }

    #[tokio::test]
    async fn test_error_status_is_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "qwen".into(), None);
        let err = backend.generate("x").await.unwrap_err();
        assert!(matches!(err, Error::Inference(ref m) if m.contains("model not loaded")));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .mount(&server)
            .await;

        let backend = OllamaBackend::with_config(server.uri(), "qwen".into(), None);
        assert!(backend.health_check().await.unwrap());

        let down = OllamaBackend::with_config("http://127.0.0.1:9".into(), "qwen".into(), None);
        assert!(!down.health_check().await.unwrap());
    }
}
