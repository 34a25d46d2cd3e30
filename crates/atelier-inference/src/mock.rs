//! Mock generation backend for deterministic testing.
//!
//! Responses are chosen by prompt substring, so tests can answer the
//! classification and extraction calls of one resolution differently.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atelier_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_response_mapping("Classify query", "Coats")
//!     .with_response_mapping("Analyze search query", r#"{"colors": ["black"]}"#);
//! assert_eq!(backend.generate_call_count(), 0);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atelier_core::{Error, GenerationBackend, ImagePart, Result};

/// Mock generation backend for testing.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    /// (prompt substring, response), first match wins.
    mappings: Vec<(String, String)>,
    default_response: String,
    latency_ms: u64,
    failure_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub image_count: usize,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            model: "mock-model".to_string(),
            mappings: Vec::new(),
            default_response: "Mock response".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockGenerationBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Answer any prompt containing `needle` with `output`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mappings
            .push((needle.into(), output.into()));
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        if let Ok(mut log) = self.call_log.lock() {
            log.clear();
        }
    }

    /// Number of generation calls of any kind.
    pub fn generate_call_count(&self) -> usize {
        self.call_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Number of calls that carried images.
    pub fn vision_call_count(&self) -> usize {
        self.call_log
            .lock()
            .map(|log| log.iter().filter(|c| c.image_count > 0).count())
            .unwrap_or(0)
    }

    fn log_call(&self, operation: &str, input: &str, image_count: usize) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                operation: operation.to_string(),
                input: input.to_string(),
                image_count,
                timestamp: std::time::Instant::now(),
            });
        }
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    async fn respond(&self, operation: &str, prompt: &str, image_count: usize) -> Result<String> {
        self.log_call(operation, prompt, image_count);
        self.simulate_latency().await;

        if self.should_fail() {
            return Err(Error::Inference("Simulated failure for testing".to_string()));
        }

        let mapped = self
            .config
            .mappings
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        Ok(mapped.unwrap_or_else(|| self.config.default_response.clone()))
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.respond("generate", prompt, 0).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.respond("generate", prompt, 0).await
    }

    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.respond("generate_json", prompt, 0).await
    }

    async fn generate_json_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
    ) -> Result<String> {
        self.respond("generate_json", prompt, images.len()).await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
