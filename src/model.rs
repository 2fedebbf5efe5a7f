use anyhow::{anyhow, Error};
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use tracing::debug;

use crate::config::ModelConfig;

/// Turns a prompt into a completion. Implementations keep no conversation
/// state: every piece of context has to be in the prompt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, Error>;
}

pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    pub fn new(config: &ModelConfig) -> Self {
        OllamaModel {
            client: Ollama::builder()
                .host(config.host.clone())
                .port(config.port)
                .build(),
            model: config.model.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for OllamaModel {
    async fn invoke(&self, prompt: &str) -> Result<String, Error> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| anyhow!("{} generation failed: {}", self.model, e))?;

        debug!(model = %self.model, chars = response.response.len(), "completion received");

        Ok(response.response)
    }
}
