use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use crate::{error::AppError, utils::config::AppConfig};

/// Completion-service seam. Implementations make exactly one attempt per
/// call; callers degrade locally on `Err` rather than retrying.
#[async_trait]
pub trait Completions: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

/// Chat-completion backend speaking the OpenAI API.
pub struct OpenAiCompletions {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiCompletions {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        );
        Self::new(
            client,
            config.completion_model.clone(),
            Duration::from_secs(config.completion_timeout_secs),
        )
    }
}

#[async_trait]
impl Completions for OpenAiCompletions {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([ChatCompletionRequestUserMessage::from(prompt).into()])
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| AppError::CompletionTimeout(self.timeout.as_secs()))??;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or(AppError::LLMParsing(
                "No content found in completion response".into(),
            ))?
            .trim()
            .to_owned();

        debug!(model = %self.model, chars = text.chars().count(), "Completion received");
        Ok(text)
    }
}
