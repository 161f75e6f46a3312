//! services/api/src/adapters/openai.rs
//!
//! This module contains the adapter for OpenAI chat completions.
//! It implements the `InferenceBackend` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use invoice_extraction_core::domain::MediaType;
use invoice_extraction_core::ports::{PortError, PortResult, ProviderReply};
use invoice_extraction_core::provider::InferenceBackend;
use serde_json::Value;
use tracing::debug;

/// The registry name of this backend.
pub const PROVIDER_NAME: &str = "openai";

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.1;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An `InferenceBackend` that calls the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiBackend {
    /// Creates a new `OpenAiBackend` from a configured client.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Creates a backend for `api_key`, failing when no key is configured.
    pub fn from_api_key(api_key: Option<&str>, model: &str) -> PortResult<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            PortError::ProviderConfiguration("OPENAI_API_KEY is not configured".to_string())
        })?;
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        Ok(Self::new(client, model.to_string()))
    }

    fn request(
        &self,
        parts: Vec<ChatCompletionRequestUserMessageContentPart>,
    ) -> PortResult<CreateChatCompletionRequest> {
        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message])
            .max_tokens(MAX_TOKENS)
            .temperature(TEMPERATURE)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn send(&self, request: CreateChatCompletionRequest) -> PortResult<ProviderReply> {
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Extraction(format!("OpenAI request failed: {}", e)))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        debug!(model = %self.model, chars = text.len(), "OpenAI completion received");

        let raw = serde_json::to_value(&response).unwrap_or(Value::Null);
        Ok(ProviderReply { text, raw })
    }
}

fn text_part(text: &str) -> ChatCompletionRequestUserMessageContentPart {
    ChatCompletionRequestUserMessageContentPart::Text(ChatCompletionRequestMessageContentPartText {
        text: text.to_string(),
    })
}

/// Embeds the image as a `data:` URL at high detail.
fn image_part(media_type: MediaType, base64_data: &str) -> ChatCompletionRequestUserMessageContentPart {
    ChatCompletionRequestUserMessageContentPart::ImageUrl(ChatCompletionRequestMessageContentPartImage {
        image_url: ImageUrl {
            url: format!("data:{};base64,{}", media_type.mime(), base64_data),
            detail: Some(ImageDetail::High),
        },
    })
}

//=========================================================================================
// `InferenceBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    async fn complete_vision(
        &self,
        prompt: &str,
        media_type: MediaType,
        base64_data: &str,
    ) -> PortResult<ProviderReply> {
        let request = self.request(vec![text_part(prompt), image_part(media_type, base64_data)])?;
        self.send(request).await
    }

    async fn complete_text(&self, prompt: &str) -> PortResult<ProviderReply> {
        let request = self.request(vec![text_part(prompt)])?;
        self.send(request).await
    }
}
