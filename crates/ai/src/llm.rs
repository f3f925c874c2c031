use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_openai::{
  Client,
  config::OpenAIConfig,
  error::OpenAIError,
  types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
  },
};
use engram_shared::{LlmConfig, MemoryError, safe_serialize, span_kind};

use crate::{RateLimiter, ResponseSchema, RetryPolicy};

/// Closed set of chat-completion providers. Selected once by the
/// factory; no runtime plugin loading.
#[derive(Debug, Clone)]
pub enum Llm {
  OpenAi(OpenAiLlm),
  Scripted(ScriptedLlm),
}

impl Llm {
  /// Generate a completion. With a schema the provider runs in strict
  /// JSON mode and the returned text is guaranteed parseable by the
  /// provider contract (not re-validated here).
  pub async fn generate(
    &self,
    system_instruction: &str,
    user_message: &str,
    response_schema: Option<&ResponseSchema>,
  ) -> Result<String, MemoryError> {
    match self {
      Self::OpenAi(llm) => {
        llm
          .generate(system_instruction, user_message, response_schema)
          .await
      }
      Self::Scripted(llm) => llm.generate(system_instruction, user_message).await,
    }
  }
}

// ──────────────────────────────────────────────────
// OpenAI-compatible provider
// ──────────────────────────────────────────────────

/// Chat completions against any OpenAI-compatible endpoint. The client,
/// rate limiter and retry policy are constructed once and shared.
#[derive(Debug, Clone)]
pub struct OpenAiLlm {
  client: Client<OpenAIConfig>,
  model: String,
  rate: RateLimiter,
  retry: RetryPolicy,
}

impl OpenAiLlm {
  pub fn new(config: &LlmConfig) -> Result<Self, MemoryError> {
    if config.api_key.is_empty() {
      return Err(MemoryError::Configuration(
        "OPENAI_API_KEY must be set for the openai LLM provider".into(),
      ));
    }

    let mut openai = OpenAIConfig::new().with_api_key(&config.api_key);
    if let Some(base_url) = &config.base_url {
      openai = openai.with_api_base(base_url);
    }

    Ok(Self {
      client: Client::with_config(openai),
      model: config.model.clone(),
      rate: RateLimiter::new(config.calls_per_second),
      retry: RetryPolicy::default(),
    })
  }

  #[tracing::instrument(
    name = "llm.generate",
    skip_all,
    fields(
      span.kind = span_kind::LLM,
      llm.provider = "openai",
      llm.model = %self.model,
      llm.token_count.prompt = tracing::field::Empty,
      llm.token_count.completion = tracing::field::Empty,
      llm.token_count.total = tracing::field::Empty,
    )
  )]
  async fn generate(
    &self,
    system_instruction: &str,
    user_message: &str,
    response_schema: Option<&ResponseSchema>,
  ) -> Result<String, MemoryError> {
    tracing::debug!(
      input = %safe_serialize(&[("system", system_instruction), ("user", user_message)]),
      "llm request"
    );

    let output = self
      .retry
      .run(|| async move {
        self.rate.acquire().await;
        self
          .generate_once(system_instruction, user_message, response_schema)
          .await
      })
      .await?;

    tracing::debug!(output = %safe_serialize(&output), "llm response");
    Ok(output)
  }

  async fn generate_once(
    &self,
    system_instruction: &str,
    user_message: &str,
    response_schema: Option<&ResponseSchema>,
  ) -> Result<String, MemoryError> {
    let system = ChatCompletionRequestSystemMessage::from(system_instruction);
    let user = ChatCompletionRequestUserMessage::from(user_message);

    let mut request = CreateChatCompletionRequestArgs::default();
    request.model(&self.model).messages(vec![
      ChatCompletionRequestMessage::System(system),
      ChatCompletionRequestMessage::User(user),
    ]);

    if let Some(schema) = response_schema {
      request.response_format(ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
          description: schema.description.clone(),
          name: schema.name.clone(),
          schema: Some(schema.schema.clone()),
          strict: Some(true),
        },
      });
    }

    let request = request.build().map_err(classify_openai_error)?;
    let response = self
      .client
      .chat()
      .create(request)
      .await
      .map_err(classify_openai_error)?;

    // The instrument span on `generate` is current across this await
    if let Some(usage) = &response.usage {
      let span = tracing::Span::current();
      span.record("llm.token_count.prompt", usage.prompt_tokens);
      span.record("llm.token_count.completion", usage.completion_tokens);
      span.record("llm.token_count.total", usage.total_tokens);
    }

    response
      .choices
      .into_iter()
      .find_map(|choice| choice.message.content)
      .ok_or_else(|| MemoryError::Api("empty completion content".into()))
  }
}

/// Sort upstream failures into the retryable / permanent / configuration
/// buckets the retry policy dispatches on.
fn classify_openai_error(err: OpenAIError) -> MemoryError {
  match &err {
    OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
      MemoryError::Retryable(err.to_string())
    }
    OpenAIError::ApiError(api) => {
      let message = api.message.to_lowercase();
      if message.contains("rate limit")
        || message.contains("overloaded")
        || message.contains("timeout")
        || message.contains("temporarily")
      {
        MemoryError::Retryable(err.to_string())
      } else if message.contains("api key")
        || message.contains("unauthorized")
        || message.contains("permission")
      {
        MemoryError::Configuration(err.to_string())
      } else {
        MemoryError::Api(err.to_string())
      }
    }
    _ => MemoryError::Api(err.to_string()),
  }
}

// ──────────────────────────────────────────────────
// Scripted provider
// ──────────────────────────────────────────────────

/// Deterministic in-process provider: pops pre-seeded responses in
/// order. Used by tests and offline smoke runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLlm {
  responses: Arc<Mutex<VecDeque<String>>>,
  requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedLlm {
  #[must_use]
  pub fn new<I, S>(responses: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      responses: Arc::new(Mutex::new(
        responses.into_iter().map(Into::into).collect(),
      )),
      requests: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn push(&self, response: impl Into<String>) {
    self
      .responses
      .lock()
      .expect("scripted responses lock poisoned")
      .push_back(response.into());
  }

  /// The (system_instruction, user_message) pairs seen so far.
  #[must_use]
  pub fn requests(&self) -> Vec<(String, String)> {
    self
      .requests
      .lock()
      .expect("scripted requests lock poisoned")
      .clone()
  }

  async fn generate(
    &self,
    system_instruction: &str,
    user_message: &str,
  ) -> Result<String, MemoryError> {
    self
      .requests
      .lock()
      .expect("scripted requests lock poisoned")
      .push((system_instruction.to_owned(), user_message.to_owned()));

    self
      .responses
      .lock()
      .expect("scripted responses lock poisoned")
      .pop_front()
      .ok_or_else(|| MemoryError::Api("scripted llm has no responses left".into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn scripted_llm_pops_in_order_and_records_requests() {
    let llm = Llm::Scripted(ScriptedLlm::new(["first", "second"]));

    assert_eq!(llm.generate("sys", "one", None).await.unwrap(), "first");
    assert_eq!(llm.generate("sys", "two", None).await.unwrap(), "second");
    assert!(matches!(
      llm.generate("sys", "three", None).await,
      Err(MemoryError::Api(_))
    ));

    let Llm::Scripted(inner) = &llm else {
      unreachable!()
    };
    let requests = inner.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].1, "two");
  }
}
