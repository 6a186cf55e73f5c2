//! HTTP transport for the generation collaborator.
//!
//! Speaks the OpenAI-style chat completions protocol (also exposed by Ollama)
//! and the Anthropic messages protocol. The assistant is instructed to answer
//! with a single JSON document matching [`GenerationOutput`]; anything that
//! does not decode is surfaced as malformed, never repaired.

use async_trait::async_trait;
use cantina_agent::{GenerationClient, GenerationError, GenerationOutput, GenerationRequest};
use cantina_core::config::{ConfigError, LlmConfig, LlmProvider};
use cantina_core::domain::message::MessageRole;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct HttpGenerationClient {
    http: reqwest::Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpGenerationClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ConfigError::Validation(format!("could not build http client: {error}"))
            })?;

        Ok(Self {
            http,
            provider: config.provider,
            endpoint: endpoint_for(config)?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let system = system_prompt(request);
        let turns: Vec<Value> = request
            .history
            .iter()
            .map(|message| {
                let role = match message.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                json!({ "role": role, "content": message.content })
            })
            .collect();

        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let mut messages = vec![json!({ "role": "system", "content": system })];
                messages.extend(turns);
                json!({
                    "model": self.model,
                    "messages": messages,
                    "temperature": 0.4,
                })
            }
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": 1024,
                "system": system,
                "messages": turns,
            }),
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (self.provider, &self.api_key) {
            (LlmProvider::Anthropic, Some(key)) => builder
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            (_, Some(key)) => builder.bearer_auth(key.expose_secret()),
            (_, None) => builder,
        }
    }

    async fn call_once(&self, body: &Value) -> Result<GenerationOutput, GenerationError> {
        let response = self
            .apply_auth(self.http.post(&self.endpoint).json(body))
            .send()
            .await
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Unavailable(format!(
                "generation endpoint returned {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| GenerationError::Malformed(error.to_string()))?;

        let content = extract_content(self.provider, &payload)?;
        parse_output(&content)
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let body = self.request_body(request);

        // Exactly one upstream call per turn. A failed turn is surfaced to
        // the guest, who resubmits; the server never re-spends the call.
        match self.call_once(&body).await {
            Ok(output) => Ok(output),
            Err(error) => {
                if matches!(error, GenerationError::Unavailable(_)) {
                    warn!(
                        event_name = "generation.transport_failed",
                        error = %error,
                        "generation call failed"
                    );
                }
                Err(error)
            }
        }
    }
}

fn endpoint_for(config: &LlmConfig) -> Result<String, ConfigError> {
    let base = match (config.provider, &config.base_url) {
        (_, Some(base)) => base.trim_end_matches('/').to_owned(),
        (LlmProvider::OpenAi, None) => OPENAI_DEFAULT_BASE.to_owned(),
        (LlmProvider::Anthropic, None) => ANTHROPIC_DEFAULT_BASE.to_owned(),
        (LlmProvider::Ollama, None) => {
            return Err(ConfigError::Validation(
                "llm.base_url is required for the ollama provider".to_owned(),
            ))
        }
    };

    let path = match config.provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => "/v1/chat/completions",
        LlmProvider::Anthropic => "/v1/messages",
    };

    Ok(format!("{base}{path}"))
}

fn system_prompt(request: &GenerationRequest) -> String {
    let catalog = request
        .candidates
        .iter()
        .map(|product| {
            format!(
                "- id: {} | name: {} | type: {} | price: {}",
                product.id.0,
                product.name,
                product.wine_type.as_str(),
                product.price
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a restaurant sommelier. Recommend wines strictly from the \
         catalog below, never invent entries or prices.\n\nCatalog:\n{catalog}\n\n\
         Party briefing: {briefing}\n\n\
         Reply with a single JSON object and nothing else, shaped as:\n\
         {{\"prose\": string, \"wines\": [{{\"product_ref\": catalog id, \
         \"rank\": 1-based integer, \"reason\": string, \"best\": bool}}], \
         \"journeys\": [{{\"label\": string, \"slots\": [{{\"product_ref\": \
         catalog id, \"rank\": slot position, \"reason\": string}}]}}]}}.\n\
         Ranks must run 1..N without gaps. Use \"journeys\" only when the \
         briefing asks for a tasting journey, otherwise use \"wines\".",
        briefing = request.context.briefing_message()
    )
}

fn extract_content(provider: LlmProvider, payload: &Value) -> Result<String, GenerationError> {
    let content = match provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            payload.pointer("/choices/0/message/content").and_then(Value::as_str)
        }
        LlmProvider::Anthropic => payload.pointer("/content/0/text").and_then(Value::as_str),
    };

    content.map(str::to_owned).ok_or_else(|| {
        GenerationError::Malformed("response carried no assistant content".to_owned())
    })
}

/// Decode the assistant reply. Tolerates a markdown code fence around the
/// JSON document; everything else must decode as [`GenerationOutput`].
fn parse_output(content: &str) -> Result<GenerationOutput, GenerationError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|error| GenerationError::Malformed(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use cantina_agent::{GenerationClient, GenerationError, GenerationRequest};
    use cantina_core::config::{AppConfig, LlmProvider};
    use cantina_core::context::{ContextBuilder, Dish, JourneyPreference, WineTypePreference};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::{endpoint_for, extract_content, parse_output, HttpGenerationClient};

    #[test]
    fn parse_output_accepts_plain_and_fenced_json() {
        let plain = r#"{"prose": "Try the Barolo.", "wines": [{"product_ref": "p-1", "rank": 1}]}"#;
        let output = parse_output(plain).expect("plain json decodes");
        assert_eq!(output.wines.len(), 1);
        assert_eq!(output.wines[0].rank, 1);

        let fenced = format!("```json\n{plain}\n```");
        let output = parse_output(&fenced).expect("fenced json decodes");
        assert_eq!(output.prose, "Try the Barolo.");
    }

    #[test]
    fn parse_output_rejects_non_json_chatter() {
        let error = parse_output("Sure! I'd recommend the Barolo.").expect_err("prose is not json");
        assert!(matches!(error, GenerationError::Malformed(_)));
    }

    #[test]
    fn extract_content_follows_provider_shapes() {
        let openai = json!({ "choices": [{ "message": { "content": "{}" } }] });
        assert_eq!(extract_content(LlmProvider::OpenAi, &openai).expect("openai shape"), "{}");

        let anthropic = json!({ "content": [{ "type": "text", "text": "{}" }] });
        assert_eq!(
            extract_content(LlmProvider::Anthropic, &anthropic).expect("anthropic shape"),
            "{}"
        );

        let empty = json!({});
        assert!(extract_content(LlmProvider::Ollama, &empty).is_err());
    }

    #[tokio::test]
    async fn a_failed_call_is_not_retried() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buffer = vec![0u8; 8192];
                let _ = stream.read(&mut buffer).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\n\
                          content-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });

        let mut llm = AppConfig::default().llm;
        llm.base_url = Some(format!("http://{addr}"));
        let client = HttpGenerationClient::from_config(&llm).expect("client");

        let context = ContextBuilder::new()
            .dish(Dish::named("Brasato"))
            .guest_count(2)
            .wine_type(WineTypePreference::Red)
            .journey_preference(JourneyPreference::Single)
            .build()
            .expect("context");
        let request =
            GenerationRequest { context, history: Vec::new(), candidates: Vec::new() };

        let error = client.generate(&request).await.expect_err("endpoint is failing");
        assert!(matches!(error, GenerationError::Unavailable(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "one upstream call per turn");
    }

    #[test]
    fn ollama_requires_an_explicit_base_url() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Ollama;
        config.base_url = None;
        assert!(endpoint_for(&config).is_err());

        config.base_url = Some("http://localhost:11434/".to_owned());
        assert_eq!(
            endpoint_for(&config).expect("base url set"),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
