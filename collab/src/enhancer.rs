use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::CollabError;
use crate::error::CollabResult;

#[derive(Debug, Clone)]
pub struct Enhancement {
    pub enhanced_text: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub sentiment: String,
    pub model_used: String,
}

/// Takes a raw transcript and produces the enriched text + analysis
/// bundle `spec.md` §3's `EnhanceTranscription` step stores.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, raw_text: &str) -> CollabResult<Enhancement>;
}

/// Calls an OpenAI-compatible chat completions endpoint with a single
/// structured-output prompt.
pub struct LlmEnhancer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmEnhancer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Enhancer for LlmEnhancer {
    async fn enhance(&self, raw_text: &str) -> CollabResult<Enhancement> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Clean up this transcript and return JSON with \
                        enhanced_text, summary, key_points, topics, sentiment."
                },
                { "role": "user", "content": raw_text }
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CollabError::Enhancement(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }
        let parsed: ChatCompletion = response
            .json()
            .await
            .map_err(|e| CollabError::Enhancement(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollabError::Enhancement("empty completion".to_string()))?;
        let fields: EnhancementFields = serde_json::from_str(&content)
            .map_err(|e| CollabError::Enhancement(format!("malformed json content: {e}")))?;

        Ok(Enhancement {
            enhanced_text: fields.enhanced_text,
            summary: fields.summary,
            key_points: fields.key_points,
            topics: fields.topics,
            sentiment: fields.sentiment,
            model_used: self.model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct EnhancementFields {
    enhanced_text: String,
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    sentiment: String,
}

/// Deterministic stand-in used in tests: echoes the input back with
/// trivial derived fields instead of calling out to an LLM.
pub struct MockEnhancer;

#[async_trait]
impl Enhancer for MockEnhancer {
    async fn enhance(&self, raw_text: &str) -> CollabResult<Enhancement> {
        Ok(Enhancement {
            enhanced_text: raw_text.trim().to_string(),
            summary: raw_text.chars().take(80).collect(),
            key_points: vec![raw_text.chars().take(40).collect()],
            topics: vec!["general".to_string()],
            sentiment: "neutral".to_string(),
            model_used: "mock".to_string(),
        })
    }
}
