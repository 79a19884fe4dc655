use std::path::Path;

use async_trait::async_trait;
use pipeflow_protocol::TranscriptSegment;
use pipeflow_protocol::TranscriptionQuality;
use tokio::process::Command;
use tracing::warn;

use crate::error::CollabError;
use crate::error::CollabResult;

#[derive(Debug, Clone)]
pub struct Transcript {
    pub raw_text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
    pub confidence: Option<f64>,
    pub service_used: String,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> CollabResult<Transcript>;
}

/// Shells out to a local `whisper` binary, sized by `quality.model_size()`.
pub struct LocalRecognizer {
    binary: String,
}

impl LocalRecognizer {
    pub fn new() -> Self {
        Self {
            binary: "whisper".to_string(),
        }
    }
}

impl Default for LocalRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recognizer for LocalRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> CollabResult<Transcript> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(audio_path)
            .arg("--model")
            .arg(quality.model_size())
            .arg("--output_format")
            .arg("json");
        if let Some(language) = language {
            cmd.arg("--language").arg(language);
        }
        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(CollabError::Transcription(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        let parsed: WhisperOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| CollabError::Transcription(e.to_string()))?;
        Ok(Transcript {
            raw_text: parsed.text,
            segments: parsed
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start_ms: (s.start * 1000.0) as u64,
                    end_ms: (s.end * 1000.0) as u64,
                    text: s.text,
                })
                .collect(),
            language: parsed.language.unwrap_or_else(|| "en".to_string()),
            confidence: None,
            service_used: format!("whisper-{}", quality.model_size()),
        })
    }
}

#[derive(serde::Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(serde::Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Calls the Azure Speech batch transcription REST API.
pub struct CloudRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl CloudRecognizer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Recognizer for CloudRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        _quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> CollabResult<Transcript> {
        let bytes = tokio::fs::read(audio_path).await?;
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .body(bytes);
        if let Some(language) = language {
            request = request.query(&[("language", language)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CollabError::Transcription(format!(
                "azure speech returned {}",
                response.status()
            )));
        }
        let parsed: AzureOutput = response
            .json()
            .await
            .map_err(|e| CollabError::Transcription(e.to_string()))?;
        Ok(Transcript {
            raw_text: parsed.display_text,
            segments: Vec::new(),
            language: parsed.language.unwrap_or_else(|| "en".to_string()),
            confidence: parsed.confidence,
            service_used: "azure".to_string(),
        })
    }
}

#[derive(serde::Deserialize)]
struct AzureOutput {
    #[serde(rename = "DisplayText")]
    display_text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Deterministic stand-in for a local or cloud recognizer, for tests and
/// deployments without a `whisper` binary or Azure credentials available.
pub struct MockRecognizer {
    service_used: String,
}

impl MockRecognizer {
    pub fn new(service_used: impl Into<String>) -> Self {
        Self {
            service_used: service_used.into(),
        }
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        _quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> CollabResult<Transcript> {
        if tokio::fs::metadata(audio_path).await.is_err() {
            return Err(CollabError::Transcription(format!(
                "no audio file at {}",
                audio_path.display()
            )));
        }
        Ok(Transcript {
            raw_text: "this is a mock transcript".to_string(),
            segments: Vec::new(),
            language: language.unwrap_or("en").to_string(),
            confidence: Some(0.95),
            service_used: self.service_used.clone(),
        })
    }
}

/// Tries `primary` first and falls back to `secondary` if it errors, per
/// `spec.md` §9's "Whisper unavailable -> fall back to Azure" resolution.
pub struct FallbackRecognizer {
    primary: Box<dyn Recognizer>,
    secondary: Box<dyn Recognizer>,
}

impl FallbackRecognizer {
    pub fn new(primary: Box<dyn Recognizer>, secondary: Box<dyn Recognizer>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Recognizer for FallbackRecognizer {
    async fn transcribe(
        &self,
        audio_path: &Path,
        quality: TranscriptionQuality,
        language: Option<&str>,
    ) -> CollabResult<Transcript> {
        match self.primary.transcribe(audio_path, quality, language).await {
            Ok(transcript) => Ok(transcript),
            Err(err) => {
                warn!(error = %err, "primary recognizer failed, falling back");
                let mut transcript = self.secondary.transcribe(audio_path, quality, language).await?;
                transcript.service_used = format!("{}_fallback", transcript.service_used);
                Ok(transcript)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl Recognizer for AlwaysFails {
        async fn transcribe(
            &self,
            _audio_path: &Path,
            _quality: TranscriptionQuality,
            _language: Option<&str>,
        ) -> CollabResult<Transcript> {
            Err(CollabError::Transcription("primary down".to_string()))
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl Recognizer for AlwaysSucceeds {
        async fn transcribe(
            &self,
            _audio_path: &Path,
            _quality: TranscriptionQuality,
            _language: Option<&str>,
        ) -> CollabResult<Transcript> {
            Ok(Transcript {
                raw_text: "hello from cloud".to_string(),
                segments: Vec::new(),
                language: "en".to_string(),
                confidence: Some(0.9),
                service_used: "azure".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn fallback_recognizer_uses_secondary_when_primary_fails() {
        let recognizer = FallbackRecognizer::new(Box::new(AlwaysFails), Box::new(AlwaysSucceeds));
        let transcript = recognizer
            .transcribe(
                Path::new("/tmp/audio.wav"),
                TranscriptionQuality::Balanced,
                None,
            )
            .await
            .expect("fallback should succeed");
        assert_eq!(transcript.service_used, "azure_fallback");
    }

    #[tokio::test]
    async fn mock_recognizer_fails_without_an_audio_file() {
        let recognizer = MockRecognizer::default();
        let result = recognizer
            .transcribe(
                Path::new("/nonexistent/audio.wav"),
                TranscriptionQuality::Fast,
                None,
            )
            .await;
        assert!(result.is_err());
    }
}
