use std::env;
use std::time::Duration;

/// Per-operation-kind concurrency ceilings and shared limits, read from the
/// environment at startup the way feature flags and tunables usually are.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub upload_concurrency: usize,
    pub extract_audio_concurrency: usize,
    pub transcribe_concurrency: usize,
    pub enhance_concurrency: usize,
    pub max_download_bytes: u64,
    pub operation_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: env_usize("PIPEFLOW_UPLOAD_CONCURRENCY", 4),
            extract_audio_concurrency: env_usize("PIPEFLOW_EXTRACT_AUDIO_CONCURRENCY", 2),
            transcribe_concurrency: env_usize("PIPEFLOW_TRANSCRIBE_CONCURRENCY", 2),
            enhance_concurrency: env_usize("PIPEFLOW_ENHANCE_CONCURRENCY", 4),
            max_download_bytes: env_u64("PIPEFLOW_MAX_DOWNLOAD_BYTES", 2 * 1024 * 1024 * 1024),
            operation_timeout: Duration::from_secs(env_u64("PIPEFLOW_OPERATION_TIMEOUT_SECS", 600)),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
