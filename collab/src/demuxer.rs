use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CollabError;
use crate::error::CollabResult;

/// Extracts a mono WAV track from a video file. A real implementation
/// shells out to an external binary; a mock implementation replays a
/// fixture for tests without the binary installed.
#[async_trait]
pub trait Demuxer: Send + Sync {
    async fn extract_audio(&self, video_path: &Path, audio_dest: &Path) -> CollabResult<()>;
}

/// Shells out to `ffmpeg -i <video> -vn -ac 1 -ar 16000 <dest>`.
pub struct FfmpegDemuxer {
    binary: String,
}

impl FfmpegDemuxer {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Demuxer for FfmpegDemuxer {
    async fn extract_audio(&self, video_path: &Path, audio_dest: &Path) -> CollabResult<()> {
        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(video_path)
            .arg("-vn")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg(audio_dest)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CollabError::Demux(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}

/// Copies the (already-audio) fixture in place of a real extraction, for
/// tests that exercise the pipeline without an `ffmpeg` binary available.
pub struct MockDemuxer;

#[async_trait]
impl Demuxer for MockDemuxer {
    async fn extract_audio(&self, video_path: &Path, audio_dest: &Path) -> CollabResult<()> {
        tokio::fs::copy(video_path, audio_dest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_demuxer_copies_source_to_dest() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("in.mp4");
        let dest = tmp.path().join("out.wav");
        tokio::fs::write(&src, b"fake-bytes").await.expect("write src");

        MockDemuxer
            .extract_audio(&src, &dest)
            .await
            .expect("extract");

        let contents = tokio::fs::read(&dest).await.expect("read dest");
        assert_eq!(contents, b"fake-bytes");
    }
}
