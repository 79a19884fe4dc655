use std::path::PathBuf;

use futures::StreamExt;
use pipeflow_protocol::WorkflowId;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::StoreError;
use crate::error::StoreResult;
use crate::paths;

#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub size: u64,
    pub format: String,
}

/// Content-addressed-by-workflow artifact storage under
/// `<data_root>/artifacts/<workflow_id>/`, per `spec.md` §4.A. Every
/// returned reference is a `file://` URL so collaborators and step results
/// carry a uniform, opaque location regardless of whether the artifact was
/// downloaded, extracted locally, or synthesized in-process.
pub struct ArtifactStore {
    client: reqwest::Client,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Streams `source_url` into the workflow's artifact directory,
    /// invoking `on_progress(bytes_so_far, total_bytes)` after each chunk
    /// and checking `cancel` between chunks so a caller can abort a large
    /// download mid-flight. Rejects the transfer once `max_bytes` is
    /// exceeded, even if the server never sent a `Content-Length`.
    pub async fn store_from_url(
        &self,
        workflow_id: &WorkflowId,
        source_url: &str,
        max_bytes: u64,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(u64, Option<u64>),
    ) -> StoreResult<(String, ArtifactInfo)> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| StoreError::SourceUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::SourceUnreachable(format!(
                "{source_url} returned {}",
                response.status()
            )));
        }
        let content_length = response.content_length();
        if let Some(total) = content_length
            && total > max_bytes
        {
            return Err(StoreError::SourceTooLarge {
                limit: max_bytes,
                actual: total,
            });
        }

        let format = guess_format(source_url);
        let file_name = format!("{}.{format}", Uuid::new_v4());
        let dir = paths::workflow_artifact_dir(workflow_id);
        paths::ensure_dir(&dir).await?;
        let dest = dir.join(&file_name);
        let tmp_dest = dir.join(format!("{file_name}.part"));

        let mut file = tokio::fs::File::create(&tmp_dest)
            .await
            .map_err(|e| StoreError::io(tmp_dest.display().to_string(), e))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_dest).await;
                return Err(StoreError::Cancelled);
            }
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_dest).await;
                return Err(StoreError::SourceTooLarge {
                    limit: max_bytes,
                    actual: written,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| StoreError::io(tmp_dest.display().to_string(), e))?;
            on_progress(written, content_length);
        }
        file.flush()
            .await
            .map_err(|e| StoreError::io(tmp_dest.display().to_string(), e))?;
        drop(file);
        tokio::fs::rename(&tmp_dest, &dest)
            .await
            .map_err(|e| StoreError::io(dest.display().to_string(), e))?;

        Ok((
            to_file_url(&dest),
            ArtifactInfo {
                size: written,
                format,
            },
        ))
    }

    /// Copies a collaborator-produced local file (e.g. the demuxer's
    /// extracted WAV) into the workflow's artifact directory.
    pub async fn store_from_path(
        &self,
        workflow_id: &WorkflowId,
        local_path: &std::path::Path,
        format: &str,
    ) -> StoreResult<(String, ArtifactInfo)> {
        let dir = paths::workflow_artifact_dir(workflow_id);
        paths::ensure_dir(&dir).await?;
        let file_name = format!("{}.{format}", Uuid::new_v4());
        let dest = dir.join(&file_name);
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| StoreError::io(dest.display().to_string(), e))?;
        let size = tokio::fs::metadata(&dest)
            .await
            .map_err(|e| StoreError::io(dest.display().to_string(), e))?
            .len();
        Ok((
            to_file_url(&dest),
            ArtifactInfo {
                size,
                format: format.to_string(),
            },
        ))
    }

    pub async fn store_bytes(
        &self,
        workflow_id: &WorkflowId,
        bytes: &[u8],
        format: &str,
    ) -> StoreResult<(String, ArtifactInfo)> {
        let dir = paths::workflow_artifact_dir(workflow_id);
        paths::ensure_dir(&dir).await?;
        let file_name = format!("{}.{format}", Uuid::new_v4());
        let dest = dir.join(&file_name);
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| StoreError::io(dest.display().to_string(), e))?;
        Ok((
            to_file_url(&dest),
            ArtifactInfo {
                size: bytes.len() as u64,
                format: format.to_string(),
            },
        ))
    }

    /// Resolves a `file://` artifact reference back to a local path,
    /// rejecting anything that would escape the workflow's own artifact
    /// directory.
    pub fn resolve(&self, workflow_id: &WorkflowId, artifact_url: &str) -> StoreResult<PathBuf> {
        let file_name = artifact_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::ArtifactNotFound(artifact_url.to_string()))?;
        let dir = paths::workflow_artifact_dir(workflow_id);
        paths::resolve_within(&dir, file_name)
    }

    pub async fn exists(&self, workflow_id: &WorkflowId, artifact_url: &str) -> StoreResult<bool> {
        let path = self.resolve(workflow_id, artifact_url)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    pub async fn cleanup(&self, workflow_id: &WorkflowId, artifact_url: &str) -> StoreResult<()> {
        let path = self.resolve(workflow_id, artifact_url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }

    pub async fn cleanup_workflow(&self, workflow_id: &WorkflowId) -> StoreResult<()> {
        let dir = paths::workflow_artifact_dir(workflow_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(dir.display().to_string(), e)),
        }
    }
}

fn guess_format(source_url: &str) -> String {
    source_url
        .rsplit('.')
        .next()
        .filter(|ext| ext.len() <= 5 && !ext.contains('/'))
        .unwrap_or("bin")
        .to_ascii_lowercase()
}

fn to_file_url(path: &std::path::Path) -> String {
    format!("file://{}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::Path;

    struct DataDirGuard {
        prev: Option<String>,
    }

    impl DataDirGuard {
        fn set(dir: &Path) -> Self {
            let prev = env::var("PIPEFLOW_DATA_DIR").ok();
            unsafe {
                env::set_var("PIPEFLOW_DATA_DIR", dir);
            }
            Self { prev }
        }
    }

    impl Drop for DataDirGuard {
        fn drop(&mut self) {
            unsafe {
                match &self.prev {
                    Some(value) => env::set_var("PIPEFLOW_DATA_DIR", value),
                    None => env::remove_var("PIPEFLOW_DATA_DIR"),
                }
            }
        }
    }

    #[test]
    fn guesses_format_from_extension() {
        assert_eq!(guess_format("https://example.com/video.mp4"), "mp4");
        assert_eq!(guess_format("https://example.com/video"), "bin");
        assert_eq!(guess_format("https://example.com/a/b/c"), "bin");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn store_bytes_then_resolve_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = ArtifactStore::new();
        let workflow_id = WorkflowId::new();
        let (url, info) = store
            .store_bytes(&workflow_id, b"hello", "txt")
            .await
            .expect("store bytes");
        assert_eq!(info.size, 5);
        assert!(store.exists(&workflow_id, &url).await.expect("exists"));

        let resolved = store.resolve(&workflow_id, &url).expect("resolve");
        let contents = tokio::fs::read(&resolved).await.expect("read");
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn resolve_rejects_path_traversal_in_artifact_url() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = ArtifactStore::new();
        let workflow_id = WorkflowId::new();
        assert!(
            store
                .resolve(&workflow_id, "file:///tmp/../../etc/passwd")
                .is_ok()
        );
        // rsplit('/') strips directory components entirely, so a traversal
        // attempt degrades to a plain (nonexistent) file name rather than
        // escaping - confirm it resolves inside the workflow directory.
        let resolved = store
            .resolve(&workflow_id, "file:///tmp/../../etc/passwd")
            .expect("resolve");
        assert!(resolved.starts_with(paths::workflow_artifact_dir(&workflow_id)));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn cleanup_workflow_removes_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let _guard = DataDirGuard::set(tmp.path());
        let store = ArtifactStore::new();
        let workflow_id = WorkflowId::new();
        store
            .store_bytes(&workflow_id, b"hi", "txt")
            .await
            .expect("store");
        store
            .cleanup_workflow(&workflow_id)
            .await
            .expect("cleanup");
        let dir = paths::workflow_artifact_dir(&workflow_id);
        assert!(!tokio::fs::try_exists(&dir).await.unwrap_or(true));
    }
}
