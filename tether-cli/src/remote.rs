//! Remote store backends for the CLI.
//!
//! - `http(s)://…` — JSON API: `GET {base}/projects/{id}/files` returns
//!   `{"files": [RemoteFile]}`, `PUT` to the same URL replaces the whole set.
//! - `file://<dir>` — one sub-directory per remote id, files stored under
//!   their replica names. Useful offline and in tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tether_core::{RemoteFile, RemoteId};
use tether_sync::error::api_err;
use tether_sync::local::{replica_path, scan_replica};
use tether_sync::{writer, AuthToken, RemoteStore, SyncError};
use tether_worktree::paths::is_safe_remote_id;

/// Open the remote named by `url`.
pub fn open(url: &str, timeout: Duration) -> Result<Arc<dyn RemoteStore>> {
    if let Some(dir) = url.strip_prefix("file://") {
        return Ok(Arc::new(DirRemoteStore::new(dir)));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Arc::new(HttpRemoteStore::new(url, timeout)));
    }
    bail!("unsupported remote URL '{url}'; expected http(s):// or file://")
}

/// Remote ids become one URL path segment or one directory name.
fn checked_id(remote_id: &RemoteId) -> Result<&str, SyncError> {
    if is_safe_remote_id(remote_id) {
        Ok(&remote_id.0)
    } else {
        Err(SyncError::InvalidRequest(format!(
            "remote id '{remote_id}' may only contain ASCII letters, digits, '-', '_' and '.'"
        )))
    }
}

#[derive(Serialize, Deserialize)]
struct FileList {
    files: Vec<RemoteFile>,
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpRemoteStore {
    base: String,
    agent: ureq::Agent,
}

impl HttpRemoteStore {
    pub fn new(base: &str, timeout: Duration) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn url(&self, remote_id: &RemoteId) -> Result<String, SyncError> {
        Ok(format!("{}/projects/{}/files", self.base, checked_id(remote_id)?))
    }
}

fn http_err(operation: &str, err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            api_err(operation, format!("HTTP {code}: {}", body.trim()))
        }
        ureq::Error::Transport(transport) => api_err(operation, transport.to_string()),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list_all_files(&self, remote_id: &RemoteId, token: &AuthToken) -> Result<Vec<RemoteFile>, SyncError> {
        let request = self
            .agent
            .get(&self.url(remote_id)?)
            .set("Authorization", &format!("Bearer {}", token.expose()));
        tokio::task::spawn_blocking(move || {
            let response = request.call().map_err(|e| http_err("listAllFiles", e))?;
            let list: FileList = response
                .into_json()
                .map_err(|e| api_err("listAllFiles", format!("malformed response: {e}")))?;
            Ok(list.files)
        })
        .await
        .map_err(|e| api_err("listAllFiles", e.to_string()))?
    }

    async fn replace_all_files(
        &self,
        remote_id: &RemoteId,
        files: &[RemoteFile],
        token: &AuthToken,
    ) -> Result<(), SyncError> {
        let request = self
            .agent
            .put(&self.url(remote_id)?)
            .set("Authorization", &format!("Bearer {}", token.expose()));
        let body = FileList {
            files: files.to_vec(),
        };
        tokio::task::spawn_blocking(move || {
            request
                .send_json(&body)
                .map_err(|e| http_err("replaceAllFiles", e))?;
            Ok(())
        })
        .await
        .map_err(|e| api_err("replaceAllFiles", e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

pub struct DirRemoteStore {
    root: PathBuf,
}

impl DirRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, remote_id: &RemoteId) -> Result<PathBuf, SyncError> {
        Ok(self.root.join(checked_id(remote_id)?))
    }
}

fn list_dir(dir: &Path) -> Result<Vec<RemoteFile>, SyncError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    scan_replica(dir)?
        .iter()
        .map(|file| file.to_remote().map_err(SyncError::from))
        .collect()
}

#[async_trait]
impl RemoteStore for DirRemoteStore {
    async fn list_all_files(&self, remote_id: &RemoteId, _token: &AuthToken) -> Result<Vec<RemoteFile>, SyncError> {
        let dir = self.project_dir(remote_id)?;
        tokio::task::spawn_blocking(move || list_dir(&dir))
            .await
            .map_err(|e| api_err("listAllFiles", e.to_string()))?
    }

    async fn replace_all_files(
        &self,
        remote_id: &RemoteId,
        files: &[RemoteFile],
        _token: &AuthToken,
    ) -> Result<(), SyncError> {
        let dir = self.project_dir(remote_id)?;
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || {
            let keep: Vec<String> = files.iter().map(RemoteFile::filename).collect();
            for existing in list_dir(&dir)? {
                let name = existing.filename();
                if !keep.contains(&name) {
                    writer::remove(&replica_path(&dir, &name))?;
                }
            }
            for file in &files {
                writer::write_atomic(&replica_path(&dir, &file.filename()), &file.content)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| api_err("replaceAllFiles", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn dir_remote_replaces_whole_project() {
        let dir = TempDir::new().unwrap();
        let store = DirRemoteStore::new(dir.path());
        let remote = RemoteId::from("p");
        let token = AuthToken::new("");
        let files = vec![
            RemoteFile::from_filename("Code.js", "a".into()).unwrap(),
            RemoteFile::from_filename("lib/Util.js", "u".into()).unwrap(),
        ];
        store.replace_all_files(&remote, &files, &token).await.unwrap();
        assert_eq!(store.list_all_files(&remote, &token).await.unwrap().len(), 2);

        let fewer = vec![RemoteFile::from_filename("Code.js", "b".into()).unwrap()];
        store.replace_all_files(&remote, &fewer, &token).await.unwrap();
        let listed = store.list_all_files(&remote, &token).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "b");
        assert!(!dir.path().join("p/lib/Util.js").exists());
    }

    #[tokio::test]
    async fn missing_project_dir_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = DirRemoteStore::new(dir.path());
        let files = store
            .list_all_files(&RemoteId::from("nope"), &AuthToken::new(""))
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn unsafe_remote_ids_never_reach_the_url() {
        let store = HttpRemoteStore::new("https://api.example.com/", Duration::from_secs(1));
        assert_eq!(
            store.url(&RemoteId::from("abc-123")).unwrap(),
            "https://api.example.com/projects/abc-123/files"
        );
        for bad in ["../admin", "a/b", "a?x=1", "a b", ""] {
            let err = store.url(&RemoteId::from(bad)).unwrap_err();
            assert_eq!(err.code(), tether_sync::ErrorCode::InvalidRequest, "{bad}");
        }
    }

    #[tokio::test]
    async fn dir_remote_rejects_escaping_remote_ids() {
        let dir = TempDir::new().unwrap();
        let store = DirRemoteStore::new(dir.path().join("remote"));
        let err = store
            .replace_all_files(&RemoteId::from("../outside"), &[], &AuthToken::new(""))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tether_sync::ErrorCode::InvalidRequest);
        assert!(!dir.path().join("outside").exists());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(open("ftp://x", Duration::from_secs(1)).is_err());
        assert!(open("file:///tmp/x", Duration::from_secs(1)).is_ok());
    }
}
