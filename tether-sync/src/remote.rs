//! Remote file store abstraction.
//!
//! The remote exposes exactly two operations: list every file of a project,
//! and replace every file of a project in one call. Implementations live with
//! the host (HTTP, directory) and in [`MemoryRemoteStore`] for tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use tether_core::types::split_filename;
use tether_core::{RemoteFile, RemoteId};

use crate::error::{api_err, SyncError};

/// Bearer credential for the remote store. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every file of the project.
    async fn list_all_files(
        &self,
        remote_id: &RemoteId,
        token: &AuthToken,
    ) -> Result<Vec<RemoteFile>, SyncError>;

    /// Replace the project's full file list. No partial updates.
    async fn replace_all_files(
        &self,
        remote_id: &RemoteId,
        files: &[RemoteFile],
        token: &AuthToken,
    ) -> Result<(), SyncError>;
}

/// In-memory remote with failure injection.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    projects: RwLock<HashMap<RemoteId, Vec<RemoteFile>>>,
    fail_list: Mutex<Option<String>>,
    fail_replace: Mutex<Option<String>>,
    list_calls: AtomicUsize,
    replace_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a project from `(filename, content)` pairs.
    pub fn with_project(self, remote_id: &str, files: &[(&str, &str)]) -> Self {
        for (filename, content) in files {
            self.put_file(&RemoteId::from(remote_id), filename, content);
        }
        self
    }

    /// Upsert one file addressed by replica filename (`Code.js`).
    pub fn put_file(&self, remote_id: &RemoteId, filename: &str, content: &str) {
        let Ok(mut file) = RemoteFile::from_filename(filename, content.to_string()) else {
            tracing::warn!(filename, "ignoring file with unsupported extension");
            return;
        };
        file.modified_time = Some(Utc::now());
        self.put_raw(remote_id, file);
    }

    /// Upsert a file exactly as a remote would report it, without checking
    /// its name.
    pub fn put_raw(&self, remote_id: &RemoteId, file: RemoteFile) {
        let filename = file.filename();
        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        let list = projects.entry(remote_id.clone()).or_default();
        list.retain(|f| f.filename() != filename);
        list.push(file);
    }

    pub fn remove_file(&self, remote_id: &RemoteId, filename: &str) {
        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = projects.get_mut(remote_id) {
            list.retain(|f| f.filename() != filename);
        }
    }

    pub fn files(&self, remote_id: &RemoteId) -> Vec<RemoteFile> {
        self.projects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(remote_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Content of one file by replica filename.
    pub fn content(&self, remote_id: &RemoteId, filename: &str) -> Option<String> {
        self.files(remote_id)
            .into_iter()
            .find(|f| f.filename() == filename)
            .map(|f| f.content)
    }

    /// The next `list_all_files` call fails with `message`.
    pub fn fail_next_list(&self, message: &str) {
        *self.fail_list.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    /// The next `replace_all_files` call fails with `message`.
    pub fn fail_next_replace(&self, message: &str) {
        *self.fail_replace.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list_all_files(
        &self,
        remote_id: &RemoteId,
        _token: &AuthToken,
    ) -> Result<Vec<RemoteFile>, SyncError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_list.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(api_err("listAllFiles", message));
        }
        Ok(self.files(remote_id))
    }

    async fn replace_all_files(
        &self,
        remote_id: &RemoteId,
        files: &[RemoteFile],
        _token: &AuthToken,
    ) -> Result<(), SyncError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self
            .fail_replace
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(api_err("replaceAllFiles", message));
        }
        for file in files {
            split_filename(&file.filename()).map_err(|e| api_err("replaceAllFiles", e))?;
        }
        let now = Utc::now();
        let stored = files
            .iter()
            .cloned()
            .map(|mut f| {
                f.modified_time.get_or_insert(now);
                f
            })
            .collect();
        self.projects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(remote_id.clone(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("secret-value");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
        assert_eq!(token.expose(), "secret-value");
    }

    #[tokio::test]
    async fn replace_overwrites_entire_project() {
        let remote = MemoryRemoteStore::new().with_project("p", &[("A.js", "a"), ("B.js", "b")]);
        let id = RemoteId::from("p");
        let token = AuthToken::new("t");
        let only = RemoteFile::from_filename("C.html", "c".into()).unwrap();
        remote.replace_all_files(&id, &[only], &token).await.unwrap();

        let names: Vec<_> = remote
            .list_all_files(&id, &token)
            .await
            .unwrap()
            .iter()
            .map(RemoteFile::filename)
            .collect();
        assert_eq!(names, vec!["C.html"]);
        assert_eq!(remote.replace_calls(), 1);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let remote = MemoryRemoteStore::new();
        let id = RemoteId::from("p");
        let token = AuthToken::new("t");
        remote.fail_next_list("quota exceeded");
        let err = remote.list_all_files(&id, &token).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(remote.list_all_files(&id, &token).await.is_ok());
    }
}
