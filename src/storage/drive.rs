//! Google Drive v3 storage for documents.
//!
//! Documents live as `text/plain` files inside one dedicated folder. The
//! folder id is cached in a small state file and re-verified before use.

use crate::util::truncate_with_ellipsis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const TEXT_MIME: &str = "text/plain";
const MULTIPART_BOUNDARY: &str = "-------314159265358979323846";
const LIST_PAGE_SIZE: &str = "50";
const MAX_ERROR_BODY_CHARS: usize = 300;

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DriveError {
    /// HTTP 401: the token is no longer accepted and should be discarded.
    #[error("Google session expired or was revoked. Sign in again with `codebuddy drive login`")]
    Unauthorized,
    #[error("Drive {operation} failed: {status} {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

// ── Data types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "webViewLink")]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct FolderCheck {
    id: String,
    #[serde(default, rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct FolderState {
    folder_id: String,
}

/// `multipart/related` body for a create-with-content upload.
pub fn multipart_body(metadata: &serde_json::Value, content: &str) -> String {
    let delimiter = format!("\r\n--{MULTIPART_BOUNDARY}\r\n");
    let close = format!("\r\n--{MULTIPART_BOUNDARY}--");
    format!(
        "{delimiter}Content-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\
         {delimiter}Content-Type: {TEXT_MIME}\r\n\r\n{content}{close}"
    )
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
    folder_name: String,
    state_path: Option<PathBuf>,
}

impl DriveClient {
    pub fn new(api_base: &str, access_token: &str, folder_name: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            folder_name: folder_name.to_string(),
            state_path: None,
        })
    }

    /// Persist the resolved folder id at `path` between runs.
    #[must_use]
    pub fn with_folder_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn check(
        operation: &'static str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, DriveError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DriveError::Unauthorized);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DriveError::Http {
            operation,
            status: status.as_u16(),
            body: truncate_with_ellipsis(body.trim(), MAX_ERROR_BODY_CHARS),
        })
    }

    fn cached_folder_id(&self) -> Option<String> {
        let path = self.state_path.as_deref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str::<FolderState>(&raw)
            .ok()
            .map(|state| state.folder_id)
            .filter(|id| !id.is_empty())
    }

    fn store_folder_id(&self, folder_id: Option<&str>) {
        let Some(path) = self.state_path.as_deref() else {
            return;
        };
        let result = match folder_id {
            Some(id) => write_state(path, id),
            None => std::fs::remove_file(path).or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            }),
        };
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "drive.folder_cache_write_failed");
        }
    }

    // ── Folder ──────────────────────────────────────────────────

    /// Resolve the documents folder: cached id, then search by name, then create.
    pub async fn ensure_folder(&self) -> anyhow::Result<String> {
        if let Some(cached) = self.cached_folder_id() {
            if self.verify_folder(&cached).await? {
                return Ok(cached);
            }
            tracing::debug!(folder = %cached, "drive.folder_cache_stale");
            self.store_folder_id(None);
        }

        if let Some(found) = self.find_folder().await? {
            self.store_folder_id(Some(&found));
            return Ok(found);
        }

        let created = self.create_folder().await?;
        tracing::info!(folder = %created, name = %self.folder_name, "drive.folder_created");
        self.store_folder_id(Some(&created));
        Ok(created)
    }

    async fn verify_folder(&self, id: &str) -> anyhow::Result<bool> {
        let resp = self
            .http
            .get(self.url(&format!("/drive/v3/files/{}", urlencoding::encode(id))))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id,name,mimeType,trashed")])
            .send()
            .await?;

        match Self::check("folder check", resp).await {
            Ok(resp) => Ok(resp
                .json::<FolderCheck>()
                .await
                .map(|f| f.mime_type == FOLDER_MIME && !f.trashed && f.id == id)
                .unwrap_or(false)),
            Err(DriveError::Unauthorized) => Err(DriveError::Unauthorized.into()),
            Err(_) => Ok(false),
        }
    }

    async fn find_folder(&self) -> anyhow::Result<Option<String>> {
        let q = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query_literal(&self.folder_name)
        );
        let resp = self
            .http
            .get(self.url("/drive/v3/files"))
            .bearer_auth(&self.access_token)
            .query(&[("pageSize", "10"), ("fields", "files(id,name)"), ("q", q.as_str())])
            .send()
            .await?;
        let list: FileList = Self::check("folder search", resp).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(self.url("/drive/v3/files"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "name": self.folder_name,
                "mimeType": FOLDER_MIME,
            }))
            .send()
            .await?;
        let folder: DriveFile = Self::check("folder create", resp).await?.json().await?;
        Ok(folder.id)
    }

    // ── Files ───────────────────────────────────────────────────

    /// Plain-text, non-trashed files in the documents folder.
    pub async fn list_files(&self) -> anyhow::Result<Vec<DriveFile>> {
        let folder = self.ensure_folder().await?;
        let q = format!(
            "trashed = false and mimeType = '{TEXT_MIME}' and '{}' in parents",
            escape_query_literal(&folder)
        );
        let resp = self
            .http
            .get(self.url("/drive/v3/files"))
            .bearer_auth(&self.access_token)
            .query(&[
                ("pageSize", LIST_PAGE_SIZE),
                ("fields", "files(id,name,mimeType)"),
                ("q", q.as_str()),
            ])
            .send()
            .await?;
        let list: FileList = Self::check("list", resp).await?.json().await?;
        Ok(list.files)
    }

    /// Create `name` in the documents folder with `content`.
    ///
    /// If the folder cannot be resolved (other than an expired session) the
    /// file is created at the Drive root instead.
    pub async fn upload(&self, name: &str, content: &str) -> anyhow::Result<UploadedFile> {
        let folder = match self.ensure_folder().await {
            Ok(folder) => Some(folder),
            Err(err) if is_unauthorized(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "drive.folder_unavailable");
                None
            }
        };

        let mut metadata = serde_json::json!({ "name": name, "mimeType": TEXT_MIME });
        if let Some(folder) = folder {
            metadata["parents"] = serde_json::json!([folder]);
        }

        let resp = self
            .http
            .post(self.url("/upload/drive/v3/files"))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id,name,webViewLink")])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_body(&metadata, content))
            .send()
            .await?;
        let uploaded: UploadedFile = Self::check("upload", resp).await?.json().await?;
        tracing::info!(file = %uploaded.id, name, "drive.uploaded");
        Ok(uploaded)
    }

    /// File content as text.
    pub async fn download(&self, file_id: &str) -> anyhow::Result<String> {
        let resp = self
            .http
            .get(self.url(&format!("/drive/v3/files/{}", urlencoding::encode(file_id))))
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        Ok(Self::check("download", resp).await?.text().await?)
    }

    pub async fn delete(&self, file_id: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/drive/v3/files/{}", urlencoding::encode(file_id))))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check("delete", resp).await?;
        tracing::info!(file = %file_id, "drive.deleted");
        Ok(())
    }

    /// Profile of the signed-in account.
    pub async fn user_info(&self) -> anyhow::Result<UserInfo> {
        let resp = self
            .http
            .get(self.url("/oauth2/v3/userinfo"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(Self::check("user info", resp).await?.json().await?)
    }
}

fn write_state(path: &Path, folder_id: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let state = FolderState {
        folder_id: folder_id.to_string(),
    };
    let json = serde_json::to_string(&state).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// True when `err` is (or wraps) an HTTP 401 from Drive.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<DriveError>(), Some(DriveError::Unauthorized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_layout() {
        let metadata = serde_json::json!({ "name": "a.py" });
        let body = multipart_body(&metadata, "print(1)\n");
        assert_eq!(
            body,
            "\r\n---------314159265358979323846\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.py\"}\
             \r\n---------314159265358979323846\r\n\
             Content-Type: text/plain\r\n\r\nprint(1)\n\
             \r\n---------314159265358979323846--"
        );
    }

    #[test]
    fn query_literals_are_escaped() {
        assert_eq!(escape_query_literal("Bob's"), "Bob\\'s");
        assert_eq!(escape_query_literal("CodeBuddy"), "CodeBuddy");
    }

    #[test]
    fn unauthorized_is_detectable_through_anyhow() {
        let err: anyhow::Error = DriveError::Unauthorized.into();
        assert!(is_unauthorized(&err));
        let other: anyhow::Error = DriveError::Http {
            operation: "list",
            status: 500,
            body: String::new(),
        }
        .into();
        assert!(!is_unauthorized(&other));
    }

    #[test]
    fn folder_cache_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let client = DriveClient::new("http://localhost", "t", "CodeBuddy")
            .unwrap()
            .with_folder_cache(tmp.path().join("drive_state.json"));
        assert_eq!(client.cached_folder_id(), None);
        client.store_folder_id(Some("folder-1"));
        assert_eq!(client.cached_folder_id().as_deref(), Some("folder-1"));
        client.store_folder_id(None);
        assert_eq!(client.cached_folder_id(), None);
    }
}
