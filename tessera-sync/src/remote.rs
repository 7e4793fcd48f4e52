//! Remote client: the platform's CLI endpoints behind the [`Remote`] trait.
//!
//! # Endpoints
//!
//! | Call              | Request                                   | Timeout  |
//! |-------------------|-------------------------------------------|----------|
//! | upload            | `POST /api/cli/app/upload`                | bulk     |
//! | download          | `GET  /api/cli/app/download?appId&version`| bulk     |
//! | file list         | `GET  /api/cli/app/files?appId`           | metadata |
//! | conflict check    | `POST /api/cli/app/check-conflict`        | metadata |
//! | status            | `GET  /api/cli/app/status?appId`          | metadata |
//! | ping              | `GET  /health`                            | 10 s     |
//! | event             | `POST /api/cli/sync/event`                | metadata |
//!
//! Each HTTP call runs on a helper thread. The caller waits in short slices
//! so a fired [`CancelToken`] returns promptly; request bodies stop streaming
//! at the same moment, so the server never receives a complete cancelled
//! upload. Failed calls are never retried.

use std::io::{Cursor, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use tessera_core::{AppContext, AppId, ConfigError, Conflict, FileRecord, WatchEvent};

use crate::cancel::CancelToken;
use crate::error::RemoteError;

pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
pub const BULK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which a waiting caller re-checks its cancel token.
const POLL_SLICE: Duration = Duration::from_millis(50);
/// Extra time granted to the HTTP stack to report its own timeout.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One file carried by an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: String,
    pub content: Vec<u8>,
    pub hash: String,
}

/// Body of `POST /api/cli/app/upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub app_id: AppId,
    pub version: String,
    pub branch: String,
    pub message: String,
    pub author: String,
    pub files: Vec<UploadFile>,
    /// Paths removed locally since the last sync.
    pub deleted: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody<'a> {
    app_id: &'a str,
    version: &'a str,
    branch: &'a str,
    message: &'a str,
    author: &'a str,
    files: Vec<WireFile<'a>>,
    deleted: &'a [String],
}

#[derive(Serialize)]
struct WireFile<'a> {
    path: &'a str,
    /// Base64 (standard alphabet).
    content: String,
    hash: &'a str,
}

#[derive(Deserialize)]
struct VersionReply {
    #[serde(default)]
    version: String,
}

/// `{id, path}` indirection returned by the download endpoint instead of the
/// archive itself.
#[derive(Debug, Deserialize)]
struct DownloadPointer {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    path: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConflictCheckBody<'a> {
    app_id: &'a str,
    version: &'a str,
    files: Vec<FileHash<'a>>,
}

#[derive(Serialize)]
struct FileHash<'a> {
    path: &'a str,
    hash: &'a str,
}

/// Response of the conflict-check endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicts: Vec<Conflict>,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteStatus {
    pub app_id: String,
    pub version: String,
    pub branch: String,
    pub status: String,
    pub message: String,
    pub author: String,
    pub created_at: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileListReply {
    Bare(Vec<FileRecord>),
    Files { files: Vec<FileRecord> },
    Data { data: Vec<FileRecord> },
}

#[derive(Serialize)]
struct EventBody<'a> {
    #[serde(rename = "type")]
    kind: String,
    path: &'a str,
    root: &'a str,
}

// ---------------------------------------------------------------------------
// Remote trait
// ---------------------------------------------------------------------------

/// Operations the sync core needs from the platform.
pub trait Remote: Send + Sync {
    /// Upload a change set; returns the version the server recorded.
    fn upload_package(
        &self,
        request: &UploadRequest,
        cancel: &CancelToken,
    ) -> Result<String, RemoteError>;

    /// Download the zip archive of `version`.
    fn download_package(
        &self,
        app_id: &AppId,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, RemoteError>;

    fn fetch_file_list(
        &self,
        app_id: &AppId,
        cancel: &CancelToken,
    ) -> Result<Vec<FileRecord>, RemoteError>;

    fn check_conflicts(
        &self,
        app_id: &AppId,
        version: &str,
        files: &[FileRecord],
        cancel: &CancelToken,
    ) -> Result<ConflictReport, RemoteError>;

    fn fetch_status(&self, app_id: &AppId, cancel: &CancelToken)
        -> Result<RemoteStatus, RemoteError>;

    fn ping(&self, cancel: &CancelToken) -> Result<(), RemoteError>;

    /// Forward a watcher event. `root` is the project root as displayed.
    fn notify_event(
        &self,
        event: &WatchEvent,
        root: &str,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// HttpRemote
// ---------------------------------------------------------------------------

/// [`Remote`] over HTTP with `ureq`.
#[derive(Clone)]
pub struct HttpRemote {
    base: String,
    api_key: Option<String>,
    agent: ureq::Agent,
    metadata_timeout: Duration,
    bulk_timeout: Duration,
    ping_timeout: Duration,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base", &self.base)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("metadata_timeout", &self.metadata_timeout)
            .finish()
    }
}

/// Body and content type of a successful response.
struct Reply {
    content_type: String,
    body: Vec<u8>,
}

enum Method {
    Get,
    /// Serialized JSON body.
    Post(Vec<u8>),
}

/// Request body that stops yielding bytes once `cancel` fires, so a
/// cancelled upload is cut off mid-stream instead of completing in the
/// background.
struct CancellableBody {
    inner: Cursor<Vec<u8>>,
    cancel: CancelToken,
}

impl Read for CancellableBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Not `Interrupted`: `io::copy` retries those.
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "request cancelled",
            ));
        }
        self.inner.read(buf)
    }
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: None,
            agent: ureq::AgentBuilder::new().build(),
            metadata_timeout: METADATA_TIMEOUT,
            bulk_timeout: BULK_TIMEOUT,
            ping_timeout: PING_TIMEOUT,
        }
    }

    /// Endpoint, key and timeout from the application context.
    pub fn from_context(ctx: &AppContext) -> Result<Self, ConfigError> {
        let mut remote = Self::new(ctx.api_base()?).with_metadata_timeout(ctx.metadata_timeout());
        if let Some(key) = ctx.settings.api.key.as_deref().filter(|k| !k.is_empty()) {
            remote = remote.with_api_key(key);
        }
        Ok(remote)
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base, path)
        } else {
            format!("{}/{}", self.base, path)
        }
    }

    /// Run one request on a helper thread, honouring `cancel` and `timeout`.
    fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Reply, RemoteError> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let url = self.url(path);
        let verb = match method {
            Method::Get => "GET",
            Method::Post(_) => "POST",
        };
        let mut request = self.agent.request(verb, &url).timeout(timeout);
        for (key, value) in query {
            request = request.query(key, value);
        }
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        tracing::debug!("{verb} {url}");

        let body_cancel = cancel.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = match method {
                Method::Get => request.call(),
                Method::Post(body) => {
                    let length = body.len().to_string();
                    request
                        .set("Content-Type", "application/json")
                        .set("Content-Length", &length)
                        .send(CancellableBody {
                            inner: Cursor::new(body),
                            cancel: body_cancel,
                        })
                }
            };
            let _ = tx.send(into_reply(result, timeout));
        });

        let deadline = Instant::now() + timeout + DEADLINE_GRACE;
        loop {
            match rx.recv_timeout(POLL_SLICE) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        tracing::debug!("{verb} {url} cancelled");
                        return Err(RemoteError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        return Err(RemoteError::Timeout(timeout));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RemoteError::Transport(
                        "request worker exited without a reply".to_string(),
                    ));
                }
            }
        }
    }

    fn call_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancelToken,
    ) -> Result<T, RemoteError> {
        let reply = self.call(method, path, query, self.metadata_timeout, cancel)?;
        decode(&reply.body)
    }
}

fn into_reply(result: Result<ureq::Response, ureq::Error>, timeout: Duration) -> Result<Reply, RemoteError> {
    match result {
        Ok(response) => {
            let content_type = response.content_type().to_string();
            let body = read_capped(response.into_reader(), MAX_BODY_BYTES, timeout)?;
            Ok(Reply { content_type, body })
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
        Err(ureq::Error::Transport(transport)) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|s| s.downcast_ref::<std::io::Error>())
                .is_some_and(|e| is_timeout(e.kind()))
                || transport.to_string().contains("timed out");
            if timed_out {
                Err(RemoteError::Timeout(timeout))
            } else {
                Err(RemoteError::Transport(transport.to_string()))
            }
        }
    }
}

/// Read a whole reply body, failing instead of truncating past `limit` bytes.
fn read_capped(reader: impl Read, limit: u64, timeout: Duration) -> Result<Vec<u8>, RemoteError> {
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|e| io_to_remote(e, timeout))?;
    if body.len() as u64 > limit {
        return Err(RemoteError::Decode(format!(
            "response body exceeds {limit} bytes"
        )));
    }
    Ok(body)
}

fn is_timeout(kind: std::io::ErrorKind) -> bool {
    matches!(kind, std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
}

fn io_to_remote(err: std::io::Error, timeout: Duration) -> RemoteError {
    if is_timeout(err.kind()) {
        RemoteError::Timeout(timeout)
    } else {
        RemoteError::Transport(err.to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, RemoteError> {
    serde_json::from_slice(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn to_body<T: Serialize>(body: &T) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

impl Remote for HttpRemote {
    fn upload_package(
        &self,
        request: &UploadRequest,
        cancel: &CancelToken,
    ) -> Result<String, RemoteError> {
        let body = UploadBody {
            app_id: &request.app_id.0,
            version: &request.version,
            branch: &request.branch,
            message: &request.message,
            author: &request.author,
            files: request
                .files
                .iter()
                .map(|f| WireFile {
                    path: &f.path,
                    content: BASE64.encode(&f.content),
                    hash: &f.hash,
                })
                .collect(),
            deleted: &request.deleted,
        };
        let reply = self.call(
            Method::Post(to_body(&body)?),
            "/api/cli/app/upload",
            &[],
            self.bulk_timeout,
            cancel,
        )?;
        let parsed: VersionReply = decode(&reply.body)?;
        if parsed.version.is_empty() {
            Ok(request.version.clone())
        } else {
            Ok(parsed.version)
        }
    }

    fn download_package(
        &self,
        app_id: &AppId,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, RemoteError> {
        let reply = self.call(
            Method::Get,
            "/api/cli/app/download",
            &[("appId", app_id.0.as_str()), ("version", version)],
            self.bulk_timeout,
            cancel,
        )?;
        if !reply.content_type.contains("json") {
            return Ok(reply.body);
        }

        let pointer: DownloadPointer = decode(&reply.body)?;
        if pointer.path.is_empty() {
            return Err(RemoteError::Decode(
                "download reply has neither an archive nor a path".to_string(),
            ));
        }
        tracing::debug!("following download pointer {} -> {}", pointer.id, pointer.path);
        let archive = self.call(Method::Get, &pointer.path, &[], self.bulk_timeout, cancel)?;
        Ok(archive.body)
    }

    fn fetch_file_list(
        &self,
        app_id: &AppId,
        cancel: &CancelToken,
    ) -> Result<Vec<FileRecord>, RemoteError> {
        let reply: FileListReply =
            self.call_json(Method::Get, "/api/cli/app/files", &[("appId", app_id.0.as_str())], cancel)?;
        let mut files = match reply {
            FileListReply::Bare(files)
            | FileListReply::Files { files }
            | FileListReply::Data { data: files } => files,
        };
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn check_conflicts(
        &self,
        app_id: &AppId,
        version: &str,
        files: &[FileRecord],
        cancel: &CancelToken,
    ) -> Result<ConflictReport, RemoteError> {
        let body = ConflictCheckBody {
            app_id: &app_id.0,
            version,
            files: files
                .iter()
                .map(|f| FileHash {
                    path: &f.path,
                    hash: &f.hash,
                })
                .collect(),
        };
        self.call_json(
            Method::Post(to_body(&body)?),
            "/api/cli/app/check-conflict",
            &[],
            cancel,
        )
    }

    fn fetch_status(
        &self,
        app_id: &AppId,
        cancel: &CancelToken,
    ) -> Result<RemoteStatus, RemoteError> {
        self.call_json(Method::Get, "/api/cli/app/status", &[("appId", app_id.0.as_str())], cancel)
    }

    fn ping(&self, cancel: &CancelToken) -> Result<(), RemoteError> {
        self.call(Method::Get, "/health", &[], self.ping_timeout, cancel)
            .map(|_| ())
    }

    fn notify_event(
        &self,
        event: &WatchEvent,
        root: &str,
        cancel: &CancelToken,
    ) -> Result<(), RemoteError> {
        let body = EventBody {
            kind: event.kind.to_string(),
            path: &event.path,
            root,
        };
        self.call(
            Method::Post(to_body(&body)?),
            "/api/cli/sync/event",
            &[],
            self.metadata_timeout,
            cancel,
        )
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_relative_and_absolute_paths() {
        let remote = HttpRemote::new("http://h:1/");
        assert_eq!(remote.url("/health"), "http://h:1/health");
        assert_eq!(remote.url("files/x.zip"), "http://h:1/files/x.zip");
        assert_eq!(remote.url("https://cdn/x.zip"), "https://cdn/x.zip");
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let remote = HttpRemote::new("http://127.0.0.1:9");
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(remote.ping(&cancel), Err(RemoteError::Cancelled)));
    }

    #[test]
    fn cancellable_body_stops_once_cancelled() {
        let cancel = CancelToken::new();
        let mut body = CancellableBody {
            inner: Cursor::new(vec![7u8; 64]),
            cancel: cancel.clone(),
        };
        let mut buf = [0u8; 16];
        assert_eq!(body.read(&mut buf).unwrap(), 16);
        cancel.cancel();
        let err = body.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn oversized_bodies_are_rejected_not_truncated() {
        let timeout = Duration::from_secs(1);
        let exact = read_capped(&b"12345678"[..], 8, timeout).unwrap();
        assert_eq!(exact.len(), 8);
        let err = read_capped(&b"123456789"[..], 8, timeout).unwrap_err();
        assert!(matches!(err, RemoteError::Decode(ref m) if m.contains("exceeds 8 bytes")), "{err:?}");
    }

    #[test]
    fn debug_hides_api_key() {
        let remote = HttpRemote::new("http://h").with_api_key("secret");
        assert!(!format!("{remote:?}").contains("secret"));
    }

    #[test]
    fn file_list_accepts_wrapped_and_bare_shapes() {
        let bare: FileListReply =
            serde_json::from_str(r#"[{"path":"a.json","hash":"h","type":"model"}]"#).unwrap();
        let wrapped: FileListReply =
            serde_json::from_str(r#"{"files":[{"path":"a.json","hash":"h"}]}"#).unwrap();
        for reply in [bare, wrapped] {
            let files = match reply {
                FileListReply::Bare(f) | FileListReply::Files { files: f } | FileListReply::Data { data: f } => f,
            };
            assert_eq!(files[0].path, "a.json");
        }
    }

    #[test]
    fn upload_body_is_base64_and_camel_case() {
        let body = UploadBody {
            app_id: "A",
            version: "v",
            branch: "main",
            message: "m",
            author: "me",
            files: vec![WireFile {
                path: "p",
                content: BASE64.encode(b"hi"),
                hash: "h",
            }],
            deleted: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["appId"], "A");
        assert_eq!(json["files"][0]["content"], "aGk=");
        assert!(json["deleted"].as_array().unwrap().is_empty());
    }
}
