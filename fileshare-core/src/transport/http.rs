// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Synchronous HTTP transport.
//!
//! Routes:
//! - `GET /files` lists stored files
//! - `PUT /file?name=<name>` stores the request body
//! - `GET /file?name=<name>` returns the raw bytes
//!
//! List and upload always answer with a JSON [`ResponseEnvelope`]. A
//! successful download answers with the raw bytes; a failed one with a JSON
//! envelope and a 4xx status.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::{FileTransport, TransportKind};
use crate::error::{FileshareError, FileshareResult, RpcError, RpcResult};
use crate::protocol::{Operation, RequestEnvelope, ResponseEnvelope};
use crate::service::FileHandler;

/// Largest request body the server accepts.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FileQuery {
    name: Option<String>,
}

/// Router serving the file service over `handler`.
pub fn router(handler: FileHandler) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route("/file", get(download_file).put(upload_file))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let status = if envelope.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(envelope)).into_response()
}

async fn list_files(State(handler): State<FileHandler>) -> Response {
    envelope_response(handler.handle(RequestEnvelope::list()).await)
}

async fn upload_file(
    State(handler): State<FileHandler>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Response {
    let name = query.name.unwrap_or_default();
    envelope_response(handler.handle(RequestEnvelope::upload(name, body.to_vec())).await)
}

async fn download_file(State(handler): State<FileHandler>, Query(query): Query<FileQuery>) -> Response {
    let name = query.name.unwrap_or_default();
    let reply = handler.handle(RequestEnvelope::download(name)).await;

    match reply.payload {
        Some(payload) if reply.success => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            payload,
        )
            .into_response(),
        _ => {
            let status = if reply.message.starts_with("download failed") {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(reply)).into_response()
        }
    }
}

/// Running HTTP server.
pub struct HttpFileServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl HttpFileServer {
    /// Bind `addr` and start serving. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, handler: FileHandler) -> FileshareResult<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| FileshareError::Io {
                context: "binding HTTP listener",
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| FileshareError::Io {
            context: "reading HTTP listener address",
            source,
        })?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = router(handler);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        tracing::info!("HTTP file server listening on http://{}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL clients should use.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Block until the server stops on its own.
    pub async fn wait(self) -> FileshareResult<()> {
        let Self { shutdown, task, .. } = self;
        let result = task.await;
        drop(shutdown);
        flatten(result)
    }

    pub async fn shutdown(self) -> FileshareResult<()> {
        let _ = self.shutdown.send(());
        flatten(self.task.await)
    }
}

fn flatten(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> FileshareResult<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(FileshareError::Io {
            context: "serving HTTP",
            source,
        }),
        Err(e) => Err(FileshareError::Io {
            context: "HTTP server task",
            source: std::io::Error::other(e),
        }),
    }
}

/// HTTP client session.
#[derive(Debug, Clone)]
pub struct HttpFileClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpFileClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Reuse an existing client and its connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, name: Option<&str>) -> RpcResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| RpcError::Transport(format!("invalid URL: {}", e)))?;
        if let Some(name) = name {
            url.query_pairs_mut().append_pair("name", name);
        }
        Ok(url)
    }

    fn map_error(&self, err: reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::Timeout(self.timeout)
        } else if err.is_connect() {
            RpcError::Connect {
                address: self.base_url.clone(),
                reason: err.to_string(),
            }
        } else {
            RpcError::Transport(err.to_string())
        }
    }

    async fn envelope(&self, response: reqwest::Response) -> RpcResult<ResponseEnvelope> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        match ResponseEnvelope::from_json(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                Ok(ResponseEnvelope::failure(format!("HTTP {}", status)))
            }
            Err(e) => Err(RpcError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl FileTransport for HttpFileClient {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn execute(&self, request: RequestEnvelope) -> RpcResult<ResponseEnvelope> {
        let name = request.file_name_or_empty().to_string();
        match request.operation {
            Operation::List => {
                let response = self
                    .client
                    .get(self.url("/files", None)?)
                    .send()
                    .await
                    .map_err(|e| self.map_error(e))?;
                self.envelope(response).await
            }
            Operation::Upload => {
                let response = self
                    .client
                    .put(self.url("/file", Some(&name))?)
                    .body(request.payload.unwrap_or_default())
                    .send()
                    .await
                    .map_err(|e| self.map_error(e))?;
                self.envelope(response).await
            }
            Operation::Download => {
                let response = self
                    .client
                    .get(self.url("/file", Some(&name))?)
                    .send()
                    .await
                    .map_err(|e| self.map_error(e))?;
                if !response.status().is_success() {
                    return self.envelope(response).await;
                }
                let payload = response.bytes().await.map_err(|e| self.map_error(e))?;
                Ok(ResponseEnvelope::downloaded(&name, payload.to_vec()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    async fn serve() -> HttpFileServer {
        let handler = FileHandler::new(Arc::new(MemoryStorage::new()));
        HttpFileServer::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_download_list() {
        let server = serve().await;
        let client = HttpFileClient::new(server.url(), Duration::from_secs(5)).unwrap();

        let uploaded = client.upload("a b.dat", b"hello").await.unwrap();
        assert!(uploaded.success, "{}", uploaded.message);

        let downloaded = client.download("a b.dat").await.unwrap();
        assert!(downloaded.success);
        assert_eq!(downloaded.payload.as_deref(), Some(&b"hello"[..]));

        let listed = client.list().await.unwrap();
        assert_eq!(listed.files, Some(vec!["a b.dat".to_string()]));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_envelopes() {
        let server = serve().await;
        let client = HttpFileClient::new(server.url(), Duration::from_secs(5)).unwrap();

        let missing = client.download("ghost.dat").await.unwrap();
        assert!(!missing.success);
        assert!(missing.payload.is_none());

        let empty = client.upload("x.dat", b"").await.unwrap();
        assert!(!empty.success);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let server = serve().await;
        let url = server.url();
        server.shutdown().await.unwrap();

        let client = HttpFileClient::new(url, Duration::from_secs(2)).unwrap();
        assert!(client.list().await.is_err());
    }
}
