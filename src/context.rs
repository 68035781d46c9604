use crate::{Error, Result};
use bytes::Bytes;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// Context provides the capabilities the helpers need to talk to the
/// outside world: HTTP sending, file reading and environment access.
///
/// No default implementations are wired in. Any unconfigured component uses
/// a no-op implementation that returns errors or empty values when called,
/// so tests can run with exactly the capabilities they grant.
///
/// ## Example
///
/// ```
/// use gcp_identity::{Context, OsEnv, ReqwestHttpSend, TokioFileRead};
///
/// let ctx = Context::new()
///     .with_file_read(TokioFileRead)
///     .with_http_send(ReqwestHttpSend::default())
///     .with_env(OsEnv);
/// ```
#[derive(Clone)]
pub struct Context {
    fs: Arc<dyn FileRead>,
    http: Arc<dyn HttpSend>,
    env: Arc<dyn Env>,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("fs", &self.fs)
            .field("http", &self.http)
            .field("env", &self.env)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a new Context with no-op implementations.
    pub fn new() -> Self {
        Self {
            fs: Arc::new(NoopFileRead),
            http: Arc::new(NoopHttpSend),
            env: Arc::new(NoopEnv),
        }
    }

    /// Replace the file reader implementation.
    pub fn with_file_read(mut self, fs: impl FileRead) -> Self {
        self.fs = Arc::new(fs);
        self
    }

    /// Replace the HTTP client implementation.
    pub fn with_http_send(mut self, http: impl HttpSend) -> Self {
        self.http = Arc::new(http);
        self
    }

    /// Replace the environment implementation.
    pub fn with_env(mut self, env: impl Env) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Read the file content entirely in `Vec<u8>`.
    #[inline]
    pub async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.file_read(path).await
    }

    /// Send http request and return the response.
    #[inline]
    pub async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.http.http_send(req).await
    }

    /// Send http request and return the response as string.
    pub async fn http_send_as_string(
        &self,
        req: http::Request<Bytes>,
    ) -> Result<http::Response<String>> {
        let (parts, body) = self.http.http_send(req).await?.into_parts();
        let body = String::from_utf8_lossy(&body).to_string();
        Ok(http::Response::from_parts(parts, body))
    }

    /// Get the environment variable.
    ///
    /// - Returns `Some(v)` if the environment variable is found and is valid utf-8.
    /// - Returns `None` if the environment variable is not found or value is invalid.
    #[inline]
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.var(key)
    }
}

/// FileRead is used to read the file content entirely in `Vec<u8>`.
///
/// The credential chain uses this to load key files without binding the
/// crate to a particular async runtime.
#[async_trait::async_trait]
pub trait FileRead: Debug + Send + Sync + 'static {
    /// Read the file content entirely in `Vec<u8>`.
    async fn file_read(&self, path: &str) -> Result<Vec<u8>>;
}

/// HttpSend is used to send http requests during credential loading,
/// metadata lookups, blob signing and key-set fetching.
///
/// Callers wanting deadlines impose them here (e.g. a reqwest client built
/// with a timeout); none of the operations in this crate add their own.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send http request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// Env gives access to process environment variables.
pub trait Env: Debug + Send + Sync + 'static {
    /// Get an environment variable.
    fn var(&self, key: &str) -> Option<String>;
}

/// Implements Env for the OS environment.
#[derive(Debug, Copy, Clone)]
pub struct OsEnv;

impl Env for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var_os(key)?.into_string().ok()
    }
}

/// StaticEnv provides a fixed set of environment variables.
///
/// This is useful for testing or for providing a fixed environment.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    /// The environment variables to use.
    pub envs: HashMap<String, String>,
}

impl Env for StaticEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.envs.get(key).cloned()
    }
}

/// NoopFileRead is a no-op implementation that always returns an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFileRead;

#[async_trait::async_trait]
impl FileRead for NoopFileRead {
    async fn file_read(&self, _path: &str) -> Result<Vec<u8>> {
        Err(Error::unexpected(
            "file reading not supported: no file reader configured",
        ))
    }
}

/// NoopHttpSend is a no-op implementation that always returns an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHttpSend;

#[async_trait::async_trait]
impl HttpSend for NoopHttpSend {
    async fn http_send(&self, _req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        Err(Error::unexpected(
            "HTTP sending not supported: no HTTP client configured",
        ))
    }
}

/// NoopEnv is a no-op implementation that always returns None.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnv;

impl Env for NoopEnv {
    fn var(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Tokio-based implementation of the [`FileRead`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileRead;

#[async_trait::async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::unexpected("failed to read file").with_source(e))
    }
}

/// Reqwest-based implementation of the [`HttpSend`] trait.
#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: reqwest::Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = reqwest::Request::try_from(req)
            .map_err(|e| Error::request_invalid("failed to convert request").with_source(e))?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::unexpected("failed to send HTTP request").with_source(e))?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::unexpected("failed to read response body").with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

/// StaticHttpSend serves fixed responses from an in-memory route table and
/// records every request URI it sees.
///
/// This is the HTTP counterpart of [`StaticEnv`]: tests register full URIs
/// with [`with_response`](Self::with_response) and later assert on
/// [`request_count`](Self::request_count) / [`requests`](Self::requests) to
/// prove an operation made (or skipped) a network call. Unregistered URIs
/// get an empty `404`.
#[derive(Debug, Clone, Default)]
pub struct StaticHttpSend {
    routes: HashMap<String, (u16, String)>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StaticHttpSend {
    /// Create an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response for the given full request URI.
    pub fn with_response(
        mut self,
        uri: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.routes.insert(uri.into(), (status, body.into()));
        self
    }

    /// All request URIs seen so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }

    /// Number of requests seen for one URI.
    pub fn request_count_for(&self, uri: &str) -> usize {
        self.requests
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|u| u.as_str() == uri)
            .count()
    }
}

#[async_trait::async_trait]
impl HttpSend for StaticHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let uri = req.uri().to_string();
        self.requests.lock().expect("lock poisoned").push(uri.clone());

        let (status, body) = self
            .routes
            .get(&uri)
            .cloned()
            .unwrap_or((404, String::new()));

        let resp = http::Response::builder()
            .status(status)
            .body(Bytes::from(body))?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_context_errors() {
        let ctx = Context::new();
        assert!(ctx.file_read("/etc/hostname").await.is_err());
        assert!(ctx.env_var("HOME").is_none());
    }

    #[tokio::test]
    async fn test_static_http_send_routes_and_counts() {
        let http = StaticHttpSend::new().with_response("http://example.com/ok", 200, "hello");
        let ctx = Context::new().with_http_send(http.clone());

        let req = http::Request::builder()
            .uri("http://example.com/ok")
            .body(Bytes::new())
            .unwrap();
        let resp = ctx.http_send_as_string(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body(), "hello");

        let req = http::Request::builder()
            .uri("http://example.com/missing")
            .body(Bytes::new())
            .unwrap();
        let resp = ctx.http_send(req).await.unwrap();
        assert_eq!(resp.status(), 404);

        assert_eq!(http.request_count(), 2);
        assert_eq!(http.request_count_for("http://example.com/ok"), 1);
    }

    #[test]
    fn test_static_env() {
        let env = StaticEnv {
            envs: HashMap::from([("KEY".to_string(), "value".to_string())]),
        };
        let ctx = Context::new().with_env(env);
        assert_eq!(ctx.env_var("KEY").as_deref(), Some("value"));
        assert!(ctx.env_var("OTHER").is_none());
    }
}
