//! HTTP/1.1 hosting for a [`JsgiServlet`].
//!
//! Each request body is buffered up to a size cap, then the servlet runs on
//! the blocking pool so the handler owns a thread for the duration of the call.

use crate::continuation::Continuation;
use crate::error::ServletError;
use crate::servlet::{JsgiServlet, Outcome};
use crate::transport::{JsgiRequest, JsgiResponse};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const KB: usize = 1024;
const MB: usize = 1024 * KB;

/// Largest request body buffered by default (10 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * MB;

/// Serves one servlet over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct JsgiServer {
    servlet: Arc<JsgiServlet>,
    continuation_timeout: Option<Duration>,
    max_body_size: usize,
}

impl JsgiServer {
    pub fn new(servlet: JsgiServlet) -> Self {
        Self {
            servlet: Arc::new(servlet),
            continuation_timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Requests with a larger body are answered with `413`.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Requests still waiting for a blocking thread after `timeout` are
    /// skipped with `503`.
    pub fn with_continuation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.continuation_timeout = timeout;
        self
    }

    pub fn servlet(&self) -> &Arc<JsgiServlet> {
        &self.servlet
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn listen(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Accept connections on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %listener.local_addr()?, servlet = self.servlet.name(), "JSGI server listening");
        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => accepted?,
                () = &mut shutdown => {
                    info!("JSGI server shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move { server.handle(req, Some(remote)).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(remote = %remote, error = %err, "Error serving connection");
                }
            });
        }
    }

    /// Run one HTTP request through the servlet.
    pub async fn handle<B>(
        &self,
        req: Request<B>,
        remote: Option<SocketAddr>,
    ) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                warn!(limit = self.max_body_size, "Request body too large");
                return Ok(empty(StatusCode::PAYLOAD_TOO_LARGE));
            }
            Err(err) => {
                warn!(error = %err, "Failed to read request body");
                return Ok(empty(StatusCode::BAD_REQUEST));
            }
        };

        let mut request = JsgiRequest::from_parts(parts, body);
        if let Some(addr) = remote {
            request = request.with_remote_addr(addr);
        }
        if let Some(timeout) = self.continuation_timeout {
            request = request.with_continuation(Arc::new(Continuation::with_timeout(timeout)));
        }

        let response = JsgiResponse::new();
        let servlet = Arc::clone(&self.servlet);
        let written = response.clone();
        let outcome =
            tokio::task::spawn_blocking(move || servlet.service(request, &written)).await;

        Ok(match outcome {
            Ok(Ok(Outcome::Completed)) => to_http(&response),
            Ok(Ok(Outcome::Skipped)) => empty(StatusCode::SERVICE_UNAVAILABLE),
            Ok(Err(ServletError::Request(_) | ServletError::Init(_))) => {
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(join) => {
                error!(error = %join, "JSGI worker thread failed");
                empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        })
    }
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn to_http(response: &JsgiResponse) -> Response<Full<Bytes>> {
    let Ok(status) = StatusCode::from_u16(response.status()) else {
        error!(status = response.status(), "Handler produced an unusable status");
        return empty(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let mut http = Response::new(Full::new(response.body()));
    *http.status_mut() = status;
    for (name, value) in response.headers() {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().append(name, value);
            }
            _ => {
                error!(header = %name, "Handler produced an invalid header");
                return empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }
    http
}
