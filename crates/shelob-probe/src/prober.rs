//! Timed HTTP probes.
//!
//! A probe is a single `GET /` over a fresh HTTP/1.1 connection. The
//! socket is wrapped in `TimedStream`, which stamps the first byte read,
//! so the measured latency covers connect + request + server time up to
//! the first response byte.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// One measurable target: a peer IP and the port it serves probes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// How a probe attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The peer answered 200.
    Success,
    /// No response was received (refused, reset, timed out).
    NetworkError,
    /// The peer answered with a status other than 200.
    UnexpectedStatus(u16),
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub source: String,
    pub destination: PeerAddress,
    /// Connect start to first response byte. `None` for `NetworkError`.
    pub latency_ms: Option<f64>,
    pub outcome: ProbeOutcome,
}

/// Measures round-trip latency to one peer.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, peer: &PeerAddress) -> ProbeResult;
}

/// Prober issuing `GET http://<peer>/` over a fresh connection.
#[derive(Debug, Clone)]
pub struct HttpProber {
    source: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(source: &str, timeout: Duration) -> Self {
        Self {
            source: source.to_string(),
            timeout,
        }
    }

}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, peer: &PeerAddress) -> ProbeResult {
        let (outcome, latency_ms) = match tokio::time::timeout(self.timeout, timed_get(peer)).await
        {
            Ok(Ok(timing)) => {
                let latency_ms = timing.elapsed.as_secs_f64() * 1e3;
                if timing.status == StatusCode::OK {
                    debug!(%peer, latency_ms, "probe succeeded");
                    (ProbeOutcome::Success, Some(latency_ms))
                } else {
                    warn!(
                        %peer,
                        status = timing.status.as_u16(),
                        latency_ms,
                        "unexpected status code while measuring latency"
                    );
                    (
                        ProbeOutcome::UnexpectedStatus(timing.status.as_u16()),
                        Some(latency_ms),
                    )
                }
            }
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "error measuring latency");
                (ProbeOutcome::NetworkError, None)
            }
            Err(_) => {
                warn!(%peer, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                (ProbeOutcome::NetworkError, None)
            }
        };

        ProbeResult {
            source: self.source.clone(),
            destination: peer.clone(),
            latency_ms,
            outcome,
        }
    }
}

#[derive(Debug, Error)]
enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("invalid request: {0}")]
    Build(#[source] http::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("response arrived without a timed first byte")]
    NoFirstByte,
}

struct Timing {
    status: StatusCode,
    elapsed: Duration,
}

async fn timed_get(peer: &PeerAddress) -> Result<Timing, ProbeError> {
    let authority = peer.to_string();
    let first_byte = Arc::new(OnceLock::new());

    let connect_start = Instant::now();
    let stream = TcpStream::connect((peer.ip.as_str(), peer.port))
        .await
        .map_err(ProbeError::Connect)?;

    let io = TokioIo::new(TimedStream::new(stream, Arc::clone(&first_byte)));
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(ProbeError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "probe connection closed with error");
        }
    });

    let req = http::Request::builder()
        .method(Method::GET)
        .uri("/")
        .header(HOST, &authority)
        .header(USER_AGENT, "shelob/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(ProbeError::Build)?;

    let resp = sender.send_request(req).await.map_err(ProbeError::Request)?;
    let status = resp.status();
    let first_byte = *first_byte.get().ok_or(ProbeError::NoFirstByte)?;

    // The body is never read; dropping it closes the connection.
    drop(resp);

    Ok(Timing {
        status,
        elapsed: first_byte.saturating_duration_since(connect_start),
    })
}

/// TCP stream that records when the first response byte was read.
struct TimedStream {
    inner: TcpStream,
    first_byte: Arc<OnceLock<Instant>>,
}

impl TimedStream {
    fn new(inner: TcpStream, first_byte: Arc<OnceLock<Instant>>) -> Self {
        Self { inner, first_byte }
    }
}

impl AsyncRead for TimedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            let _ = self.first_byte.set(Instant::now());
        }
        poll
    }
}

impl AsyncWrite for TimedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
