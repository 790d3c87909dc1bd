//! One-request-per-connection streaming transport.
//!
//! Every send dials a fresh connection; the links this runs over are flaky
//! enough that connection reuse corrupts silently. The request is a minimal
//! HTTP/1.1 upload: exact `Content-Length` up front, body optionally chunked
//! into fixed-size writes (large single writes trip soft link stacks), then
//! a loose scan of the response for a 2xx status marker. Full HTTP parsing
//! is deliberately not required on either side.

use bytes::Bytes;
use duolens_core::{Payload, StreamMode, wire};
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// At most this much of a response is read before classifying it.
const MAX_RESPONSE_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),

    #[error("no response within timeout")]
    Timeout,

    #[error("response carried no success marker")]
    Rejected,
}

/// Per-send tunables.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub chunk_bytes: usize,
    pub response_timeout: Duration,
    /// Extra attempts after the first, all against fresh connections.
    pub retries: u32,
    pub retry_pause: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 512,
            response_timeout: Duration::from_secs(12),
            retries: 2,
            retry_pause: Duration::from_millis(250),
        }
    }
}

/// Connection factory seam. Production dials TCP; tests hand out in-memory
/// duplex streams.
pub trait Dial: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Dials the collector over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Dial for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send {
        TcpStream::connect(self.addr.clone())
    }
}

/// A length-delimited upload request.
#[derive(Debug, Clone)]
pub struct Request {
    method: &'static str,
    path: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    pub fn post(path: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: "POST",
            path: path.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET",
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build the upload request for an encoded payload: path keyed by the
    /// payload kind, geometry headers for raw uploads, lane tag, and the
    /// optional frame id.
    pub fn upload(payload: &Payload, send_frame_id: bool) -> Self {
        let (path, content_type) = match payload.kind {
            StreamMode::Compressed => (wire::JPEG_UPLOAD_PATH, "image/jpeg"),
            StreamMode::Raw => (wire::RAW_UPLOAD_PATH, "application/octet-stream"),
        };
        let mut req = Request::post(path, payload.bytes.clone())
            .header("Content-Type", content_type)
            .header(wire::HDR_SIDE, payload.lane.to_string());
        if payload.kind == StreamMode::Raw {
            req = req
                .header(wire::HDR_WIDTH, payload.width.to_string())
                .header(wire::HDR_HEIGHT, payload.height.to_string())
                .header(wire::HDR_PIXEL_FORMAT, payload.format.as_str());
        }
        if send_frame_id {
            req = req.header(wire::HDR_FRAME_ID, payload.tag());
        }
        req
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Request line and headers, with the accurate Content-Length the link
    /// needs to delimit the body.
    fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!("{} {} HTTP/1.1\r\n", self.method, self.path).into_bytes();
        for (name, value) in &self.headers {
            head.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        head.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        head.extend_from_slice(b"Connection: close\r\n\r\n");
        head
    }
}

/// True when the status line carries a 2xx code. A loose scan, not a parse:
/// the second whitespace-separated token's first digit decides.
fn is_success(response: &[u8]) -> bool {
    let line_end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(response.len());
    let line = &response[..line_end];
    let mut tokens = line.split(|b| *b == b' ').filter(|t| !t.is_empty());
    let (Some(proto), Some(status)) = (tokens.next(), tokens.next()) else {
        return false;
    };
    proto.starts_with(b"HTTP/") && status.first() == Some(&b'2')
}

async fn read_response<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut response = Vec::new();
    let mut buf = [0u8; 256];
    while response.len() < MAX_RESPONSE_BYTES {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
        // The status line is all the classification needs.
        if response.windows(2).any(|w| w == b"\r\n") {
            break;
        }
    }
    Ok(response)
}

/// One attempt: dial, write head and body, classify the response.
async fn send_once<D: Dial>(
    dialer: &D,
    request: &Request,
    cfg: &TransportConfig,
) -> Result<(), TransportFault> {
    let mut stream = dialer.dial().await?;
    stream.write_all(&request.head_bytes()).await?;

    if request.body.len() > cfg.chunk_bytes {
        for chunk in request.body.chunks(cfg.chunk_bytes) {
            stream.write_all(chunk).await?;
        }
    } else if !request.body.is_empty() {
        stream.write_all(&request.body).await?;
    }
    stream.flush().await?;

    let response = tokio::time::timeout(cfg.response_timeout, read_response(&mut stream))
        .await
        .map_err(|_| TransportFault::Timeout)??;

    if is_success(&response) {
        Ok(())
    } else {
        Err(TransportFault::Rejected)
    }
}

/// Send one request, with up to `retries` extra attempts and a fixed pause
/// between them. Retries are local to this call; they never span a
/// reconnect.
pub async fn send<D: Dial>(
    dialer: &D,
    request: &Request,
    cfg: &TransportConfig,
) -> Result<(), TransportFault> {
    let mut attempt = 0;
    loop {
        match send_once(dialer, request, cfg).await {
            Ok(()) => {
                debug!("sent {} {} ({} bytes)", request.method, request.path, request.body_len());
                return Ok(());
            }
            Err(fault) if attempt < cfg.retries => {
                attempt += 1;
                warn!(
                    "send {} failed ({fault}), retry {attempt}/{}",
                    request.path, cfg.retries
                );
                tokio::time::sleep(cfg.retry_pause).await;
            }
            Err(fault) => return Err(fault),
        }
    }
}

/// Liveness probe: GET the health path, same acceptance rule, no retries.
/// Used to validate a freshly (re)established link before resuming sends.
pub async fn probe<D: Dial>(dialer: &D, cfg: &TransportConfig) -> Result<(), TransportFault> {
    send_once(dialer, &Request::get(wire::HEALTH_PATH), cfg).await
}
