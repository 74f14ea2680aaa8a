//! Minimal HTTP/1.1 file server on raw tokio sockets.
//!
//! wiremock always sends complete bodies and applies its delays outside the
//! responder, so it can neither drop a connection mid-body nor tell how many
//! requests are being answered at once. [`RawResource`] can do both.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::loopback::bind_loopback;
use super::parse_range;

const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Request line and range headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
    pub if_range: Option<String>,
}

#[derive(Debug, Default)]
pub struct RawLog {
    requests: Mutex<Vec<SeenRequest>>,
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl RawLog {
    #[must_use]
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `Range` header of every GET, in arrival order.
    #[must_use]
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .map(|r| r.range)
            .collect()
    }

    /// Highest number of requests held open at the same moment.
    #[must_use]
    pub fn peak_open(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn begin(&self, request: SeenRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);
    }

    fn end(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One in-memory resource served on every path.
#[derive(Debug, Clone)]
pub struct RawResource {
    body: Vec<u8>,
    etag: Option<String>,
    cut_first_get_at: Option<usize>,
    hold: Duration,
}

impl RawResource {
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            etag: None,
            cut_first_get_at: None,
            hold: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    /// Announces the full length on the first GET but closes the
    /// connection after `len` body bytes.
    #[must_use]
    pub fn cutting_first_get_at(mut self, len: usize) -> Self {
        self.cut_first_get_at = Some(len);
        self
    }

    /// Keeps every request open for `hold` before answering.
    #[must_use]
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Starts serving on a loopback port, or `None` when sockets are
    /// unavailable and the test should be skipped.
    pub async fn serve(self) -> Option<RawServer> {
        let listener = bind_loopback()?;
        listener.set_nonblocking(true).expect("nonblocking listener");
        let listener = TcpListener::from_std(listener).expect("tokio listener");
        let addr = listener.local_addr().expect("local addr");
        let log = Arc::new(RawLog::default());
        let state = Arc::new(Served {
            cut_pending: AtomicBool::new(self.cut_first_get_at.is_some()),
            resource: self,
            log: Arc::clone(&log),
        });
        let task = tokio::spawn(accept_loop(listener, state));
        Some(RawServer {
            uri: format!("http://{addr}"),
            log,
            task,
        })
    }
}

/// Running server; stops accepting when dropped.
pub struct RawServer {
    uri: String,
    log: Arc<RawLog>,
    task: JoinHandle<()>,
}

impl RawServer {
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn log(&self) -> Arc<RawLog> {
        Arc::clone(&self.log)
    }
}

impl Drop for RawServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Served {
    resource: RawResource,
    cut_pending: AtomicBool,
    log: Arc<RawLog>,
}

async fn accept_loop(listener: TcpListener, state: Arc<Served>) {
    while let Ok((stream, _)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = state.handle(stream).await {
                eprintln!("raw test server: {e}");
            }
        });
    }
}

impl Served {
    async fn handle(&self, mut stream: TcpStream) -> io::Result<()> {
        let Some(request) = read_request(&mut stream).await? else {
            return Ok(());
        };
        self.log.begin(request.clone());
        tokio::time::sleep(self.resource.hold).await;
        // Released before the response is written: requests admitted after
        // it must not count as overlapping.
        self.log.end();
        self.respond(&mut stream, &request).await
    }

    async fn respond(&self, stream: &mut TcpStream, request: &SeenRequest) -> io::Result<()> {
        let resource = &self.resource;
        let total = resource.body.len() as u64;
        let etag = resource
            .etag
            .as_ref()
            .map(|e| format!("ETag: {e}\r\n"))
            .unwrap_or_default();
        let validator_matches = match (&request.if_range, &resource.etag) {
            (Some(sent), Some(current)) => sent == current,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let range = request
            .range
            .as_deref()
            .filter(|_| validator_matches)
            .map(|r| parse_range(r, total));

        let (head, payload) = match range {
            Some(Some((start, end))) => {
                let (from, to) = (as_index(start), as_index(end));
                (
                    format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{end}/{total}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n{etag}Connection: close\r\n\r\n",
                        end - start + 1
                    ),
                    &resource.body[from..=to],
                )
            }
            Some(None) => (
                format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                ),
                &[][..],
            ),
            None => (
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nAccept-Ranges: bytes\r\n{etag}Connection: close\r\n\r\n"
                ),
                resource.body.as_slice(),
            ),
        };

        stream.write_all(head.as_bytes()).await?;
        if request.method != "HEAD" {
            let payload = match resource.cut_first_get_at {
                Some(cut)
                    if request.method == "GET" && self.cut_pending.swap(false, Ordering::SeqCst) =>
                {
                    &payload[..cut.min(payload.len())]
                }
                _ => payload,
            };
            stream.write_all(payload).await?;
        }
        stream.flush().await?;
        stream.shutdown().await
    }
}

fn as_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Reads up to the blank line ending the request head. `None` when the
/// peer closed without sending anything.
async fn read_request(stream: &mut TcpStream) -> io::Result<Option<SeenRequest>> {
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        if head.len() > MAX_REQUEST_HEAD {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        head.extend_from_slice(&buf[..n]);
    }

    let text = String::from_utf8_lossy(&head);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let mut request = SeenRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
        range: None,
        if_range: None,
    };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match name.trim().to_ascii_lowercase().as_str() {
            "range" => request.range = value,
            "if-range" => request.if_range = value,
            _ => {}
        }
    }
    Ok(Some(request))
}
