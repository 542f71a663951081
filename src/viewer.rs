//! HTTP surface of the web viewer.
//!
//! A small blocking server on its own thread. Each accepted connection gets a
//! thread of its own, so a slow or idle client cannot hold up the others.
//! Every request reads the shared latest-state cell; nothing here touches the
//! detection loop directly.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::latest::LatestReader;
use crate::sink::ViewerSnapshot;

const MAX_REQUEST_BYTES: usize = 8192;
const STREAM_BOUNDARY: &str = "frame";
const STREAM_POLL: Duration = Duration::from_millis(250);

pub const DEFAULT_VIEWER_ADDR: &str = "0.0.0.0:8787";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>edge-yolo-demo</title></head>
<body style="margin:0;background:#111;color:#ddd;font-family:sans-serif">
<img src="/stream" style="display:block;max-width:100%" alt="live detections">
<pre id="detections"></pre>
<script>
setInterval(function () {
  fetch("/detections").then(function (r) { return r.json(); }).then(function (d) {
    document.getElementById("detections").textContent = JSON.stringify(d, null, 2);
  });
}, 500);
</script>
</body>
</html>
"#;

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub addr: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VIEWER_ADDR.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ViewerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ViewerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("viewer server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ViewerServer {
    cfg: ViewerConfig,
    reader: LatestReader<ViewerSnapshot>,
}

impl ViewerServer {
    pub fn new(cfg: ViewerConfig, reader: LatestReader<ViewerSnapshot>) -> Self {
        Self { cfg, reader }
    }

    pub fn spawn(self) -> Result<ViewerHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid viewer address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind viewer to {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("viewer: listening on http://{}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let reader = self.reader;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_viewer(listener, reader, shutdown_thread) {
                log::error!("viewer: server stopped: {}", err);
            }
        });

        Ok(ViewerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_viewer(
    listener: TcpListener,
    reader: LatestReader<ViewerSnapshot>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                // Accepted sockets inherit non-blocking mode on some platforms.
                if let Err(err) = stream.set_nonblocking(false) {
                    log::warn!("viewer: dropping connection: {}", err);
                    continue;
                }
                let reader = reader.clone();
                let shutdown = shutdown.clone();
                connections.push(std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &reader, &shutdown) {
                        log::warn!("viewer: request failed: {:#}", err);
                    }
                }));
                connections.retain(|join| !join.is_finished());
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    for join in connections {
        let _ = join.join();
    }
    Ok(())
}

/// Serve one request on the connection's own thread. `/stream` keeps the
/// connection until the client leaves or the server shuts down.
fn handle_connection(
    mut stream: TcpStream,
    reader: &LatestReader<ViewerSnapshot>,
    shutdown: &AtomicBool,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/" | "/index.html" => {
            write_response(&mut stream, 200, "text/html; charset=utf-8", INDEX_HTML.as_bytes())?;
        }
        "/health" => {
            let body = serde_json::json!({ "status": "ok", "sequence": reader.sequence()? });
            write_json_response(&mut stream, 200, &body.to_string())?;
        }
        "/frame.jpg" => match reader.latest()? {
            Some((_, snapshot)) => {
                write_response(&mut stream, 200, "image/jpeg", &snapshot.jpeg)?;
            }
            None => write_json_response(&mut stream, 404, r#"{"error":"no_frame"}"#)?,
        },
        "/detections" => {
            let payload = match reader.latest()? {
                Some((_, snapshot)) => serde_json::to_vec(&snapshot.records)?,
                None => b"[]".to_vec(),
            };
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        "/stream" => {
            if let Err(err) = serve_stream(stream, reader, shutdown) {
                log::debug!("viewer: stream client went away: {:#}", err);
            }
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?,
    }
    Ok(())
}

/// Push one multipart part per newly published frame until the client
/// disconnects or the server shuts down.
fn serve_stream(
    mut stream: TcpStream,
    reader: &LatestReader<ViewerSnapshot>,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut seen = 0;
    // Send the current frame right away so new clients don't start blank.
    if let Some((sequence, snapshot)) = reader.latest()? {
        write_stream_part(&mut stream, &snapshot.jpeg)?;
        seen = sequence;
    }
    while !shutdown.load(Ordering::SeqCst) {
        if let Some((sequence, snapshot)) = reader.wait_newer(seen, STREAM_POLL)? {
            write_stream_part(&mut stream, &snapshot.jpeg)?;
            seen = sequence;
        }
    }
    Ok(())
}

fn write_stream_part(stream: &mut TcpStream, jpeg: &[u8]) -> Result<()> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        STREAM_BOUNDARY,
        jpeg.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(jpeg)?;
    stream.write_all(b"\r\n")?;
    stream.flush()?;
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
