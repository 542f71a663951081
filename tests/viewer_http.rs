use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use edge_yolo_demo::latest;
use edge_yolo_demo::{
    BoundingBox, CoordinateMapper, Frame, OutputSink, Projection, RawDetection, ViewerConfig,
    ViewerHandle, ViewerServer, WebViewerSink,
};

fn spawn_viewer() -> Result<(WebViewerSink, ViewerHandle)> {
    let (writer, reader) = latest::channel();
    let handle = ViewerServer::new(
        ViewerConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        reader,
    )
    .spawn()?;
    Ok((WebViewerSink::new(writer), handle))
}

fn request(handle: &ViewerHandle, method: &str, path: &str) -> Result<(String, Vec<u8>)> {
    let mut stream = TcpStream::connect(handle.addr)?;
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\n\r\n",
        method, path
    )?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&response[..split]).to_string();
    Ok((head, response[split + 4..].to_vec()))
}

fn render_person(sink: &mut WebViewerSink) -> Result<()> {
    let mapper = CoordinateMapper::new(90, 90, Projection::Linear);
    let detections = vec![RawDetection::new(
        "person",
        0.94,
        BoundingBox::new(100.0, 100.0, 200.0, 200.0),
    )];
    let records = edge_yolo_demo::build_records(&mapper, &detections, 640, 480);
    sink.render(&Frame::filled(640, 480, [30, 30, 30]), &records)
}

#[test]
fn serves_empty_state_before_first_frame() -> Result<()> {
    let (_sink, handle) = spawn_viewer()?;

    let (head, body) = request(&handle, "GET", "/detections")?;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"[]");

    let (head, body) = request(&handle, "GET", "/frame.jpg")?;
    assert!(head.starts_with("HTTP/1.1 404"));
    assert_eq!(body, br#"{"error":"no_frame"}"#);

    let (head, body) = request(&handle, "GET", "/health")?;
    assert!(head.starts_with("HTTP/1.1 200"));
    let health: Value = serde_json::from_slice(&body)?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sequence"], 0);

    handle.stop()
}

#[test]
fn serves_latest_frame_and_records() -> Result<()> {
    let (mut sink, handle) = spawn_viewer()?;
    render_person(&mut sink)?;

    let (head, body) = request(&handle, "GET", "/detections")?;
    assert!(head.contains("Content-Type: application/json"));
    let records: Value = serde_json::from_slice(&body)?;
    assert_eq!(
        records,
        serde_json::json!([{
            "x": -23,
            "y": 16,
            "confidence": 0.94,
            "pixels_wide": 640,
            "pixels_high": 480,
            "field_of_view_w": 90,
            "field_of_view_h": 90,
            "class_name": "person",
            "unique_name": "person0"
        }])
    );

    let (head, body) = request(&handle, "GET", "/frame.jpg")?;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert!(head.contains("Content-Type: image/jpeg"));
    assert_eq!(&body[..2], &[0xFF, 0xD8]);

    let (_, body) = request(&handle, "GET", "/health")?;
    let health: Value = serde_json::from_slice(&body)?;
    assert_eq!(health["sequence"], 1);

    handle.stop()
}

#[test]
fn rejects_other_methods_and_paths() -> Result<()> {
    let (_sink, handle) = spawn_viewer()?;

    let (head, body) = request(&handle, "POST", "/detections")?;
    assert!(head.starts_with("HTTP/1.1 405"));
    assert_eq!(body, br#"{"error":"method_not_allowed"}"#);

    let (head, _) = request(&handle, "GET", "/admin")?;
    assert!(head.starts_with("HTTP/1.1 404"));

    handle.stop()
}

#[test]
fn stream_pushes_one_part_per_frame() -> Result<()> {
    let (mut sink, handle) = spawn_viewer()?;
    render_person(&mut sink)?;

    let mut stream = TcpStream::connect(handle.addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(stream, "GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !String::from_utf8_lossy(&received).contains("--frame\r\nContent-Type: image/jpeg") {
        let n = stream.read(&mut buf)?;
        assert!(n > 0, "stream closed early");
        received.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("HTTP/1.1 200"));
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));

    drop(stream);
    handle.stop()
}

#[test]
fn idle_client_does_not_block_other_requests() -> Result<()> {
    let (_sink, handle) = spawn_viewer()?;

    // Connected but never sends a request line.
    let idle = TcpStream::connect(handle.addr)?;
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let (head, _) = request(&handle, "GET", "/health")?;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "health took {:?} behind an idle client",
        started.elapsed()
    );

    drop(idle);
    handle.stop()
}
