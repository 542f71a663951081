//! edge-yolo-demo - camera to angular detection records
//!
//! This binary:
//! 1. Loads configuration (`LOCAL_CAMERA_SOURCE`, FOV, output mode)
//! 2. Builds the detector and the selected output sink
//! 3. Runs the detection loop until Ctrl-C, end of stream or a fatal error

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use edge_yolo_demo::latest;
use edge_yolo_demo::{
    Annotator, CameraSource, DemoConfig, DetectionLoop, Detector, DetectorKind, LoopSummary,
    OutputMode, OutputSink, StubBackend, ViewerConfig, ViewerServer, WebViewerSink,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output sink: web or display.
    #[arg(long, env = "EDGE_YOLO_OUTPUT")]
    output: Option<OutputMode>,
    /// Web viewer bind address.
    #[arg(long, env = "EDGE_YOLO_VIEWER_ADDR")]
    viewer_addr: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = DemoConfig::load()?;
    if let Some(output) = args.output {
        cfg.output = output;
    }
    if let Some(addr) = args.viewer_addr {
        cfg.viewer_addr = addr;
    }
    cfg.validate()?;
    log::info!(
        "edge-yolo-demo {} starting: camera={} fov={}x{} output={:?} detector={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.source,
        cfg.fov_w,
        cfg.fov_h,
        cfg.output,
        cfg.detector
    );

    let annotator = Annotator::new(model_label(cfg.detector))
        .with_font_from(cfg.font_path.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let summary = match cfg.output {
        OutputMode::Web => run_web(&cfg, annotator, args.max_frames, &stop)?,
        OutputMode::Display => run_display(cfg, annotator, args.max_frames, stop)?,
    };
    log::info!(
        "edge-yolo-demo finished: processed={} skipped={} records={}",
        summary.frames_processed,
        summary.frames_skipped,
        summary.records_emitted
    );
    Ok(())
}

fn model_label(kind: DetectorKind) -> &'static str {
    match kind {
        DetectorKind::Tract => "YOLOv8n (tract) - edge-yolo-demo",
        DetectorKind::Stub => "stub detector - edge-yolo-demo",
    }
}

fn run_web(
    cfg: &DemoConfig,
    annotator: Annotator,
    max_frames: Option<u64>,
    stop: &AtomicBool,
) -> Result<LoopSummary> {
    let (writer, reader) = latest::channel();
    let handle = ViewerServer::new(
        ViewerConfig {
            addr: cfg.viewer_addr.clone(),
        },
        reader,
    )
    .spawn()?;

    let sink = WebViewerSink::new(writer).with_annotator(annotator);
    let result = run_loop(cfg, sink, max_frames, stop);
    handle.stop()?;
    result
}

#[cfg(feature = "display-window")]
fn run_display(
    cfg: DemoConfig,
    annotator: Annotator,
    max_frames: Option<u64>,
    stop: Arc<AtomicBool>,
) -> Result<LoopSummary> {
    use edge_yolo_demo::display::run_window;
    use edge_yolo_demo::DisplaySink;

    let (writer, reader) = latest::channel();
    let loop_stop = stop.clone();
    // The window needs the main thread; the loop and its camera live on this one.
    let worker = std::thread::spawn(move || {
        let sink = DisplaySink::new(writer).with_annotator(annotator);
        let result = run_loop(&cfg, sink, max_frames, &loop_stop);
        loop_stop.store(true, Ordering::SeqCst);
        result
    });

    let window = run_window(reader, stop.clone());
    stop.store(true, Ordering::SeqCst);
    let summary = worker
        .join()
        .map_err(|_| anyhow::anyhow!("detection loop thread panicked"))??;
    window?;
    Ok(summary)
}

#[cfg(not(feature = "display-window"))]
fn run_display(
    _cfg: DemoConfig,
    _annotator: Annotator,
    _max_frames: Option<u64>,
    _stop: Arc<AtomicBool>,
) -> Result<LoopSummary> {
    Err(edge_yolo_demo::DemoError::configuration(
        "display output requires the display-window feature",
    )
    .into())
}

fn run_loop<O: OutputSink>(
    cfg: &DemoConfig,
    sink: O,
    max_frames: Option<u64>,
    stop: &AtomicBool,
) -> Result<LoopSummary> {
    let detector = build_detector(cfg)?;
    let source = CameraSource::new(cfg.camera.clone());
    let mut detection_loop =
        DetectionLoop::new(source, detector, sink, cfg.mapper()).with_max_frames(max_frames);
    detection_loop.run(stop)
}

fn build_detector(cfg: &DemoConfig) -> Result<Box<dyn Detector>> {
    match cfg.detector {
        DetectorKind::Stub => {
            log::warn!("using stub detector; no model will run");
            Ok(Box::new(StubBackend::new()))
        }
        DetectorKind::Tract => tract_detector(cfg),
    }
}

#[cfg(feature = "backend-tract")]
fn tract_detector(cfg: &DemoConfig) -> Result<Box<dyn Detector>> {
    let backend = edge_yolo_demo::TractYoloBackend::new(&cfg.model_path, cfg.yolo.clone())?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_detector(_cfg: &DemoConfig) -> Result<Box<dyn Detector>> {
    Err(edge_yolo_demo::DemoError::configuration(
        "tract detector requires the backend-tract feature",
    )
    .into())
}
