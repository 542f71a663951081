//! Local display window.
//!
//! Shows the latest snapshot published by `DisplaySink`. The window owns the
//! main thread while the detection loop runs elsewhere; closing it raises the
//! stop flag, and a raised stop flag closes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use eframe::egui;

use crate::latest::LatestReader;
use crate::sink::DisplaySnapshot;

const WINDOW_TITLE: &str = "edge-yolo-demo";
const REPAINT_INTERVAL: Duration = Duration::from_millis(30);

struct DisplayWindow {
    reader: LatestReader<DisplaySnapshot>,
    stop: Arc<AtomicBool>,
    texture: Option<egui::TextureHandle>,
    shown: u64,
    status: String,
}

impl DisplayWindow {
    fn refresh(&mut self, ctx: &egui::Context) {
        let latest = match self.reader.latest() {
            Ok(latest) => latest,
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };
        let Some((sequence, snapshot)) = latest else {
            return;
        };
        if sequence == self.shown {
            return;
        }
        let image = egui::ColorImage::from_rgb(
            [snapshot.width as usize, snapshot.height as usize],
            &snapshot.rgb,
        );
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("frame", image, egui::TextureOptions::LINEAR))
            }
        }
        self.status = snapshot
            .records
            .iter()
            .map(|r| format!("{} ({}, {}) {:.2}", r.unique_name, r.x, r.y, r.confidence))
            .collect::<Vec<_>>()
            .join("   ");
        self.shown = sequence;
    }
}

impl eframe::App for DisplayWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.stop.load(Ordering::SeqCst) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        self.refresh(ctx);

        egui::TopBottomPanel::bottom("records").show(ctx, |ui| {
            ui.label(egui::RichText::new(&self.status).monospace());
        });
        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                ui.add(egui::Image::new(texture).shrink_to_fit());
            }
            None => {
                ui.label("waiting for camera...");
            }
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

/// Block the calling thread on the window until it is closed or `stop` is raised.
pub fn run_window(reader: LatestReader<DisplaySnapshot>, stop: Arc<AtomicBool>) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([960.0, 760.0]),
        ..Default::default()
    };
    let window = DisplayWindow {
        reader,
        stop: stop.clone(),
        texture: None,
        shown: 0,
        status: String::new(),
    };

    let result = eframe::run_native(WINDOW_TITLE, options, Box::new(|_cc| Box::new(window)));
    stop.store(true, Ordering::SeqCst);
    result.map_err(|err| anyhow!("display window failed: {}", err))
}
