//! UI module - fullscreen egui status window

mod app;
mod theme;
mod widgets;

pub use app::OneNoseApp;
pub use theme::*;
pub use widgets::*;

use anyhow::Result;
use eframe::egui;

use crate::config::Config;
use crate::core::{ShutdownSignal, ShutdownTrigger};
use crate::streaming::StatusFeed;

/// Run the status window on the calling thread until it closes
pub fn run_gui(config: &Config, feed: StatusFeed, signal: ShutdownSignal, trigger: ShutdownTrigger) -> Result<()> {
    let gui = config.gui.clone();
    let mut viewport = egui::ViewportBuilder::default()
        .with_inner_size([gui.width as f32, gui.height as f32])
        .with_title(gui.title.clone())
        .with_icon(load_icon());
    if gui.fullscreen {
        viewport = viewport.with_fullscreen(true);
    }

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let ring_size = config.leds.count;
    let gas_count = config.sensors.gas_channels.len();
    let label = config.export.label.clone();

    eframe::run_native(
        "OneNose",
        options,
        Box::new(move |cc| {
            apply_theme(&cc.egui_ctx);
            Box::new(OneNoseApp::new(gui, label, ring_size, gas_count, feed, signal, trigger))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run GUI: {}", e))
}

fn load_icon() -> egui::IconData {
    // Plain teal square
    egui::IconData {
        rgba: vec![0u8, 180, 160, 255].repeat(32 * 32),
        width: 32,
        height: 32,
    }
}
