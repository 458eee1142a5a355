// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Status window application

use std::sync::Arc;
use std::time::Duration;
use eframe::egui;
use tracing::info;

use super::theme::OneNoseColors;
use super::widgets::{status_indicator, RingView};
use crate::config::GuiConfig;
use crate::core::{CycleRecord, ShutdownSignal, ShutdownTrigger, StopReason};
use crate::detection::ClassificationOutcome;
use crate::sensors::gas_label;
use crate::streaming::StatusFeed;

const REPAINT_INTERVAL: Duration = Duration::from_millis(250);

/// Shows the latest cycle; closing it stops the run
pub struct OneNoseApp {
    gui: GuiConfig,
    label: String,
    ring_size: usize,
    gas_count: usize,
    feed: StatusFeed,
    signal: ShutdownSignal,
    trigger: ShutdownTrigger,
    latest: Option<Arc<CycleRecord>>,
    closing: bool,
}

impl OneNoseApp {
    pub fn new(
        gui: GuiConfig,
        label: String,
        ring_size: usize,
        gas_count: usize,
        feed: StatusFeed,
        signal: ShutdownSignal,
        trigger: ShutdownTrigger,
    ) -> Self {
        Self {
            gui,
            label,
            ring_size,
            gas_count,
            feed,
            signal,
            trigger,
            latest: None,
            closing: false,
        }
    }

    fn poll_feed(&mut self) {
        if self.feed.has_changed().unwrap_or(false) {
            self.latest = self.feed.borrow_and_update().clone();
        }
    }

    fn headline(&self) -> String {
        match self.latest.as_ref().and_then(|r| r.winner) {
            Some(w) => format!("Highest: {}", gas_label(w.index)),
            None => "Waiting for readings...".to_string(),
        }
    }

    fn request_close(&mut self, ctx: &egui::Context) {
        if !self.closing {
            self.closing = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn show_gas_table(&self, ui: &mut egui::Ui, record: &CycleRecord) {
        egui::Grid::new("gas_grid").striped(true).num_columns(3).show(ui, |ui| {
            for reading in record.gas.iter().take(self.gas_count) {
                ui.label(reading.label());
                match reading.sample {
                    Some(s) => {
                        ui.monospace(format!("{} ppm", s.co2_ppm));
                        ui.monospace(format!("{} ppb", s.tvoc_ppb));
                    }
                    None => {
                        ui.colored_label(OneNoseColors::DANGER, "Error reading sensor");
                        ui.label("");
                    }
                }
                ui.end_row();
            }
        });
    }

    fn show_climate(&self, ui: &mut egui::Ui, record: &CycleRecord) {
        let c = &record.climate;
        let fmt = |v: Option<f64>, unit: &str| v.map(|v| format!("{:.2} {}", v, unit)).unwrap_or_else(|| "--".to_string());
        ui.horizontal_wrapped(|ui| {
            ui.label(format!("Temp {}", fmt(c.temperature_c, "C")));
            ui.separator();
            ui.label(format!("Pressure {}", fmt(c.pressure_hpa, "hPa")));
            ui.separator();
            ui.label(format!("Humidity {}", fmt(c.humidity_pct, "%RH")));
            ui.separator();
            ui.label(format!("Gas {}", c.gas_resistance_ohm.map(|g| format!("{:.0} Ohms", g)).unwrap_or_else(|| "--".into())));
        });
    }
}

impl eframe::App for OneNoseApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_feed();

        if self.signal.is_stopping() || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.request_close(ctx);
        }
        if ctx.input(|i| i.viewport().close_requested()) && self.trigger.stop(StopReason::GuiClosed) {
            info!("Status window closed");
        }

        egui::TopBottomPanel::top("title").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(&self.gui.title);
                ui.colored_label(OneNoseColors::MUTED, &self.gui.subtitle);
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                status_indicator(ui, !self.signal.is_stopping(), "Sampling");
                ui.separator();
                ui.label(format!("Bind smell to this label: {}", self.label));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(record) = &self.latest {
                        ui.label(format!("cycle {} at {}", record.cycle, record.timestamp.format("%H:%M:%S")));
                    }
                });
            });
        });

        let lit = self.latest.as_ref().and_then(|r| r.indicator).map(usize::from);
        egui::SidePanel::right("ring").resizable(false).show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                RingView::new(self.ring_size, lit).diameter(200.0).show(ui);
                if let Some(led) = lit {
                    ui.label(format!("LED {}", led));
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(self.headline());
            let latest = self.latest.clone();
            if let Some(record) = latest {
                match &record.classification {
                    ClassificationOutcome::Disabled => {}
                    outcome => {
                        ui.label(format!("Smell: {}", outcome.describe()));
                    }
                }
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.show_gas_table(ui, &record);
                    ui.separator();
                    self.show_climate(ui, &record);
                });
            }
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
