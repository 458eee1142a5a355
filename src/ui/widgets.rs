// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Custom UI widgets

use eframe::egui;

use super::theme::OneNoseColors;

/// On-screen copy of the LED ring with one lit position
pub struct RingView {
    count: usize,
    lit: Option<usize>,
    diameter: f32,
}

impl RingView {
    pub fn new(count: usize, lit: Option<usize>) -> Self {
        Self { count, lit, diameter: 180.0 }
    }

    pub fn diameter(mut self, diameter: f32) -> Self {
        self.diameter = diameter;
        self
    }

    pub fn show(self, ui: &mut egui::Ui) -> egui::Response {
        let size = egui::vec2(self.diameter, self.diameter);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let center = response.rect.center();
        let radius = self.diameter * 0.4;
        let dot = (radius * 0.12).max(3.0);

        painter.circle_stroke(center, radius, egui::Stroke::new(1.0, OneNoseColors::LED_OFF));
        for (i, pos) in ring_positions(self.count, center, radius).into_iter().enumerate() {
            let color = if Some(i) == self.lit { OneNoseColors::LED_ON } else { OneNoseColors::LED_OFF };
            painter.circle_filled(pos, dot, color);
        }
        response
    }
}

/// LED centres clockwise from 12 o'clock
pub fn ring_positions(count: usize, center: egui::Pos2, radius: f32) -> Vec<egui::Pos2> {
    (0..count)
        .map(|i| {
            let angle = std::f32::consts::TAU * i as f32 / count as f32 - std::f32::consts::FRAC_PI_2;
            center + egui::vec2(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

/// Status indicator (coloured dot with label)
pub fn status_indicator(ui: &mut egui::Ui, online: bool, label: &str) {
    ui.horizontal(|ui| {
        let color = if online { OneNoseColors::PRIMARY } else { OneNoseColors::DANGER };
        ui.colored_label(color, "●");
        ui.label(label);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_starts_at_top_and_runs_clockwise() {
        let center = egui::pos2(100.0, 100.0);
        let positions = ring_positions(4, center, 10.0);
        assert_eq!(positions.len(), 4);
        assert!((positions[0].y - 90.0).abs() < 1e-4);
        assert!((positions[1].x - 110.0).abs() < 1e-4);
        assert!((positions[2].y - 110.0).abs() < 1e-4);
    }
}
