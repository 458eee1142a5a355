// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Theme configuration

use eframe::egui;

/// Dark theme with large text for a small touch display
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    style.visuals = egui::Visuals::dark();

    style.visuals.widgets.noninteractive.bg_fill = egui::Color32::from_rgb(25, 25, 30);
    style.visuals.widgets.inactive.bg_fill = egui::Color32::from_rgb(35, 35, 40);
    style.visuals.panel_fill = egui::Color32::from_rgb(18, 18, 22);
    style.visuals.window_fill = egui::Color32::from_rgb(30, 30, 35);
    style.visuals.extreme_bg_color = egui::Color32::from_rgb(12, 12, 15);
    style.visuals.window_rounding = egui::Rounding::same(6.0);

    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);

    for (text_style, size) in [
        (egui::TextStyle::Heading, 34.0),
        (egui::TextStyle::Body, 20.0),
        (egui::TextStyle::Monospace, 18.0),
        (egui::TextStyle::Small, 14.0),
    ] {
        if let Some(font) = style.text_styles.get_mut(&text_style) {
            font.size = size;
        }
    }

    ctx.set_style(style);
}

/// OneNose colour palette
pub struct OneNoseColors;

impl OneNoseColors {
    pub const PRIMARY: egui::Color32 = egui::Color32::from_rgb(0, 200, 180);
    pub const MUTED: egui::Color32 = egui::Color32::from_gray(140);
    pub const DANGER: egui::Color32 = egui::Color32::from_rgb(255, 90, 90);
    pub const LED_OFF: egui::Color32 = egui::Color32::from_gray(50);
    pub const LED_ON: egui::Color32 = egui::Color32::from_rgb(255, 40, 40);
}
