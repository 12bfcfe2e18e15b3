//! Colors, spacing and button factories for the multisend window.

use crate::errors::ErrorCategory;
use crate::types::TxStatus;
use eframe::egui::{self, Color32, FontFamily, FontId, RichText, Stroke, TextStyle};

const GREEN: Color32 = Color32::from_rgb(0, 221, 119);
const AMBER: Color32 = Color32::from_rgb(255, 170, 0);
const RED: Color32 = Color32::from_rgb(255, 85, 85);
const GREY: Color32 = Color32::from_rgb(170, 170, 170);

#[derive(Clone, Copy)]
pub struct AppTheme {
    pub background: Color32,
    pub surface: Color32,
    pub surface_hover: Color32,
    pub panel_fill: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,

    pub accent: Color32,
    pub success: Color32,
    pub warning: Color32,
    pub error: Color32,

    pub spacing_sm: f32,
    pub spacing_md: f32,

    pub button_size: egui::Vec2,
}

impl Default for AppTheme {
    fn default() -> Self {
        Self {
            background: Color32::from_gray(8),
            surface: Color32::from_gray(15),
            surface_hover: Color32::from_gray(25),
            panel_fill: Color32::from_gray(12),
            text_primary: GREEN,
            text_secondary: GREY,
            accent: GREEN,
            success: GREEN,
            warning: AMBER,
            error: RED,
            spacing_sm: 12.0,
            spacing_md: 20.0,
            button_size: egui::vec2(140.0, 36.0),
        }
    }
}

impl AppTheme {
    fn outlined(&self, text: RichText, border: Stroke) -> egui::Button<'static> {
        egui::Button::new(text).fill(self.surface).stroke(border)
    }

    /// The one action a panel is for
    pub fn button_primary(&self, text: &str) -> egui::Button<'static> {
        self.outlined(RichText::new(text).color(self.text_primary).strong(), Stroke::new(3.0, self.accent))
            .min_size(self.button_size)
    }

    pub fn button_secondary(&self, text: &str) -> egui::Button<'static> {
        self.outlined(RichText::new(text).color(self.text_secondary), Stroke::new(1.0, self.text_secondary))
    }

    pub fn frame_panel(&self) -> egui::Frame {
        egui::Frame::none()
            .fill(self.panel_fill)
            .rounding(2.0)
            .inner_margin(self.spacing_sm)
            .stroke(Stroke::new(1.0, self.accent))
    }

    /// Amber for problems the user can fix in the form, red for the rest
    pub fn error_color(&self, category: ErrorCategory) -> Color32 {
        match category {
            ErrorCategory::Input | ErrorCategory::InsufficientBalance | ErrorCategory::Busy => self.warning,
            _ => self.error,
        }
    }

    pub fn tx_status_color(&self, status: &TxStatus) -> Color32 {
        match status {
            TxStatus::Pending => self.warning,
            TxStatus::Confirmed { .. } => self.success,
            TxStatus::Failed { .. } => self.error,
        }
    }
}

pub fn configure_style(ctx: &egui::Context, theme: &AppTheme) {
    let mut visuals = egui::Visuals::dark();
    visuals.window_fill = theme.background;
    visuals.panel_fill = theme.panel_fill;
    visuals.override_text_color = Some(theme.text_primary);
    let widgets = &mut visuals.widgets;
    widgets.noninteractive.bg_fill = theme.surface;
    widgets.inactive.bg_fill = theme.surface;
    widgets.hovered.bg_fill = theme.surface_hover;
    widgets.inactive.bg_stroke = Stroke::new(1.0, theme.accent);
    widgets.active.bg_stroke = Stroke::new(2.0, theme.accent);
    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(12.0, 8.0);
    for (text_style, size) in [(TextStyle::Heading, 20.0), (TextStyle::Body, 14.0), (TextStyle::Monospace, 12.0)] {
        style.text_styles.insert(text_style, FontId::new(size, FontFamily::Monospace));
    }
    ctx.set_style(style);
}
