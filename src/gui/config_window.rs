use eframe::egui;

use crate::{config::Config, EframeApp};

pub fn show_config_window(app: &mut EframeApp, ctx: &egui::Context) {
    egui::SidePanel::right("settings")
        .resizable(true)
        .default_width(320.0)
        .show(ctx, |ui| {
            egui_extras::StripBuilder::new(ui)
                .size(egui_extras::Size::remainder())
                .size(egui_extras::Size::exact(22.0))
                .vertical(|mut strip| {
                    strip.cell(|ui| {
                        egui::ScrollArea::vertical().show(ui, |ui| {
                            let header_size = 20.0;

                            ui.label(
                                egui::RichText::new("Settings")
                                    .size(header_size)
                                    .strong(),
                            );

                            app.config.show_ui(ui);

                            ui.separator();

                            egui::CollapsingHeader::new(
                                egui::RichText::new(format!(
                                    "OCR: {}",
                                    app.services.ocr.name()
                                ))
                                .size(header_size),
                            )
                            .default_open(true)
                            .show_unindented(ui, |ui| {
                                app.services.ocr.show_config_ui(ui);
                            });
                        });
                    });

                    strip.cell(|ui| {
                        ui.centered_and_justified(|ui| {
                            if ui.button("Save & Reload Services").clicked() {
                                reload(app);
                            }
                        });
                    });
                });
        });
}

/// Save every configuration, then reinitialise the services from what was saved.
fn reload(app: &mut EframeApp) {
    if let Err(e) = app.config.save() {
        app.popups.error(e);
    }

    match app.services.reload() {
        Ok(()) => log::info!("Services reloaded"),
        Err(e) => app.popups.error(e),
    }
}
