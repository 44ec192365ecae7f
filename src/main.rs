use anyhow::{anyhow, Context, Result};
use config::{AppConfig, Config};
use eframe::{egui, CreationContext};
use gui::{config_window::show_config_window, main_window::MainWindow, popups::Popups};
use services::Services;

pub mod canvas;
pub mod config;
pub mod gui;
pub mod image_data;
pub mod services;
pub mod session;

pub const WINDOW_TITLE: &str = "Image Text Extractor";

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = AppConfig::load().context("Could not load main configuration file")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([config.window_width as f32, config.window_height as f32])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(|cc| {
            EframeApp::new(cc, config)
                .map(|app| -> Box<dyn eframe::App> { Box::new(app) })
                .map_err(Into::into)
        }),
    )
    .map_err(|e| anyhow!("{e}"))
}

pub struct EframeApp {
    pub config: AppConfig,
    pub services: Services,
    pub popups: Popups,

    main_window: MainWindow,
    show_settings: bool,
}

impl EframeApp {
    pub fn new(_cc: &CreationContext, config: AppConfig) -> Result<Self> {
        let services = Services::new()?;

        Ok(Self {
            main_window: MainWindow::new(&config),
            config,
            services,
            popups: Popups::default(),
            show_settings: false,
        })
    }
}

impl eframe::App for EframeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(WINDOW_TITLE);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_settings, "Settings");
                });
            });
        });

        if self.show_settings {
            show_config_window(self, ctx);
        }

        self.main_window
            .show(ctx, &self.config, &mut self.services, &mut self.popups);

        self.popups.show(ctx);
    }
}

impl Drop for EframeApp {
    fn drop(&mut self) {
        if let Err(e) = self.config.save() {
            log::error!("Failed to save configuration: {e:#}");
        }
    }
}
