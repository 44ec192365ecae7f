use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use eframe::egui;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::services::ocr::{BBoxType, Mode};

pub trait Config: Serialize + DeserializeOwned + Default {
    /// Path of the configuration file, relative to this program's configuration directory.
    fn path() -> &'static str;

    /// Show a UI for editing this configuration.
    fn show_ui(&mut self, ui: &mut egui::Ui);

    /// Loads a configuration file, or creates a default configuration struct if the file does not exist.
    fn load() -> Result<Self> {
        Self::load_from(&config_path::<Self>()?)
    }

    /// Saves this configuration file, creating its parent directories if needed.
    fn save(&self) -> Result<()> {
        self.save_to(&config_path::<Self>()?)
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let file = File::open(config_path).with_context(|| {
            format!(
                "Could not open configuration file: `{}`",
                config_path.display()
            )
        })?;

        serde_json::from_reader(file).with_context(|| {
            format!(
                "Could not read configuration file: `{}`",
                config_path.display(),
            )
        })
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!(
                    "Could not create configuration directory: `{}`",
                    config_dir.display()
                )
            })?;
        }

        let file = File::create(config_path).with_context(|| {
            format!(
                "Could not write to configuration file: `{}`",
                config_path.display()
            )
        })?;

        serde_json::to_writer_pretty(file, self).with_context(|| {
            format!(
                "Could not serialise configuration file: `{}`",
                config_path.display()
            )
        })?;

        Ok(())
    }
}

fn config_path<C: Config>() -> Result<PathBuf> {
    let mut config_path =
        dirs::config_dir().ok_or_else(|| anyhow!("Could not find suitable config directory"))?;
    config_path.push(env!("CARGO_PKG_NAME"));
    config_path.push(C::path());
    Ok(config_path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window_width: u32,
    pub window_height: u32,

    /// Colour of the rectangles drawn around bounding boxes.
    pub stroke_colour: [u8; 3],
    /// Line width of those rectangles, in source image pixels.
    pub stroke_width: f32,

    /// Where annotated images are downloaded to. Uses the platform's download directory if unset.
    pub download_dir: Option<PathBuf>,

    pub default_mode: Mode,
    pub default_bbox_type: BBoxType,
}

impl AppConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_width: 1024,
            window_height: 768,
            stroke_colour: [255, 165, 0],
            stroke_width: 2.0,
            download_dir: None,
            default_mode: Mode::BBoxes,
            default_bbox_type: BBoxType::Word,
        }
    }
}

impl Config for AppConfig {
    fn path() -> &'static str {
        "config.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Window Size:");
            ui.add(egui::DragValue::new(&mut self.window_width).range(320..=7680));
            ui.label("x");
            ui.add(egui::DragValue::new(&mut self.window_height).range(240..=4320));
        });

        ui.horizontal(|ui| {
            egui::color_picker::color_edit_button_srgb(ui, &mut self.stroke_colour);
            ui.label("Box Colour");
        });

        ui.horizontal(|ui| {
            ui.label("Box Line Width:");
            ui.add(
                egui::DragValue::new(&mut self.stroke_width)
                    .range(0.5..=32.0)
                    .speed(0.1),
            );
        });

        ui.horizontal(|ui| {
            ui.label("Download Folder:");
            let mut dir = self
                .download_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default();
            if ui
                .add(egui::TextEdit::singleline(&mut dir).hint_text("system default"))
                .changed()
            {
                self.download_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir.trim()));
            }
        });

        egui::ComboBox::from_label("Default Mode")
            .selected_text(self.default_mode.label())
            .show_ui(ui, |ui| {
                for mode in Mode::ALL {
                    ui.selectable_value(&mut self.default_mode, mode, mode.label());
                }
            });

        egui::ComboBox::from_label("Default Granularity")
            .selected_text(self.default_bbox_type.label())
            .show_ui(ui, |ui| {
                for bbox_type in BBoxType::ALL {
                    ui.selectable_value(&mut self.default_bbox_type, bbox_type, bbox_type.label());
                }
            });
    }
}
