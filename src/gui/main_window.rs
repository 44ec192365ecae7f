use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use eframe::egui::{self, vec2, Color32, Pos2, Rect, TextureHandle, Vec2};
use image::RgbaImage;

use crate::{
    canvas::{fit_scale, Canvas, Stroke},
    config::AppConfig,
    gui::popups::Popups,
    image_data::ImageDataUrl,
    services::{
        ocr::{BBox, BBoxType, Mode, OcrResult},
        ServiceJob, Services,
    },
    session::{Session, Submission, ViewState},
};

const PREVIEW_MAX_HEIGHT: f32 = 300.0;

pub struct MainWindow {
    session: Session,

    path_input: String,
    base64_input: String,

    preview: Preview,
    canvas: CanvasView,
    last_download: Option<PathBuf>,
}

/// The decoded version of the session's current image.
#[derive(Default)]
struct Preview {
    generation: u64,
    job: Option<ServiceJob<Result<RgbaImage>>>,
    shown: Option<Result<TextureHandle, String>>,
}

/// The annotated canvas for the current bounding box result.
#[derive(Default)]
struct CanvasView {
    /// Submission the canvas is being, or was, rendered for.
    submission_id: Option<u64>,
    job: Option<ServiceJob<Result<Canvas>>>,
    shown: Option<Result<(Canvas, TextureHandle), String>>,
}

impl Preview {
    /// Restart decoding whenever the session's image was replaced, dropping any older decode.
    fn sync(&mut self, generation: u64, image: Option<&ImageDataUrl>) {
        if self.generation == generation {
            return;
        }

        *self = Self {
            generation,
            job: image
                .cloned()
                .map(|image| ServiceJob::new(move || image.decode_image())),
            shown: None,
        };
    }

    fn finished(&mut self) -> Option<Result<RgbaImage>> {
        let decoded = self.job.as_mut()?.try_wait().transpose()?;
        self.job = None;
        Some(decoded.and_then(|image| image))
    }
}

/// The bounding box result the canvas should show for `state`, if any.
fn bboxes_submission(state: &ViewState) -> Option<(u64, &ImageDataUrl, &[BBox])> {
    match state {
        ViewState::Success(Submission {
            id,
            image,
            result: OcrResult::BBoxes(bboxes),
        }) => Some((*id, image, bboxes.as_slice())),
        _ => None,
    }
}

impl CanvasView {
    /// Follow the current bounding box submission, returning whether a new render was started.
    ///
    /// A new submission id replaces any render for an older one. No submission at all tears the
    /// canvas down, including a render still in progress.
    fn sync(
        &mut self,
        submission: Option<(u64, &ImageDataUrl, &[BBox])>,
        render: impl FnOnce(&ImageDataUrl, &[BBox]) -> ServiceJob<Result<Canvas>>,
    ) -> bool {
        let Some((id, image, bboxes)) = submission else {
            if self.submission_id.is_some() {
                log::debug!("Tearing down canvas");
            }
            *self = Self::default();
            return false;
        };

        if self.submission_id == Some(id) {
            return false;
        }

        *self = Self {
            submission_id: Some(id),
            job: Some(render(image, bboxes)),
            shown: None,
        };
        true
    }

    fn finished(&mut self) -> Option<Result<Canvas>> {
        let rendered = self.job.as_mut()?.try_wait().transpose()?;
        self.job = None;
        Some(rendered.and_then(|canvas| canvas))
    }
}

impl MainWindow {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            session: Session::new(config.default_mode, config.default_bbox_type),
            path_input: String::new(),
            base64_input: String::new(),
            preview: Default::default(),
            canvas: Default::default(),
            last_download: None,
        }
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        config: &AppConfig,
        services: &mut Services,
        popups: &mut Popups,
    ) {
        self.handle_dropped_files(ctx);

        if let Err(e) = self.session.poll() {
            popups.error(e);
        }
        self.update_preview(ctx);
        self.update_canvas(ctx, config);

        if self.session.is_busy() || self.preview.job.is_some() || self.canvas.job.is_some() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::both()
                .auto_shrink(false)
                .show(ui, |ui| {
                    self.input_ui(ui);
                    ui.add_space(12.0);
                    self.request_ui(ui, services, popups);
                    ui.add_space(12.0);
                    self.result_ui(ui, config, popups);
                });
        });
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());

        if let Some(file) = dropped.first() {
            if dropped.len() > 1 {
                log::warn!("{} files were dropped, only loading the first one", dropped.len());
            }
            if let Some(path) = &file.path {
                self.path_input = path.display().to_string();
            }
            self.session.load_dropped(file);
        }
    }

    fn update_preview(&mut self, ctx: &egui::Context) {
        self.preview
            .sync(self.session.image_generation(), self.session.image());

        if let Some(decoded) = self.preview.finished() {
            self.preview.shown = Some(
                decoded
                    .map(|image| load_texture(ctx, "image preview", &image))
                    .map_err(|e| format!("{e:#}")),
            );
        }
    }

    /// Render the canvas for a bounding box result, once per submission.
    fn update_canvas(&mut self, ctx: &egui::Context, config: &AppConfig) {
        let viewport = ctx.screen_rect().size();
        let stroke = Stroke {
            colour: config.stroke_colour,
            width: config.stroke_width,
        };

        let started = self.canvas.sync(
            bboxes_submission(self.session.state()),
            |image, bboxes| {
                let image = image.clone();
                let bboxes = bboxes.to_vec();
                ServiceJob::new(move || -> Result<Canvas> {
                    let source = image.decode_image()?;
                    Ok(Canvas::render(
                        &source,
                        &bboxes,
                        (viewport.x, viewport.y),
                        stroke,
                    ))
                })
            },
        );
        if started {
            self.last_download = None;
        }

        if let Some(rendered) = self.canvas.finished() {
            self.canvas.shown = Some(
                rendered
                    .map(|canvas| {
                        let texture = load_texture(ctx, "annotated canvas", &canvas.image);
                        (canvas, texture)
                    })
                    .map_err(|e| format!("{e:#}")),
            );
        }
    }

    fn input_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Upload Image");

        ui.horizontal(|ui| {
            let open_clicked = ui.button("Open").clicked();
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.path_input)
                    .hint_text("Path to an image file, or drop one onto the window")
                    .desired_width(f32::INFINITY),
            );
            let enter_pressed =
                response.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter));

            if open_clicked || enter_pressed {
                self.session.load_from_file(self.path_input.trim());
            }
        });

        ui.add(
            egui::TextEdit::multiline(&mut self.base64_input)
                .hint_text("Or paste base64 image here")
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );
        if ui.button("Use Base64 Image").clicked() {
            self.session.load_from_base64_text(&self.base64_input);
        }

        match &self.preview.shown {
            _ if self.preview.job.is_some() => {
                ui.add(egui::Spinner::new());
            }
            Some(Ok(texture)) => {
                let size = texture.size_vec2();
                let scale = fit_scale(
                    (size.x as u32, size.y as u32),
                    (ui.available_width(), PREVIEW_MAX_HEIGHT),
                )
                .min(1.0);
                paint_texture(ui, texture, size * scale);
            }
            Some(Err(e)) => {
                ui.colored_label(Color32::YELLOW, format!("Could not decode image: {e}"));
            }
            None => {}
        }
    }

    fn request_ui(&mut self, ui: &mut egui::Ui, services: &mut Services, popups: &mut Popups) {
        ui.horizontal(|ui| {
            for mode in Mode::ALL {
                ui.selectable_value(&mut self.session.mode, mode, mode.label());
            }
        });

        if self.session.mode == Mode::BBoxes {
            egui::ComboBox::from_label("Granularity")
                .selected_text(self.session.bbox_type.label())
                .show_ui(ui, |ui| {
                    for bbox_type in BBoxType::ALL {
                        ui.selectable_value(
                            &mut self.session.bbox_type,
                            bbox_type,
                            bbox_type.label(),
                        );
                    }
                });
        }

        let loading = self.session.state().is_loading();
        let label = if loading { "Processing..." } else { "Submit" };
        ui.horizontal(|ui| {
            let submit = ui.add_enabled(
                !loading && self.session.image().is_some(),
                egui::Button::new(label).min_size(vec2(120.0, 0.0)),
            );
            if loading {
                ui.add(egui::Spinner::new());
            }

            if submit.clicked() {
                if let Err(e) = self.session.submit(services.ocr.as_mut()) {
                    popups.error(e);
                }
            }
        });

        if let ViewState::Failed(message) = self.session.state() {
            ui.colored_label(Color32::from_rgb(220, 60, 60), message.as_str());
        }
    }

    fn result_ui(&mut self, ui: &mut egui::Ui, config: &AppConfig, popups: &mut Popups) {
        let ViewState::Success(submission) = self.session.state() else {
            return;
        };

        ui.separator();

        match &submission.result {
            OcrResult::BBoxes(bboxes) => {
                ui.heading(format!("Bounding Boxes: {}", bboxes.len()));

                match &self.canvas.shown {
                    None => {
                        ui.add(egui::Spinner::new());
                    }
                    Some(Err(e)) => {
                        ui.colored_label(Color32::YELLOW, format!("Could not draw image: {e}"));
                    }
                    Some(Ok((canvas, texture))) => {
                        paint_texture(ui, texture, texture.size_vec2());

                        ui.horizontal(|ui| {
                            if ui.button("Download Image").clicked() {
                                match canvas.download(&config.download_dir()) {
                                    Ok(path) => self.last_download = Some(path),
                                    Err(e) => popups.error(e),
                                }
                            }
                            if ui.button("Copy as Data URL").clicked() {
                                match canvas.to_data_url() {
                                    Ok(url) => ui.ctx().copy_text(url.as_str().to_owned()),
                                    Err(e) => popups.error(e),
                                }
                            }
                        });
                        if let Some(path) = &self.last_download {
                            ui.label(format!("Saved to `{}`", path.display()));
                        }
                    }
                }
            }
            OcrResult::Text(text) => {
                ui.heading("Extracted Text:");

                egui::Frame::group(ui.style()).show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.add(
                        egui::Label::new(egui::RichText::new(text).monospace())
                            .wrap_mode(egui::TextWrapMode::Extend),
                    );
                });

                if ui.button("Copy").clicked() {
                    ui.ctx().copy_text(text.clone());
                }
            }
        }
    }
}

fn load_texture(ctx: &egui::Context, name: &str, image: &RgbaImage) -> TextureHandle {
    let color_image = egui::ColorImage::from_rgba_unmultiplied(
        [image.width() as usize, image.height() as usize],
        image.as_flat_samples().as_slice(),
    );

    ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR)
}

fn paint_texture(ui: &mut egui::Ui, texture: &TextureHandle, size: Vec2) {
    let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
    ui.painter().image(
        texture.id(),
        rect,
        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
        Color32::WHITE,
    );
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc,
        time::{Duration, Instant},
    };

    use anyhow::anyhow;

    use super::*;
    use crate::image_data::png_bytes;

    const NO_BOXES: &[BBox] = &[];

    fn wait<T>(mut finished: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = finished() {
                return value;
            }
            assert!(Instant::now() < deadline, "job never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn failing_render(message: &'static str) -> ServiceJob<Result<Canvas>> {
        ServiceJob::new(move || Err(anyhow!(message)))
    }

    fn success(id: u64, result: OcrResult) -> ViewState {
        ViewState::Success(Submission {
            id,
            image: ImageDataUrl::from_text("data:image/png;base64,AAAA"),
            result,
        })
    }

    #[test]
    fn only_bbox_results_get_a_canvas() {
        assert!(bboxes_submission(&ViewState::Idle).is_none());
        assert!(bboxes_submission(&ViewState::Failed("nope".to_owned())).is_none());
        assert!(bboxes_submission(&success(1, OcrResult::Text("hi".to_owned()))).is_none());

        let bbox = BBox {
            x_min: 1.0,
            y_min: 1.0,
            x_max: 2.0,
            y_max: 2.0,
        };
        let state = success(7, OcrResult::BBoxes(vec![bbox]));
        let (id, _, bboxes) = bboxes_submission(&state).unwrap();
        assert_eq!(id, 7);
        assert_eq!(bboxes, &[bbox]);
    }

    #[test]
    fn canvas_renders_once_per_submission() {
        let image = ImageDataUrl::from_text("a");
        let mut view = CanvasView::default();

        assert!(view.sync(Some((1, &image, NO_BOXES)), |_, _| failing_render("first")));
        assert!(!view.sync(Some((1, &image, NO_BOXES)), |_, _| unreachable!()));
        assert_eq!(view.submission_id, Some(1));
    }

    #[test]
    fn render_for_older_submission_is_dropped() {
        let image = ImageDataUrl::from_text("a");
        let (tx, rx) = mpsc::channel::<()>();
        let mut view = CanvasView::default();

        view.sync(Some((1, &image, NO_BOXES)), |_, _| {
            ServiceJob::new(move || {
                let _ = rx.recv();
                Err(anyhow!("render for 1"))
            })
        });
        assert!(view.sync(Some((2, &image, NO_BOXES)), |_, _| failing_render("render for 2")));
        let _ = tx.send(());

        let rendered = wait(|| view.finished());
        assert_eq!(rendered.unwrap_err().to_string(), "render for 2");
        assert_eq!(view.submission_id, Some(2));
    }

    #[test]
    fn leaving_bbox_result_tears_canvas_down() {
        let source = ImageDataUrl::from_bytes(&png_bytes(4, 4));
        let mut view = CanvasView::default();

        view.sync(Some((1, &source, NO_BOXES)), |image, bboxes| {
            let image = image.clone();
            let bboxes = bboxes.to_vec();
            ServiceJob::new(move || -> Result<Canvas> {
                let source = image.decode_image()?;
                Ok(Canvas::render(
                    &source,
                    &bboxes,
                    (4.0, 4.0),
                    Stroke {
                        colour: [255, 165, 0],
                        width: 2.0,
                    },
                ))
            })
        });
        let canvas = wait(|| view.finished()).unwrap();
        assert_eq!(canvas.image.dimensions(), (4, 4));

        // a new request is loading, or it failed
        assert!(!view.sync(None, |_, _| unreachable!()));
        assert!(view.submission_id.is_none());
        assert!(view.job.is_none());
        assert!(view.shown.is_none());

        // the same submission coming back renders again
        assert!(view.sync(Some((1, &source, NO_BOXES)), |_, _| failing_render("again")));
    }

    #[test]
    fn preview_follows_image_generation() {
        let garbage = ImageDataUrl::from_text("garbage");
        let png = ImageDataUrl::from_bytes(&png_bytes(3, 2));
        let mut preview = Preview::default();

        preview.sync(0, None);
        assert!(preview.job.is_none());

        preview.sync(1, Some(&garbage));
        preview.sync(2, Some(&png));
        let decoded = wait(|| preview.finished()).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));

        // same generation, nothing restarts
        preview.sync(2, Some(&garbage));
        assert!(preview.job.is_none());

        preview.sync(3, None);
        assert!(preview.job.is_none());
        assert!(preview.shown.is_none());
        assert_eq!(preview.generation, 3);
    }
}
