use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use eframe::egui;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{config::Config, services::ServiceJob};

use super::{BBox, Mode, OcrRequest, OcrResponse, OcrResult, OcrService, OcrServiceJob};

/// Talks to an OCR server exposing `/api/get-bboxes` and `/api/get-text`.
#[derive(Default)]
pub struct HttpOcr {
    config: HttpOcrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOcrConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpOcrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_owned(),
            timeout_secs: 60,
        }
    }
}

impl HttpOcrConfig {
    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url.trim_end_matches('/'))
    }
}

impl Config for HttpOcrConfig {
    fn path() -> &'static str {
        "ocr_services/http.json"
    }

    fn show_ui(&mut self, ui: &mut egui::Ui) {
        ui.label("Make sure the OCR server is running!");
        ui.horizontal(|ui| {
            ui.label("Server URL:");
            ui.text_edit_singleline(&mut self.base_url);
        });
        ui.horizontal(|ui| {
            ui.label("Timeout (seconds):");
            ui.add(egui::DragValue::new(&mut self.timeout_secs).range(1..=3600));
        });
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct BBoxesResult {
    bboxes: Vec<BBox>,
}

#[derive(Deserialize)]
struct TextResult {
    text: String,
}

/// Turn a response body into an [`OcrResponse`] whose result matches `mode`.
///
/// The server answers rejected requests with a 4xx/5xx status and the same JSON envelope, so the
/// status code is only used for error context.
fn parse_response(mode: Mode, url: &str, status: u16, body: &str) -> Result<OcrResponse> {
    fn parse<T: DeserializeOwned>(url: &str, status: u16, body: &str) -> Result<Envelope<T>> {
        serde_json::from_str(body).with_context(|| {
            format!("HttpOcr: Response from `{url}` (status {status}) is not a valid OCR response")
        })
    }

    fn unwrap_envelope<T>(
        envelope: Envelope<T>,
        url: &str,
        f: impl FnOnce(T) -> OcrResult,
    ) -> Result<OcrResponse> {
        match envelope {
            Envelope {
                success: true,
                result: Some(result),
                ..
            } => Ok(OcrResponse::Success(f(result))),
            Envelope { success: true, .. } => Err(anyhow!(
                "HttpOcr: Response from `{url}` reported success but contained no result"
            )),
            Envelope { error, .. } => Ok(OcrResponse::Failure(
                error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "The OCR service reported an unknown error.".to_owned()),
            )),
        }
    }

    match mode {
        Mode::BBoxes => unwrap_envelope(parse::<BBoxesResult>(url, status, body)?, url, |r| {
            OcrResult::BBoxes(r.bboxes)
        }),
        Mode::Text => unwrap_envelope(parse::<TextResult>(url, status, body)?, url, |r| {
            OcrResult::Text(r.text)
        }),
    }
}

impl OcrService for HttpOcr {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn init(&mut self) -> Result<()> {
        self.config = HttpOcrConfig::load().context("HttpOcr: Failed to load configuration file")?;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.config
            .save()
            .context("HttpOcr: Failed to save configuration file")?;
        Ok(())
    }

    fn show_config_ui(&mut self, ui: &mut egui::Ui) {
        self.config.show_ui(ui);
    }

    fn submit(&mut self, request: OcrRequest) -> OcrServiceJob {
        let url = self.config.url(request.endpoint());
        let timeout = Duration::from_secs(self.config.timeout_secs);

        ServiceJob::new(move || -> Result<OcrResponse> {
            log::info!("HttpOcr: POST {url}");

            let response = attohttpc::post(&url)
                .timeout(timeout)
                .json(&request)
                .context("HttpOcr: Failed to serialise request body")?
                .send()
                .with_context(|| format!("HttpOcr: Failed to send http request to `{url}`"))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .with_context(|| format!("HttpOcr: Failed to read response body from `{url}`"))?;

            parse_response(request.mode, &url, status, &body)
        })
    }
}
