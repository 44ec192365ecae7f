use anyhow::Result;
use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::image_data::ImageDataUrl;

use super::ServiceJob;

pub mod http;

pub type OcrServiceJob = ServiceJob<Result<OcrResponse>>;

pub trait OcrService {
    /// Name of the service, shown in the UI and in error messages.
    fn name(&self) -> &'static str;

    /// Initialise the service (ie. load its configuration file, etc).
    fn init(&mut self) -> Result<()>;
    /// Terminate the service (ie. save its configuration file, etc).
    fn terminate(&mut self) -> Result<()>;

    /// Show the config UI for the service's configuration.
    fn show_config_ui(&mut self, ui: &mut egui::Ui);

    /// Send an image to the service.
    ///
    /// The job returns `Err` only for failures outside of the service's own response (the
    /// service could not be reached, its response was not understood, etc).
    fn submit(&mut self, request: OcrRequest) -> OcrServiceJob;
}

/// What the user wants extracted from an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    BBoxes,
    Text,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::BBoxes, Mode::Text];

    pub fn endpoint(self) -> &'static str {
        match self {
            Self::BBoxes => "/api/get-bboxes",
            Self::Text => "/api/get-text",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BBoxes => "Bounding Boxes",
            Self::Text => "Extract Text",
        }
    }
}

/// Granularity of the bounding boxes returned in [`Mode::BBoxes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BBoxType {
    Word,
    Line,
    Paragraph,
    Block,
    Page,
}

impl BBoxType {
    pub const ALL: [BBoxType; 5] = [
        BBoxType::Word,
        BBoxType::Line,
        BBoxType::Paragraph,
        BBoxType::Block,
        BBoxType::Page,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Word => "Word",
            Self::Line => "Line",
            Self::Paragraph => "Paragraph",
            Self::Block => "Block",
            Self::Page => "Page",
        }
    }
}

/// An axis-aligned rectangle around a detected text region, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// The body sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrRequest {
    #[serde(skip)]
    pub mode: Mode,
    pub base64_image: ImageDataUrl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_type: Option<BBoxType>,
}

impl OcrRequest {
    /// `bbox_type` is only sent along in [`Mode::BBoxes`].
    pub fn new(mode: Mode, bbox_type: BBoxType, image: ImageDataUrl) -> Self {
        Self {
            mode,
            base64_image: image,
            bbox_type: (mode == Mode::BBoxes).then_some(bbox_type),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.mode.endpoint()
    }
}

/// The data returned by a successful request. Its variant always matches the request's [`Mode`].
#[derive(Debug, Clone, PartialEq)]
pub enum OcrResult {
    BBoxes(Vec<BBox>),
    Text(String),
}

/// The service's answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrResponse {
    Success(OcrResult),
    /// The service refused or failed to process the image. Contains its error message.
    Failure(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bboxes_request_carries_bbox_type() {
        let request = OcrRequest::new(
            Mode::BBoxes,
            BBoxType::Word,
            ImageDataUrl::from_text("data:image/png;base64,AAAA"),
        );

        assert_eq!(request.endpoint(), "/api/get-bboxes");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "base64_image": "data:image/png;base64,AAAA",
                "bbox_type": "word"
            })
        );
    }

    #[test]
    fn text_request_omits_bbox_type() {
        let request = OcrRequest::new(
            Mode::Text,
            BBoxType::Block,
            ImageDataUrl::from_text("data:image/png;base64,AAAA"),
        );

        assert_eq!(request.endpoint(), "/api/get-text");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "base64_image": "data:image/png;base64,AAAA" })
        );
    }

    #[test]
    fn bbox_types_serialise_lowercase() {
        let names: Vec<_> = BBoxType::ALL
            .iter()
            .map(|t| serde_json::to_value(t).unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                json!("word"),
                json!("line"),
                json!("paragraph"),
                json!("block"),
                json!("page")
            ]
        );
    }

    #[test]
    fn integer_coordinates_deserialise() {
        let bbox: BBox =
            serde_json::from_value(json!({"x_min": 1, "y_min": 2, "x_max": 11, "y_max": 7}))
                .unwrap();
        assert_eq!(
            bbox,
            BBox {
                x_min: 1.0,
                y_min: 2.0,
                x_max: 11.0,
                y_max: 7.0
            }
        );
    }
}
