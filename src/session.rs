use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use eframe::egui::DroppedFile;

use crate::{
    image_data::ImageDataUrl,
    services::{
        ocr::{BBoxType, Mode, OcrRequest, OcrResponse, OcrResult, OcrService, OcrServiceJob},
        ServiceJob,
    },
};

/// Everything the user has entered, plus the state of the current request.
pub struct Session {
    image: Option<ImageDataUrl>,
    /// Incremented each time `image` is replaced.
    image_generation: u64,
    pending_load: Option<ServiceJob<Result<ImageDataUrl>>>,

    pub mode: Mode,
    pub bbox_type: BBoxType,

    state: ViewState,
    submissions: u64,
}

pub enum ViewState {
    Idle,
    Loading(PendingRequest),
    Success(Submission),
    Failed(String),
}

pub struct PendingRequest {
    id: u64,
    image: ImageDataUrl,
    job: OcrServiceJob,
}

/// A finished request together with the image it was made with.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: u64,
    pub image: ImageDataUrl,
    pub result: OcrResult,
}

impl ViewState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

impl Session {
    pub fn new(mode: Mode, bbox_type: BBoxType) -> Self {
        Self {
            image: None,
            image_generation: 0,
            pending_load: None,
            mode,
            bbox_type,
            state: ViewState::Idle,
            submissions: 0,
        }
    }

    pub fn image(&self) -> Option<&ImageDataUrl> {
        self.image.as_ref()
    }

    pub fn image_generation(&self) -> u64 {
        self.image_generation
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Whether any background work is still pending.
    pub fn is_busy(&self) -> bool {
        self.state.is_loading() || self.pending_load.is_some()
    }

    /// Start reading an image file. Does nothing if `path` is empty.
    ///
    /// Replaces any load that has not finished yet.
    pub fn load_from_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return;
        }

        log::info!("Loading image from `{}`", path.display());
        self.start_load(ServiceJob::new(move || ImageDataUrl::from_file(&path)));
    }

    /// Start encoding image bytes which did not come with a path (eg. dropped from a browser).
    pub fn load_from_bytes(&mut self, bytes: impl AsRef<[u8]> + Send + 'static) {
        self.start_load(ServiceJob::new(move || -> Result<ImageDataUrl> {
            Ok(ImageDataUrl::from_bytes(bytes.as_ref()))
        }));
    }

    /// Load a file dropped onto the window, by path if it has one.
    pub fn load_dropped(&mut self, file: &DroppedFile) {
        match (&file.path, &file.bytes) {
            (Some(path), _) => self.load_from_file(path.clone()),
            (None, Some(bytes)) => self.load_from_bytes(Arc::clone(bytes)),
            (None, None) => {
                log::warn!("Dropped file `{}` has neither a path nor contents", file.name)
            }
        }
    }

    /// Use pasted text as the image, verbatim. Does nothing if `text` is blank.
    pub fn load_from_base64_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        self.discard_pending_load();
        self.set_image(ImageDataUrl::from_text(text));
    }

    fn start_load(&mut self, job: ServiceJob<Result<ImageDataUrl>>) {
        self.discard_pending_load();
        self.pending_load = Some(job);
    }

    fn discard_pending_load(&mut self) {
        if self.pending_load.take().is_some() {
            log::debug!("Discarding unfinished image load");
        }
    }

    fn set_image(&mut self, image: ImageDataUrl) {
        log::info!("Image set to `{image}`");
        self.image = Some(image);
        self.image_generation += 1;
    }

    /// Send the current image to `service` using the selected mode.
    ///
    /// This is the only way a request is started. Fails if no image is loaded, or if a request
    /// is already in progress.
    pub fn submit(&mut self, service: &mut dyn OcrService) -> Result<()> {
        if self.state.is_loading() {
            log::warn!("Rejected submission: a request is already in progress");
            bail!("A request is already in progress, wait for it to finish first.");
        }

        let Some(image) = self.image.clone() else {
            bail!("Load an image before submitting.");
        };

        let request = OcrRequest::new(self.mode, self.bbox_type, image.clone());
        log::info!(
            "Submitting image to `{}` via {} (bbox type: {:?})",
            request.endpoint(),
            service.name(),
            request.bbox_type,
        );

        self.submissions += 1;
        self.state = ViewState::Loading(PendingRequest {
            id: self.submissions,
            image,
            job: service.submit(request),
        });

        Ok(())
    }

    /// Collect results from finished background jobs. Call once per frame.
    ///
    /// Request failures become [`ViewState::Failed`]; only image loading errors are returned.
    pub fn poll(&mut self) -> Result<()> {
        self.poll_request();
        self.poll_load()
    }

    fn poll_load(&mut self) -> Result<()> {
        let Some(job) = &mut self.pending_load else {
            return Ok(());
        };

        let loaded = match job.try_wait() {
            Ok(None) => return Ok(()),
            Ok(Some(loaded)) => loaded,
            Err(e) => Err(e),
        };
        self.pending_load = None;

        self.set_image(loaded.context("Failed to load image")?);
        Ok(())
    }

    fn poll_request(&mut self) {
        let ViewState::Loading(pending) = &mut self.state else {
            return;
        };

        let response = match pending.job.try_wait() {
            Ok(None) => return,
            Ok(Some(response)) => response,
            Err(e) => Err(e),
        };

        self.state = match response {
            Ok(OcrResponse::Success(result)) => {
                log::info!("Request {} succeeded", pending.id);
                ViewState::Success(Submission {
                    id: pending.id,
                    image: pending.image.clone(),
                    result,
                })
            }
            Ok(OcrResponse::Failure(message)) => {
                log::warn!("Request {} was refused: {message}", pending.id);
                ViewState::Failed(message)
            }
            Err(e) => {
                log::error!("Request {} failed: {e:#}", pending.id);
                ViewState::Failed(format!("Request failed: {e}"))
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Mutex},
        time::{Duration, Instant},
    };

    use eframe::egui;

    use super::*;
    use crate::{image_data::png_bytes, services::ocr::BBox};

    /// Answers every request with a scripted response, optionally waiting for a signal first.
    struct FakeOcr {
        requests: Arc<Mutex<Vec<OcrRequest>>>,
        reply: Result<OcrResponse, String>,
        gate: Option<Arc<Mutex<mpsc::Receiver<()>>>>,
    }

    impl FakeOcr {
        fn replying(reply: Result<OcrResponse, String>) -> Self {
            Self {
                requests: Default::default(),
                reply,
                gate: None,
            }
        }
    }

    impl OcrService for FakeOcr {
        fn name(&self) -> &'static str {
            "Fake"
        }

        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }

        fn show_config_ui(&mut self, _ui: &mut egui::Ui) {}

        fn submit(&mut self, request: OcrRequest) -> OcrServiceJob {
            self.requests.lock().unwrap().push(request);
            let reply = self.reply.clone();
            let gate = self.gate.clone();

            ServiceJob::new(move || {
                if let Some(gate) = gate {
                    let _ = gate.lock().unwrap().recv();
                }
                reply.map_err(|e| anyhow::anyhow!(e))
            })
        }
    }

    fn settle(session: &mut Session) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_busy() {
            session.poll()?;
            assert!(Instant::now() < deadline, "session never settled");
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn session_with_image() -> Session {
        let mut session = Session::new(Mode::BBoxes, BBoxType::Word);
        session.load_from_base64_text("data:image/png;base64,AAAA");
        session
    }

    #[test]
    fn bboxes_submission_succeeds() {
        let bboxes = vec![
            BBox {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 10.0,
                y_max: 10.0,
            };
            3
        ];
        let mut ocr = FakeOcr::replying(Ok(OcrResponse::Success(OcrResult::BBoxes(
            bboxes.clone(),
        ))));
        let mut session = session_with_image();

        session.submit(&mut ocr).unwrap();
        assert!(session.state().is_loading());
        settle(&mut session).unwrap();

        let requests = ocr.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint(), "/api/get-bboxes");
        assert_eq!(requests[0].bbox_type, Some(BBoxType::Word));
        assert_eq!(requests[0].base64_image.as_str(), "data:image/png;base64,AAAA");

        let ViewState::Success(submission) = session.state() else {
            panic!("expected success");
        };
        assert_eq!(submission.result, OcrResult::BBoxes(bboxes));
        assert_eq!(submission.image.as_str(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn switching_mode_changes_endpoint_and_body() {
        let mut ocr = FakeOcr::replying(Ok(OcrResponse::Success(OcrResult::Text(
            "Hello".to_owned(),
        ))));
        let mut session = session_with_image();

        session.mode = Mode::Text;
        session.submit(&mut ocr).unwrap();
        settle(&mut session).unwrap();

        let requests = ocr.requests.lock().unwrap();
        assert_eq!(requests[0].endpoint(), "/api/get-text");
        assert_eq!(requests[0].bbox_type, None);

        let ViewState::Success(submission) = session.state() else {
            panic!("expected success");
        };
        assert_eq!(submission.result, OcrResult::Text("Hello".to_owned()));
    }

    #[test]
    fn failure_message_is_shown_verbatim() {
        let mut ocr = FakeOcr::replying(Ok(OcrResponse::Failure(
            "Invalid bbox_type. Must be one of: word, line, paragraph, block, or page.".to_owned(),
        )));
        let mut session = session_with_image();

        session.submit(&mut ocr).unwrap();
        settle(&mut session).unwrap();

        let ViewState::Failed(message) = session.state() else {
            panic!("expected failure");
        };
        assert_eq!(
            message,
            "Invalid bbox_type. Must be one of: word, line, paragraph, block, or page."
        );
    }

    #[test]
    fn transport_errors_become_a_generic_message() {
        let mut ocr = FakeOcr::replying(Err("connection refused".to_owned()));
        let mut session = session_with_image();

        session.submit(&mut ocr).unwrap();
        settle(&mut session).unwrap();

        let ViewState::Failed(message) = session.state() else {
            panic!("expected failure");
        };
        assert_eq!(message, "Request failed: connection refused");
    }

    #[test]
    fn second_submit_while_loading_is_rejected() {
        let (tx, rx) = mpsc::channel();
        let mut ocr = FakeOcr::replying(Ok(OcrResponse::Success(OcrResult::Text(
            "first".to_owned(),
        ))));
        ocr.gate = Some(Arc::new(Mutex::new(rx)));
        let mut session = session_with_image();

        session.submit(&mut ocr).unwrap();
        session.load_from_base64_text("data:image/png;base64,BBBB");
        assert!(session.submit(&mut ocr).is_err());
        assert_eq!(ocr.requests.lock().unwrap().len(), 1);

        tx.send(()).unwrap();
        settle(&mut session).unwrap();

        // the result belongs to the image which was submitted, not the one loaded afterwards
        let ViewState::Success(submission) = session.state() else {
            panic!("expected success");
        };
        assert_eq!(submission.image.as_str(), "data:image/png;base64,AAAA");

        tx.send(()).unwrap();
        session.submit(&mut ocr).unwrap();
        settle(&mut session).unwrap();
        assert_eq!(ocr.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn submit_without_image_is_rejected() {
        let mut ocr = FakeOcr::replying(Ok(OcrResponse::Failure(String::new())));
        let mut session = Session::new(Mode::Text, BBoxType::Word);

        assert!(session.submit(&mut ocr).is_err());
        assert!(matches!(session.state(), ViewState::Idle));
        assert!(ocr.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn blank_text_and_empty_path_are_ignored() {
        let mut session = Session::new(Mode::Text, BBoxType::Word);
        session.load_from_base64_text("   \n");
        session.load_from_file("");

        assert!(session.image().is_none());
        assert!(!session.is_busy());
        assert_eq!(session.image_generation(), 0);
    }

    #[test]
    fn file_load_replaces_image() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), png_bytes(3, 3)).unwrap();

        let mut session = session_with_image();
        let generation = session.image_generation();
        session.load_from_file(file.path());
        settle(&mut session).unwrap();

        let image = session.image().unwrap();
        assert!(image.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(session.image_generation(), generation + 1);
    }

    #[test]
    fn failed_file_load_keeps_previous_image() {
        let mut session = session_with_image();
        session.load_from_file("/definitely/not/here.png");

        assert!(settle(&mut session).is_err());
        assert!(!session.is_busy());
        assert_eq!(
            session.image().unwrap().as_str(),
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn pasting_discards_unfinished_file_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), png_bytes(3, 3)).unwrap();

        let mut session = Session::new(Mode::Text, BBoxType::Word);
        session.load_from_file(file.path());
        session.load_from_base64_text("pasted");
        settle(&mut session).unwrap();

        assert_eq!(session.image().unwrap().as_str(), "pasted");
        assert_eq!(session.image_generation(), 1);
    }

    #[test]
    fn dropped_bytes_are_encoded() {
        let mut session = Session::new(Mode::Text, BBoxType::Word);
        session.load_dropped(&DroppedFile {
            bytes: Some(png_bytes(2, 2).into()),
            ..Default::default()
        });
        settle(&mut session).unwrap();

        assert!(session
            .image()
            .unwrap()
            .as_str()
            .starts_with("data:image/png;base64,"));
    }
}
