use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use ocr::{http::HttpOcr, OcrService};

pub mod ocr;

/// Holds instanciated services.
pub struct Services {
    pub ocr: Box<dyn OcrService>,
}

impl Services {
    /// Create and initialise every service.
    pub fn new() -> Result<Self> {
        let mut services = Self {
            ocr: Box::new(HttpOcr::default()),
        };

        services
            .ocr
            .init()
            .with_context(|| format!("Failed to initialise OCR Service `{}`", services.ocr.name()))?;

        Ok(services)
    }

    /// Terminate then initialise every service again, so configuration changes take effect.
    pub fn reload(&mut self) -> Result<()> {
        self.ocr
            .terminate()
            .with_context(|| format!("Failed to terminate OCR Service `{}`", self.ocr.name()))?;
        self.ocr
            .init()
            .with_context(|| format!("Failed to initialise OCR Service `{}`", self.ocr.name()))
    }
}

impl Drop for Services {
    fn drop(&mut self) {
        if let Err(e) = self.ocr.terminate() {
            log::error!("Failed to terminate OCR Service: {e:#}");
        }
    }
}

/// A job being performed on a background thread. May or may not be finished.
pub struct ServiceJob<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> ServiceJob<T> {
    pub fn new<F: FnOnce() -> T + Send + 'static>(f: F) -> Self {
        std::thread::spawn(f).into()
    }
}

impl<T> ServiceJob<T> {
    /// Get the return value of this `ServiceJob` if it was finished.
    ///
    /// - Returns `Err` if the job has already finished and its return value was taken previously,
    ///   or if the job panicked;
    /// - Returns `Ok(None)` if the job has not finished yet;
    /// - Returns `Ok(Some(T))` if the job has finished.
    pub fn try_wait(&mut self) -> Result<Option<T>> {
        match self.handle.take() {
            None => Err(anyhow!("job already finished")),
            Some(handle) if handle.is_finished() => join(handle).map(Some),
            Some(handle) => {
                self.handle = Some(handle);
                Ok(None)
            }
        }
    }

    /// Wait for the job to finish and return its return value.
    pub fn wait(self) -> Result<T> {
        match self.handle {
            None => Err(anyhow!("job already finished")),
            Some(handle) => join(handle),
        }
    }
}

fn join<T>(handle: JoinHandle<T>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("background job panicked"))
}

impl<T> From<JoinHandle<T>> for ServiceJob<T> {
    fn from(handle: JoinHandle<T>) -> Self {
        ServiceJob {
            handle: Some(handle),
        }
    }
}
