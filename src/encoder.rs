//! The encoder seam.
//!
//! The [`Encoder`] trait is the boundary to the external encoding engine.
//! A pipeline never owns an encoder: [`Pipeline::commit`](crate::Pipeline::commit)
//! receives one, hands it the committed [`EncodeRequest`], and reports its
//! failure as [`PipelineError::Encoder`](crate::PipelineError::Encoder).
//! Nothing here retries.
//!
//! The only implementation shipped with the crate is [`SpoolEncoder`], which
//! writes each request as JSON into a directory watched by whatever runs the
//! actual transcode.

use crate::session::EncodeRequest;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoder rejected the request: {0}")]
    Rejected(String),
    #[error("encoder failed (code {code}): {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Receiver of committed encode plans.
///
/// `Sync` so one encoder can serve several pipelines planned in parallel.
pub trait Encoder: Sync {
    fn encode(&self, request: &EncodeRequest) -> Result<(), EncoderError>;
}

/// Writes each request to `<dir>/<fingerprint>.json`.
///
/// Identical plans land in the same file, so re-submitting a plan is
/// idempotent.
#[derive(Debug, Clone)]
pub struct SpoolEncoder {
    dir: PathBuf,
}

impl SpoolEncoder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a request is (or would be) spooled to.
    pub fn path_for(&self, request: &EncodeRequest) -> Result<PathBuf, EncoderError> {
        Ok(self.dir.join(format!("{}.json", request.fingerprint()?)))
    }
}

impl Encoder for SpoolEncoder {
    fn encode(&self, request: &EncodeRequest) -> Result<(), EncoderError> {
        let path = self.path_for(request)?;
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(request)?;
        std::fs::write(&path, json)?;
        log::info!("spooled encode request to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::dimension::Dimension;
    use crate::session::ExportSession;
    use std::sync::Mutex;

    /// Mock encoder that records requests without encoding anything.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockEncoder {
        pub requests: Mutex<Vec<EncodeRequest>>,
        pub fail_with: Option<String>,
    }

    impl MockEncoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(reason: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_with: Some(reason.to_string()),
            }
        }

        pub fn get_requests(&self) -> Vec<EncodeRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Encoder for MockEncoder {
        fn encode(&self, request: &EncodeRequest) -> Result<(), EncoderError> {
            if let Some(reason) = &self.fail_with {
                return Err(EncoderError::Rejected(reason.clone()));
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    #[test]
    fn mock_records_requests() {
        let encoder = MockEncoder::new();
        let request = ExportSession::new(Dimension::new(640, 360)).commit();
        encoder.encode(&request).unwrap();
        assert_eq!(encoder.get_requests(), vec![request]);
    }

    #[test]
    fn spool_writes_fingerprinted_json() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = SpoolEncoder::new(tmp.path().join("queue"));
        let request = ExportSession::new(Dimension::new(640, 360)).commit();

        encoder.encode(&request).unwrap();

        let path = encoder.path_for(&request).unwrap();
        assert!(path.ends_with(format!("{}.json", request.fingerprint().unwrap())));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["codec"], "libx264");
        assert_eq!(written["output_dimension"], "640x360");
    }

    #[test]
    fn spool_reports_io_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let encoder = SpoolEncoder::new(&blocker);
        let request = ExportSession::new(Dimension::new(640, 360)).commit();
        assert!(matches!(encoder.encode(&request), Err(EncoderError::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn spool_refuses_request_without_fingerprint() {
        use crate::session::{Anchor, Filter};
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let encoder = SpoolEncoder::new(tmp.path().join("queue"));
        let mut session = ExportSession::new(Dimension::new(640, 360));
        session.push_neutral_filter(Filter::Watermark {
            asset: PathBuf::from(OsStr::from_bytes(b"logo\xff.png")),
            anchor: Anchor::Center,
            opacity: 1.0,
        });
        let request = session.commit();

        assert!(matches!(encoder.encode(&request), Err(EncoderError::Json(_))));
        assert!(!tmp.path().join("queue").exists());
    }
}
