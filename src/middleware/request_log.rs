//! Durable request logging, the first pipeline stage.
//!
//! Every request gets exactly one line in an append-only log file before any
//! policy stage can reject it, so the log is a complete record of attempts,
//! not just of admitted traffic. Logging failures are swallowed: an
//! observability problem must never turn into a client-facing error.

use async_trait::async_trait;
use axum::{body::Body, extract::Request};
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use crate::auth::Subject;

use super::pipeline::{PipelineStage, StageError, StageVerdict};

/// One observed request, formatted as a single log line.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub timestamp: DateTime<Local>,
    pub username: Option<String>,
    pub path: String,
}

impl RequestRecord {
    pub fn new(username: Option<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            username,
            path: path.into(),
        }
    }
}

impl std::fmt::Display for RequestRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - User: {} - Path: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.username.as_deref().unwrap_or("Anonymous"),
            self.path
        )
    }
}

/// Append-only request log shared across workers.
///
/// Lines are formatted up front and written with a single `write_all` under
/// the lock, so concurrent writers never interleave within a line.
#[derive(Clone)]
pub struct RequestLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl RequestLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow::anyhow!("Failed to open request log {:?}: {}", path, err))?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as one line.
    pub fn append(&self, record: &RequestRecord) -> std::io::Result<()> {
        let line = format!("{}\n", record);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

/// Pipeline stage writing the request log.
pub struct RequestLogStage {
    log: RequestLog,
}

impl RequestLogStage {
    pub fn new(log: RequestLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PipelineStage for RequestLogStage {
    fn name(&self) -> &'static str {
        "request_log"
    }

    // Written in `async_trait`'s desugared form: the returned future must be
    // `Send`, but `Body` is `!Sync`, so `&Request<Body>` cannot be captured
    // by the future. All request inspection happens before it is built.
    fn check<'life0, 'life1, 'async_trait>(
        &'life0 self,
        request: &'life1 Request<Body>,
    ) -> Pin<Box<dyn Future<Output = Result<StageVerdict, StageError>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let username = request
            .extensions()
            .get::<Subject>()
            .map(|subject| subject.username.clone());
        let record = RequestRecord::new(username, request.uri().path());

        if let Err(err) = self.log.append(&record) {
            tracing::warn!(error = %err, path = %record.path, "Failed to write request log line");
        }

        Box::pin(async move { Ok(StageVerdict::Continue) })
    }
}
