use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::LogKind;
use super::html::extract_log_text;
use crate::config::join_path;
use crate::error::Result;
use crate::service::{BatchBackend, BatchKey, LogPageService};
use crate::state::JobState;

/// Raw result of one log fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    /// Whole lines, addressed by line index.
    Lines(Vec<String>),
    /// Arbitrary text, addressed by byte offset. May end mid-line.
    Text(String),
}

impl LogChunk {
    /// How far the offset moves once this chunk is committed.
    pub fn consumed(&self) -> u64 {
        match self {
            Self::Lines(lines) => lines.len() as u64,
            Self::Text(text) => text.len() as u64,
        }
    }
}

/// Somewhere log output can be read from incrementally.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Kind assigned to lines that carry no section information of their own.
    fn kind(&self) -> LogKind;

    /// Fetch what follows `offset`, at most `max` lines where the source is line based.
    async fn fetch(&self, offset: u64, max: u32) -> Result<LogChunk>;

    /// Whether an empty fetch means "nothing yet" rather than "nothing more".
    async fn should_wait(&self) -> Result<bool>;
}

/// The batch service's own `/log` endpoint.
pub struct LivyLogSource {
    backend: Arc<dyn BatchBackend>,
    key: BatchKey,
}

impl LivyLogSource {
    pub fn new(backend: Arc<dyn BatchBackend>, key: BatchKey) -> Self {
        Self { backend, key }
    }
}

#[async_trait]
impl LogSource for LivyLogSource {
    fn kind(&self) -> LogKind {
        LogKind::Stdout
    }

    async fn fetch(&self, offset: u64, max: u32) -> Result<LogChunk> {
        let lines = self.backend.log_page(&self.key, offset, max).await?;
        Ok(LogChunk::Lines(lines))
    }

    async fn should_wait(&self) -> Result<bool> {
        // Weak heuristic: a job that is still starting without an application
        // id is assumed to produce more output later. A job that dies before
        // YARN accepts it reads as "still starting" until the state flips.
        let status = self.backend.status(&self.key).await?;
        Ok(status.state == JobState::Starting && status.app_id.is_none())
    }
}

/// A driver container log file served by the node manager or the log
/// aggregation history pages.
pub struct ContainerLogSource {
    pages: Arc<dyn LogPageService>,
    base: Url,
    kind: LogKind,
    backend: Arc<dyn BatchBackend>,
    key: BatchKey,
}

impl ContainerLogSource {
    /// `base` is the resolved, externally reachable container log URL.
    pub fn new(
        pages: Arc<dyn LogPageService>,
        base: Url,
        kind: LogKind,
        backend: Arc<dyn BatchBackend>,
        key: BatchKey,
    ) -> Self {
        Self {
            pages,
            base,
            kind,
            backend,
            key,
        }
    }

    fn page_url(&self, offset: u64) -> Result<Url> {
        let mut url = join_path(&self.base, self.kind.file_name())?;
        url.query_pairs_mut()
            .append_pair("start", &offset.to_string());
        Ok(url)
    }
}

#[async_trait]
impl LogSource for ContainerLogSource {
    fn kind(&self) -> LogKind {
        self.kind
    }

    async fn fetch(&self, offset: u64, _max: u32) -> Result<LogChunk> {
        let url = self.page_url(offset)?;
        let html = self.pages.fetch_page(&url).await?;
        let text = extract_log_text(&html, self.kind.file_name()).unwrap_or_default();
        Ok(LogChunk::Text(text))
    }

    async fn should_wait(&self) -> Result<bool> {
        let status = self.backend.status(&self.key).await?;
        Ok(!self.backend.is_done(&status))
    }
}
