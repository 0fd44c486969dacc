//! Incremental log retrieval for batch jobs.
//!
//! Two sources are supported: the batch service's own `/log` endpoint, which is
//! line oriented, and the driver container's log pages, which are HTML and
//! addressed by byte offset. Both are consumed through [`LogStreamer`] so the
//! offset bookkeeping and deduplication live in one place.

mod cursor;
mod filter;
mod html;
mod resolver;
mod source;
mod streamer;

pub use cursor::{CursorState, LogCursor};
pub use html::{decode_entities, extract_log_text};
pub use resolver::{LogUrlResolver, convert_log_url};
pub use source::{ContainerLogSource, LivyLogSource, LogChunk, LogSource};
pub use streamer::LogStreamer;

/// Which output of the job a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    /// `YARN Diagnostics:` section of the batch log.
    Diagnostics,
}

impl LogKind {
    /// Name of the container log file for this kind.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Diagnostics => "syslog",
        }
    }
}

/// Driver container log files that can be tailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DriverLog {
    Stdout,
    Stderr,
}

impl From<DriverLog> for LogKind {
    fn from(log: DriverLog) -> Self {
        match log {
            DriverLog::Stdout => Self::Stdout,
            DriverLog::Stderr => Self::Stderr,
        }
    }
}

/// One line of job output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub kind: LogKind,
    pub text: String,
}

impl LogLine {
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}
