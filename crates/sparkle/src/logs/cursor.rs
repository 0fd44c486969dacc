use tokio::sync::{Mutex, MutexGuard};

use super::filter::separator_kind;
use super::{LogChunk, LogKind, LogLine};

/// Authoritative read position in a server-side log.
///
/// Fetchers snapshot the offset, issue their request without holding the
/// guard, then re-acquire it and commit only if the offset did not move in the
/// meantime. Emission happens while the guard is held, so lines leave in
/// offset order no matter how many fetchers share the cursor.
#[derive(Debug)]
pub struct LogCursor {
    state: Mutex<CursorState>,
}

impl LogCursor {
    pub fn new(kind: LogKind) -> Self {
        Self::starting_at(0, kind)
    }

    pub fn starting_at(offset: u64, kind: LogKind) -> Self {
        Self {
            state: Mutex::new(CursorState {
                offset,
                section: kind,
                pending: String::new(),
            }),
        }
    }

    /// Current offset, read under the guard.
    pub async fn offset(&self) -> u64 {
        self.state.lock().await.offset
    }

    pub async fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().await
    }
}

/// State protected by the cursor guard.
#[derive(Debug)]
pub struct CursorState {
    offset: u64,
    /// Section of the batch log currently being read.
    section: LogKind,
    /// Text received after the last newline of a text chunk.
    pending: String,
}

impl CursorState {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Turn a fetched chunk into lines and move the offset past it.
    ///
    /// The offset moves by the raw amount the server returned, independent of
    /// how many lines survive filtering.
    pub fn commit(&mut self, chunk: LogChunk, default_kind: LogKind) -> Vec<LogLine> {
        self.offset += chunk.consumed();
        match chunk {
            LogChunk::Lines(lines) => lines
                .into_iter()
                .filter_map(|line| match separator_kind(&line) {
                    Some(kind) => {
                        self.section = kind;
                        None
                    }
                    None => Some(LogLine::new(self.section, line)),
                })
                .collect(),
            LogChunk::Text(text) => {
                self.pending.push_str(&text);
                let Some(last_newline) = self.pending.rfind('\n') else {
                    return Vec::new();
                };
                let rest = self.pending.split_off(last_newline + 1);
                let complete = std::mem::replace(&mut self.pending, rest);
                complete
                    .lines()
                    .filter(|line| separator_kind(line).is_none())
                    .map(|line| LogLine::new(default_kind, line))
                    .collect()
            }
        }
    }

    /// Take the buffered partial line, if any.
    pub fn drain(&mut self, kind: LogKind) -> Option<LogLine> {
        if self.pending.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.pending);
        let text = text.strip_suffix('\r').unwrap_or(&text).to_owned();
        Some(LogLine::new(kind, text))
    }
}
