// src/workspace/entry.rs
//
// One uploaded image and its processing state.
//
// Entries are values: every transition builds the next entry and swaps it in whole,
// so a reader never observes a half-updated entry.

use crate::engine::SourceFile;
use crate::format::{CompressionSettings, Dimensions, ImageFormat};
use crate::workspace::handles::HandleId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// Identifies one processing run of one entry. Bumped every time a run is armed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// Output of a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedResult {
    pub handle: HandleId,
    pub bytes: Arc<Vec<u8>>,
    pub size: usize,
    /// `(original - size) / original * 100`; negative when the output grew.
    pub reduction_percent: f64,
    pub elapsed: Duration,
    /// Effective container format (never ORIGINAL).
    pub format: ImageFormat,
    pub dimensions: Dimensions,
}

/// Percentage saved relative to `original`. An empty original reports 0.
pub fn reduction_percent(original: usize, output: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - output as f64) / original as f64 * 100.0
}

#[derive(Clone, Debug)]
pub struct ImageEntry {
    pub(crate) id: EntryId,
    pub(crate) file: Arc<SourceFile>,
    pub(crate) original_size: usize,
    pub(crate) dimensions: Dimensions,
    pub(crate) status: EntryStatus,
    pub(crate) settings: CompressionSettings,
    pub(crate) preview: HandleId,
    pub(crate) result: Option<ProcessedResult>,
    pub(crate) error: Option<String>,
    pub(crate) run: RunId,
}

impl ImageEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Natural size probed at creation; (0, 0) when probing failed.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    pub fn preview(&self) -> HandleId {
        self.preview
    }

    pub fn result(&self) -> Option<&ProcessedResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Bytes saved by the current result, negative when the output is larger.
    pub fn saved_bytes(&self) -> Option<i64> {
        self.result
            .as_ref()
            .map(|r| self.original_size as i64 - r.size as i64)
    }
}
