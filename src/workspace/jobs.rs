// src/workspace/jobs.rs
//
// A processing run detached from the workspace.
//
// A job owns everything it needs (shared source bytes and a settings snapshot), so
// jobs for different entries can run on any thread in any order. The workspace
// matches the outcome back by (entry, run) and drops it if the run went stale.

use crate::engine::{EncodedImage, Pipeline, SourceFile};
use crate::error::ProcessingFailed;
use crate::format::CompressionSettings;
use crate::workspace::entry::{EntryId, RunId};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct ProcessingJob {
    pub entry: EntryId,
    pub run: RunId,
    pub file: Arc<SourceFile>,
    pub settings: CompressionSettings,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub entry: EntryId,
    pub run: RunId,
    pub elapsed: Duration,
    pub result: Result<EncodedImage, ProcessingFailed>,
}

impl ProcessingJob {
    pub fn run(&self, pipeline: &Pipeline) -> JobOutcome {
        let start = Instant::now();
        let result = pipeline.process(&self.file, &self.settings);
        let elapsed = start.elapsed();
        tracing::debug!(
            entry = %self.entry,
            ok = result.is_ok(),
            elapsed_ms = elapsed.as_millis() as u64,
            "job finished"
        );
        JobOutcome {
            entry: self.entry,
            run: self.run,
            elapsed,
            result,
        }
    }
}
