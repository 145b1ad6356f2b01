// src/workspace.rs
//
// The set of images the user is working on and their per-image state machine.
//
// Every entry moves Pending -> Processing -> Done | Error. A settings change that
// alters the output arms a new run (Processing again); everything else only stores
// the settings. Runs execute outside the workspace as `ProcessingJob`s and report
// back through `complete`, which ignores outcomes of superseded runs.

pub mod entry;
pub mod handles;
pub mod jobs;
pub mod naming;
pub mod policy;

pub use entry::{reduction_percent, EntryId, EntryStatus, ImageEntry, ProcessedResult, RunId};
pub use handles::{HandleId, HandleStore};
pub use jobs::{JobOutcome, ProcessingJob};
pub use naming::{bulk_file_name, download_file_name, format_bytes};
pub use policy::{
    aspect_locked_dimension, derived_output, pin_format, reprocess_base, requires_reprocess,
    EditedDimension,
};

use crate::engine::{get_pool, Pipeline, SourceFile};
use crate::format::{CompressionSettings, Dimensions, ImageFormat, SettingsUpdate, DEFAULT_QUALITY};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings applied to newly added images.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorkspaceDefaults {
    pub format: ImageFormat,
    pub quality: f64,
}

impl Default for WorkspaceDefaults {
    fn default() -> Self {
        Self {
            format: ImageFormat::Original,
            quality: DEFAULT_QUALITY,
        }
    }
}

/// A finished output ready to be saved.
#[derive(Clone, Debug, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub handle: HandleId,
    pub bytes: Arc<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct Workspace {
    defaults: WorkspaceDefaults,
    entries: Vec<ImageEntry>,
    handles: HandleStore,
    queue: Vec<ProcessingJob>,
    next_entry: u64,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: WorkspaceDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn defaults(&self) -> WorkspaceDefaults {
        self.defaults
    }

    /// Add images and queue their first run.
    ///
    /// Natural dimensions are probed with `pipeline`; an image that cannot be probed
    /// is still added with (0, 0) and left for the pipeline to report.
    pub fn add_files(
        &mut self,
        pipeline: &Pipeline,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Vec<EntryId> {
        let mut added = Vec::new();
        for file in files {
            let dimensions = pipeline.probe_dimensions(&file).unwrap_or_else(|err| {
                warn!(file = file.name(), error = %err, "could not probe image dimensions");
                Dimensions::default()
            });
            let format = pin_format(self.defaults.format, file.is_vector());
            let settings = CompressionSettings::for_image(format, self.defaults.quality, dimensions);

            self.next_entry += 1;
            let id = EntryId::new(self.next_entry);
            let preview = self.handles.insert(file.shared_bytes());
            let entry = ImageEntry {
                id,
                original_size: file.len(),
                file: Arc::new(file),
                dimensions,
                status: EntryStatus::Pending,
                settings,
                preview,
                result: None,
                error: None,
                run: RunId::default(),
            };
            debug!(%id, file = entry.name(), %dimensions, format = %settings.format, "image added");

            let armed = self.arm(entry);
            self.entries.push(armed);
            added.push(id);
        }
        added
    }

    /// Apply a partial settings change. Returns true when it armed a new run.
    ///
    /// The settings are stored either way. Unknown ids are ignored.
    pub fn update_settings(&mut self, id: EntryId, update: SettingsUpdate) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let current = &self.entries[index];
        let next_settings = current.settings.with_update(&update);
        self.replace_settings(index, next_settings)
    }

    /// Resize edit that honors the entry's aspect lock. With the lock on (and a known
    /// natural size) the other axis is recomputed from the natural ratio.
    pub fn set_resize_dimension(&mut self, id: EntryId, edited: EditedDimension, value: u32) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        let settings = entry.settings;
        let locked = if settings.maintain_aspect_ratio {
            aspect_locked_dimension(entry.dimensions, edited, value)
        } else {
            None
        };
        let (width, height) = match edited {
            EditedDimension::Width => (value, locked.unwrap_or(settings.resize_height)),
            EditedDimension::Height => (locked.unwrap_or(settings.resize_width), value),
        };
        self.update_settings(
            id,
            SettingsUpdate {
                resize_width: Some(width),
                resize_height: Some(height),
                ..SettingsUpdate::default()
            },
        )
    }

    /// Change the default format and apply it to every entry.
    pub fn set_global_format(&mut self, format: ImageFormat) {
        self.defaults.format = format;
        for index in 0..self.entries.len() {
            let entry = &self.entries[index];
            let pinned = pin_format(format, entry.file.is_vector());
            let next_settings = CompressionSettings {
                format: pinned,
                ..entry.settings
            };
            self.replace_settings(index, next_settings);
        }
    }

    pub fn global_format(&self) -> ImageFormat {
        self.defaults.format
    }

    /// Remove an entry and revoke its handles. A run still in flight for it will be
    /// ignored on completion.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let entry = self.entries.remove(index);
        self.release_entry_handles(&entry);
        self.queue.retain(|job| job.entry != id);
        debug!(%id, "image removed");
        true
    }

    pub fn clear(&mut self) {
        for entry in std::mem::take(&mut self.entries) {
            self.release_entry_handles(&entry);
        }
        self.queue.clear();
    }

    /// Drain the queued runs. At most one job per entry is queued at a time.
    pub fn take_jobs(&mut self) -> Vec<ProcessingJob> {
        std::mem::take(&mut self.queue)
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Apply a finished run. Returns false when the outcome was stale (the entry was
    /// removed or has been re-armed since) and nothing changed.
    pub fn complete(&mut self, outcome: JobOutcome) -> bool {
        let Some(index) = self.index_of(outcome.entry) else {
            debug!(entry = %outcome.entry, "dropping outcome for removed image");
            return false;
        };
        let current = &self.entries[index];
        if current.run != outcome.run || current.status != EntryStatus::Processing {
            debug!(entry = %outcome.entry, "dropping outcome of superseded run");
            return false;
        }

        let mut next = current.clone();
        if let Some(old) = next.result.take() {
            self.handles.release(old.handle);
        }
        match outcome.result {
            Ok(encoded) => {
                let size = encoded.len();
                let dimensions = encoded.dimensions();
                let format = encoded.format;
                let bytes = Arc::new(encoded.bytes);
                let handle = self.handles.insert(Arc::clone(&bytes));
                next.result = Some(ProcessedResult {
                    handle,
                    bytes,
                    size,
                    reduction_percent: reduction_percent(next.original_size, size),
                    elapsed: outcome.elapsed,
                    format,
                    dimensions,
                });
                next.status = EntryStatus::Done;
                next.error = None;
            }
            Err(failed) => {
                next.status = EntryStatus::Error;
                next.error = Some(failed.to_string());
            }
        }
        self.entries[index] = next;
        true
    }

    /// Run every queued job on the shared worker pool and apply the outcomes.
    /// Returns how many outcomes were applied.
    pub fn run_pending(&mut self, pipeline: &Pipeline) -> usize {
        let jobs = self.take_jobs();
        if jobs.is_empty() {
            return 0;
        }
        debug!(jobs = jobs.len(), "running queued jobs");

        let outcomes: Vec<JobOutcome> = match get_pool() {
            Some(pool) => pool.install(|| jobs.par_iter().map(|job| job.run(pipeline)).collect()),
            None => jobs.iter().map(|job| job.run(pipeline)).collect(),
        };
        outcomes
            .into_iter()
            .map(|outcome| self.complete(outcome))
            .filter(|applied| *applied)
            .count()
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn processed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Done)
            .count()
    }

    /// Bytes saved over all finished entries. Negative when outputs grew overall.
    pub fn total_saved_bytes(&self) -> i64 {
        self.entries.iter().filter_map(ImageEntry::saved_bytes).sum()
    }

    pub fn handles(&self) -> &HandleStore {
        &self.handles
    }

    pub fn download(&self, id: EntryId) -> Option<Download> {
        let entry = self.entry(id)?;
        if entry.status != EntryStatus::Done {
            return None;
        }
        let result = entry.result.as_ref()?;
        Some(Download {
            file_name: download_file_name(&entry.file, entry.settings.format),
            handle: result.handle,
            bytes: Arc::clone(&result.bytes),
        })
    }

    /// Every finished output, named `opt-<original name>`, in workspace order.
    pub fn download_all(&self) -> Vec<Download> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Done)
            .filter_map(|e| {
                e.result.as_ref().map(|r| Download {
                    file_name: bulk_file_name(e.name()),
                    handle: r.handle,
                    bytes: Arc::clone(&r.bytes),
                })
            })
            .collect()
    }

    fn index_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Store new settings for the entry at `index`, arming a run if the output changes.
    fn replace_settings(&mut self, index: usize, settings: CompressionSettings) -> bool {
        let current = &self.entries[index];
        let reprocess = requires_reprocess(&current.settings, &settings, current.dimensions);
        let mut next = current.clone();
        next.settings = settings;
        let next = if reprocess { self.arm(next) } else { next };
        self.entries[index] = next;
        reprocess
    }

    /// Start a new run: bump the run id, drop the stale result and queue a job.
    fn arm(&mut self, mut entry: ImageEntry) -> ImageEntry {
        entry.run = entry.run.next();
        entry.status = EntryStatus::Processing;
        entry.error = None;
        if let Some(old) = entry.result.take() {
            self.handles.release(old.handle);
        }
        self.queue.retain(|job| job.entry != entry.id);
        self.queue.push(ProcessingJob {
            entry: entry.id,
            run: entry.run,
            file: Arc::clone(&entry.file),
            settings: entry.settings,
        });
        debug!(id = %entry.id, run = ?entry.run, "run armed");
        entry
    }

    fn release_entry_handles(&mut self, entry: &ImageEntry) {
        self.handles.release(entry.preview);
        if let Some(result) = &entry.result {
            self.handles.release(result.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{CodecRegistry, Encoder};
    use crate::engine::{EncodedImage, PixelBuffer};
    use crate::error::{OptiImageError, ProcessingFailed};
    use std::time::Duration;

    fn png_file(name: &str, width: u32, height: u32) -> SourceFile {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        SourceFile::new(name, "image/png", bytes)
    }

    fn success(job: &ProcessingJob, len: usize) -> JobOutcome {
        JobOutcome {
            entry: job.entry,
            run: job.run,
            elapsed: Duration::from_millis(3),
            result: Ok(EncodedImage {
                bytes: vec![0; len],
                format: ImageFormat::Png,
                width: 8,
                height: 6,
            }),
        }
    }

    fn single(ws: &mut Workspace, pipeline: &Pipeline) -> (EntryId, ProcessingJob) {
        let ids = ws.add_files(pipeline, [png_file("a.png", 8, 6)]);
        let mut jobs = ws.take_jobs();
        assert_eq!(jobs.len(), 1);
        (ids[0], jobs.remove(0))
    }

    #[test]
    fn new_entries_take_defaults_and_start_processing() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::with_defaults(WorkspaceDefaults {
            format: ImageFormat::WebP,
            quality: 0.6,
        });
        let ids = ws.add_files(&pipeline, [png_file("a.png", 8, 6)]);
        let entry = ws.entry(ids[0]).unwrap();
        assert_eq!(entry.status(), EntryStatus::Processing);
        assert_eq!(entry.dimensions(), Dimensions::new(8, 6));
        assert_eq!(entry.settings().format, ImageFormat::WebP);
        assert_eq!(entry.settings().quality, 0.6);
        assert_eq!((entry.settings().resize_width, entry.settings().resize_height), (8, 6));
        assert!(!entry.settings().resize_enabled);
        assert_eq!(ws.pending_jobs(), 1);
    }

    #[test]
    fn unprobeable_file_is_still_added() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let ids = ws.add_files(&pipeline, [SourceFile::new("x.png", "image/png", vec![1, 2, 3])]);
        assert_eq!(ws.entry(ids[0]).unwrap().dimensions(), Dimensions::default());
        assert_eq!(ws.pending_jobs(), 1);
    }

    #[test]
    fn unprobed_entry_ignores_disabled_resize_edits() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let ids = ws.add_files(&pipeline, [SourceFile::new("x.png", "image/png", vec![1, 2, 3])]);
        let job = ws.take_jobs().remove(0);
        ws.complete(JobOutcome {
            entry: job.entry,
            run: job.run,
            elapsed: Duration::ZERO,
            result: Err(ProcessingFailed::new(OptiImageError::decode_failed("bad"))),
        });

        let update = SettingsUpdate {
            resize_width: Some(400),
            ..SettingsUpdate::default()
        };
        assert!(!ws.update_settings(ids[0], update));
        let entry = ws.entry(ids[0]).unwrap();
        assert_eq!(entry.status(), EntryStatus::Error);
        assert_eq!(entry.settings().resize_width, 400);
        assert_eq!(ws.pending_jobs(), 0);
    }

    #[test]
    fn completion_sets_result_and_reduction() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, job) = single(&mut ws, &pipeline);
        let original = ws.entry(id).unwrap().original_size();

        assert!(ws.complete(success(&job, 10)));
        let entry = ws.entry(id).unwrap();
        assert_eq!(entry.status(), EntryStatus::Done);
        let result = entry.result().unwrap();
        assert_eq!(result.size, 10);
        assert_eq!(result.reduction_percent, reduction_percent(original, 10));
        assert_eq!(ws.processed_count(), 1);
        assert_eq!(ws.total_saved_bytes(), original as i64 - 10);
    }

    #[test]
    fn failure_reports_fixed_message() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, job) = single(&mut ws, &pipeline);
        ws.complete(JobOutcome {
            entry: job.entry,
            run: job.run,
            elapsed: Duration::ZERO,
            result: Err(ProcessingFailed::new(OptiImageError::decode_failed("bad"))),
        });
        let entry = ws.entry(id).unwrap();
        assert_eq!(entry.status(), EntryStatus::Error);
        assert_eq!(entry.error(), Some("Processing failed"));
        assert!(entry.result().is_none());
    }

    #[test]
    fn stale_run_is_ignored() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, first) = single(&mut ws, &pipeline);
        assert!(ws.update_settings(id, SettingsUpdate::quality(0.5)));
        let second = ws.take_jobs().remove(0);

        assert!(!ws.complete(success(&first, 10)));
        assert_eq!(ws.entry(id).unwrap().status(), EntryStatus::Processing);
        assert!(ws.complete(success(&second, 12)));
        assert_eq!(ws.entry(id).unwrap().result().unwrap().size, 12);
    }

    #[test]
    fn rearming_replaces_queued_job() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let ids = ws.add_files(&pipeline, [png_file("a.png", 4, 4)]);
        ws.update_settings(ids[0], SettingsUpdate::quality(0.3));
        ws.update_settings(ids[0], SettingsUpdate::quality(0.4));
        let jobs = ws.take_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].settings.quality, 0.4);
    }

    #[test]
    fn reprocess_releases_previous_result_handle() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, job) = single(&mut ws, &pipeline);
        ws.complete(success(&job, 10));
        assert_eq!(ws.handles().live_handles(), 2);

        ws.update_settings(id, SettingsUpdate::format(ImageFormat::Jpeg));
        assert!(ws.entry(id).unwrap().result().is_none());
        assert_eq!(ws.handles().live_handles(), 1);
    }

    #[test]
    fn non_output_changes_keep_done() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, job) = single(&mut ws, &pipeline);
        ws.complete(success(&job, 10));

        assert!(!ws.update_settings(id, SettingsUpdate::resize(8, 6)));
        assert!(!ws.update_settings(
            id,
            SettingsUpdate {
                auto_mode: Some(false),
                ..SettingsUpdate::default()
            }
        ));
        let entry = ws.entry(id).unwrap();
        assert_eq!(entry.status(), EntryStatus::Done);
        assert!(entry.settings().resize_enabled);
        assert!(!entry.settings().auto_mode);
        assert_eq!(ws.pending_jobs(), 0);
    }

    #[test]
    fn aspect_locked_resize_edit() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let ids = ws.add_files(&pipeline, [png_file("a.png", 100, 50)]);
        ws.take_jobs();
        ws.update_settings(ids[0], SettingsUpdate::resize_enabled(true));

        assert!(ws.set_resize_dimension(ids[0], EditedDimension::Width, 40));
        let s = *ws.entry(ids[0]).unwrap().settings();
        assert_eq!((s.resize_width, s.resize_height), (40, 20));

        ws.update_settings(
            ids[0],
            SettingsUpdate {
                maintain_aspect_ratio: Some(false),
                ..SettingsUpdate::default()
            },
        );
        ws.set_resize_dimension(ids[0], EditedDimension::Height, 33);
        let s = *ws.entry(ids[0]).unwrap().settings();
        assert_eq!((s.resize_width, s.resize_height), (40, 33));
    }

    #[test]
    fn remove_and_clear_release_handles() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let (id, job) = single(&mut ws, &pipeline);
        ws.complete(success(&job, 10));
        ws.add_files(&pipeline, [png_file("b.png", 2, 2)]);
        assert_eq!(ws.handles().live_handles(), 3);

        assert!(ws.remove(id));
        assert!(!ws.remove(id));
        assert_eq!(ws.handles().live_handles(), 1);
        assert!(!ws.complete(success(&job, 10)));

        ws.clear();
        assert!(ws.is_empty());
        assert_eq!(ws.handles().live_handles(), 0);
        assert_eq!(ws.pending_jobs(), 0);
    }

    #[test]
    fn global_format_pins_vectors_and_skips_unchanged() {
        let pipeline = Pipeline::new();
        let mut ws = Workspace::new();
        let svg = SourceFile::new(
            "logo.svg",
            "image/svg+xml",
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"/>"#.to_vec(),
        );
        let ids = ws.add_files(&pipeline, [svg, png_file("a.png", 2, 2)]);
        assert_eq!(ws.entry(ids[0]).unwrap().settings().format, ImageFormat::Png);
        ws.take_jobs();

        ws.set_global_format(ImageFormat::Original);
        assert_eq!(ws.pending_jobs(), 0);

        ws.set_global_format(ImageFormat::Avif);
        assert_eq!(ws.global_format(), ImageFormat::Avif);
        assert_eq!(ws.pending_jobs(), 2);
    }

    struct Tiny;

    impl Encoder for Tiny {
        fn name(&self) -> &'static str {
            "tiny"
        }

        fn encode(&self, _pixels: &PixelBuffer, _settings: &CompressionSettings) -> crate::error::Result<Vec<u8>> {
            Ok(vec![7; 4])
        }
    }

    #[test]
    fn run_pending_applies_outcomes() {
        let mut registry = CodecRegistry::standard();
        registry.register_encoder(ImageFormat::Png, Arc::new(Tiny));
        let pipeline = Pipeline::with_registry(registry);
        let mut ws = Workspace::new();
        let ids = ws.add_files(&pipeline, [png_file("a.png", 3, 3), png_file("b.png", 5, 5)]);

        assert_eq!(ws.run_pending(&pipeline), 2);
        for id in &ids {
            let download = ws.download(*id).unwrap();
            assert_eq!(download.bytes.as_slice(), &[7; 4]);
        }
        assert_eq!(ws.download(ids[0]).unwrap().file_name, "a-opt.png");
        let names: Vec<_> = ws.download_all().into_iter().map(|d| d.file_name).collect();
        assert_eq!(names, ["opt-a.png", "opt-b.png"]);
        assert_eq!(ws.run_pending(&pipeline), 0);
    }
}
