// src/workspace/policy.rs
//
// Reprocessing policy: decides when a settings change needs a new pipeline run.

use crate::format::{CompressionSettings, Dimensions, ImageFormat};

/// Base size for comparing two settings of one entry.
///
/// An unknown natural axis (probe failure reports 0) falls back to the current
/// settings' resize value. Both sides of a comparison share this base.
pub fn reprocess_base(current: &CompressionSettings, natural: Dimensions) -> Dimensions {
    Dimensions::new(
        if natural.width == 0 { current.resize_width } else { natural.width },
        if natural.height == 0 { current.resize_height } else { natural.height },
    )
}

/// Size the entry's output will have under `settings`, starting from `base`.
pub fn derived_output(settings: &CompressionSettings, base: Dimensions) -> Dimensions {
    settings.output_dimensions(base)
}

/// True when moving from `current` to `next` changes what a run would produce:
/// a different format, a different quality or different derived output dimensions.
///
/// `auto_mode`, `maintain_aspect_ratio` and a `resize_enabled` toggle that keeps the
/// same output size never trigger a run on their own.
pub fn requires_reprocess(
    current: &CompressionSettings,
    next: &CompressionSettings,
    natural: Dimensions,
) -> bool {
    let base = reprocess_base(current, natural);
    current.format != next.format
        || current.quality != next.quality
        || derived_output(current, base) != derived_output(next, base)
}

/// Vector sources cannot be written back as ORIGINAL, so they are pinned to PNG.
pub fn pin_format(format: ImageFormat, is_vector: bool) -> ImageFormat {
    if is_vector && format == ImageFormat::Original {
        ImageFormat::Png
    } else {
        format
    }
}

/// Which resize field the user edited while the aspect ratio is locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditedDimension {
    Width,
    Height,
}

/// The other axis for a locked-aspect edit: a width edit yields `round(w / ratio)`,
/// a height edit yields `round(h * ratio)`. `None` when the natural size is unknown.
pub fn aspect_locked_dimension(
    natural: Dimensions,
    edited: EditedDimension,
    value: u32,
) -> Option<u32> {
    match edited {
        EditedDimension::Width => natural.height_for_width(value),
        EditedDimension::Height => natural.width_for_height(value),
    }
}
