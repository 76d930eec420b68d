//! Pure calculation functions for image dimensions and placement.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{anchor, reduce, repeat};

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h)
    }
}

/// Calculate dimensions that fit inside an optional bounding box.
///
/// Aspect ratio is preserved and the image is never enlarged: a source that
/// already fits is returned unchanged. A missing bound leaves that axis free.
pub fn calculate_inset_dimensions(
    source: (u32, u32),
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    let scale_w = max_width.map_or(1.0, |w| w as f64 / src_w as f64);
    let scale_h = max_height.map_or(1.0, |h| h as f64 / src_h as f64);
    let scale = scale_w.min(scale_h);

    if scale >= 1.0 {
        return source;
    }

    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Size the overlay is drawn at, given the reduce flags.
///
/// The overlay shrinks (keeping its aspect ratio) only along the axes named by
/// `reduce_flags`, and only when it exceeds the base image on that axis.
pub fn calculate_overlay_size(
    base: (u32, u32),
    overlay: (u32, u32),
    reduce_flags: u32,
) -> (u32, u32) {
    let (base_w, base_h) = base;
    let (ov_w, ov_h) = overlay;

    let mut scale = 1.0_f64;
    if reduce_flags & reduce::X != 0 && ov_w > base_w {
        scale = scale.min(base_w as f64 / ov_w as f64);
    }
    if reduce_flags & reduce::Y != 0 && ov_h > base_h {
        scale = scale.min(base_h as f64 / ov_h as f64);
    }

    if scale >= 1.0 {
        return overlay;
    }

    let w = ((ov_w as f64 * scale).floor() as u32).max(1);
    let h = ((ov_h as f64 * scale).floor() as u32).max(1);
    (w, h)
}

/// Top-left corner of a single overlay placed according to `anchor_flags`.
///
/// `LEFT` takes precedence over `RIGHT` and `TOP` over `BOTTOM`; an axis with
/// no flag (or `CENTER`/`MIDDLE`) is centered. Coordinates may be negative
/// when the overlay is larger than the base.
pub fn calculate_anchor_position(base: (u32, u32), overlay: (u32, u32), anchor_flags: u32) -> (i64, i64) {
    let (base_w, base_h) = (base.0 as i64, base.1 as i64);
    let (ov_w, ov_h) = (overlay.0 as i64, overlay.1 as i64);

    let x = if anchor_flags & anchor::LEFT != 0 {
        0
    } else if anchor_flags & anchor::RIGHT != 0 {
        base_w - ov_w
    } else {
        (base_w - ov_w) / 2
    };

    let y = if anchor_flags & anchor::TOP != 0 {
        0
    } else if anchor_flags & anchor::BOTTOM != 0 {
        base_h - ov_h
    } else {
        (base_h - ov_h) / 2
    };

    (x, y)
}

/// Upper bound on overlay draws per image when tiling.
pub const MAX_OVERLAY_TILES: u64 = 4096;

/// Every position the overlay is drawn at.
///
/// Without repeat flags this is the single anchored position. A repeated axis
/// is tiled in both directions from the anchored position until the base is
/// covered, so the anchor still decides where the tile grid is aligned.
pub fn calculate_overlay_positions(
    base: (u32, u32),
    overlay: (u32, u32),
    anchor_flags: u32,
    repeat_flags: u32,
) -> Vec<(i64, i64)> {
    let (x, y) = calculate_anchor_position(base, overlay, anchor_flags);

    let xs = if repeat_flags & repeat::X != 0 {
        tile_axis(x, overlay.0 as i64, base.0 as i64)
    } else {
        vec![x]
    };
    let ys = if repeat_flags & repeat::Y != 0 {
        tile_axis(y, overlay.1 as i64, base.1 as i64)
    } else {
        vec![y]
    };

    ys.iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect()
}

/// Number of positions [`calculate_overlay_positions`] returns, without
/// building them.
pub fn count_overlay_positions(
    base: (u32, u32),
    overlay: (u32, u32),
    anchor_flags: u32,
    repeat_flags: u32,
) -> u64 {
    let (x, y) = calculate_anchor_position(base, overlay, anchor_flags);
    let columns = if repeat_flags & repeat::X != 0 {
        tile_span(x, overlay.0 as i64, base.0 as i64).1
    } else {
        1
    };
    let rows = if repeat_flags & repeat::Y != 0 {
        tile_span(y, overlay.1 as i64, base.1 as i64).1
    } else {
        1
    };
    columns * rows
}

/// First tile start and tile count covering `0..extent`, aligned on `origin`.
fn tile_span(origin: i64, step: i64, extent: i64) -> (i64, u64) {
    if step <= 0 {
        return (origin, 1);
    }
    let offset = origin.rem_euclid(step);
    let start = if offset > 0 { offset - step } else { 0 };
    let count = if extent > start {
        (extent - start + step - 1) / step
    } else {
        0
    };
    (start, count as u64)
}

fn tile_axis(origin: i64, step: i64, extent: i64) -> Vec<i64> {
    let (start, count) = tile_span(origin, step, extent);
    (0..count as i64).map(|i| start + i * step).collect()
}
