use crate::config::Orientation;
use serde::{Deserialize, Serialize};

/// Axis-aligned crop rectangle (pixels). `x,y` is top-left; `w,h` are sizes
/// and never go below 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

/// Vertical segment of a source page: `y` offset and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub y: u32,
    pub h: u32,
}

/// Symmetric crop rectangle from margin percentages.
///
/// Margins are clamped to [0, 20] percent; manhwa strips never crop
/// vertically (content continues across frame boundaries). The margin
/// offset rounds to the nearest pixel and is capped at `(dim - 1) / 2`,
/// so the result keeps at least one pixel per axis.
pub fn axis_crop_rect(
    src_w: u32,
    src_h: u32,
    h_margin_percent: u8,
    v_margin_percent: u8,
    manhwa: bool,
) -> CropRect {
    let h_margin = h_margin_percent.min(20) as u32;
    let v_margin = if manhwa {
        0
    } else {
        v_margin_percent.min(20) as u32
    };

    let crop_x = ((src_w * h_margin + 50) / 100).min(src_w.saturating_sub(1) / 2);
    let crop_y = ((src_h * v_margin + 50) / 100).min(src_h.saturating_sub(1) / 2);

    CropRect {
        x: crop_x,
        y: crop_y,
        w: (src_w - 2 * crop_x).max(1),
        h: (src_h - 2 * crop_y).max(1),
    }
}

/// Rotation applied before fitting a page to the panel, in degrees.
pub fn orientation_angle(orientation: Orientation) -> i32 {
    match orientation {
        Orientation::Landscape => 90,
        Orientation::Portrait => 0,
    }
}

/// True when a landscape page does not fit one rotated screenful (with
/// the page width laid along the device height, `floor(dev_w / (dev_h /
/// w))` source rows span the device width) and the split modes apply.
pub fn needs_landscape_split(w: u32, h: u32, dev_w: u32, dev_h: u32) -> bool {
    let scale = dev_h as f64 / w as f64;
    ((dev_w as f64 / scale).floor() as u32) < h
}

/// Overlapping segment layout for a landscape page taller than one rotated
/// screenful.
///
/// Starts at 3 segments and adds more (up to 10) while the step would keep
/// more than 95% of a segment, so successive screens always advance by a
/// meaningful amount. Segments start at y = 0, step by `shift`, and cover
/// the full height with monotonically increasing offsets.
pub fn overlap_segments(w: u32, h: u32, dev_w: u32, dev_h: u32) -> Vec<Segment> {
    let scale = dev_h as f64 / w as f64;
    let segment_h = ((dev_w as f64 / scale).floor() as u32).max(1);

    if segment_h >= h {
        return vec![Segment { y: 0, h }];
    }

    let mut n: u32 = 3;
    let mut shift = segment_shift(segment_h, h, n);
    while shift as f64 / segment_h as f64 > 0.95 && n < 10 {
        n += 1;
        shift = segment_shift(segment_h, h, n);
    }

    let mut segments = Vec::with_capacity(n as usize);
    for i in 0..n {
        let y = i * shift;
        let seg_h = if i + 1 == n {
            h - shift * (n - 1)
        } else {
            segment_h
        };
        segments.push(Segment {
            y,
            h: seg_h.min(h - y).max(1),
        });
    }
    segments
}

fn segment_shift(segment_h: u32, h: u32, n: u32) -> u32 {
    let overshoot = (segment_h as f64 * n as f64 - h as f64) / (n as f64 - 1.0);
    (segment_h as f64 - overshoot).floor().max(1.0) as u32
}
