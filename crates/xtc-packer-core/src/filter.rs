use image::{GrayImage, RgbaImage};

const GAMMA_EPSILON: f32 = 0.01;

/// Fused grayscale / contrast-stretch / gamma / invert pass.
///
/// Reads the RGBA buffer once and writes luminosity once. The histogram
/// for the contrast stretch is taken over the original luminosity; the
/// stretch itself is applied per channel before luminosity is recomputed,
/// and the gamma LUT is applied last. All clamps saturate to [0, 255].
pub fn grayscale_filter(src: &RgbaImage, contrast: u8, gamma: f32, invert: bool) -> GrayImage {
    let (w, h) = src.dimensions();
    let data = src.as_raw();
    let total = (w as u64) * (h as u64);

    // Contrast stretch bounds from the luminosity histogram. The cut
    // fractions are 3*contrast% from the bottom and (3 + 9*contrast)%
    // from the top.
    let stretch = if contrast > 0 && total > 0 {
        let mut hist = [0u64; 256];
        for px in data.chunks_exact(4) {
            hist[luminosity(px[0], px[1], px[2]) as usize] += 1;
        }

        let black_target = total * (3 * contrast as u64) / 100;
        let white_target = total * (3 + 9 * contrast as u64) / 100;

        let mut cumulative = 0u64;
        let mut black_point = 0u32;
        for (i, &count) in hist.iter().enumerate() {
            cumulative += count;
            if cumulative >= black_target {
                black_point = i as u32;
                break;
            }
        }
        let mut reverse = 0u64;
        let mut white_point = 255u32;
        for (i, &count) in hist.iter().enumerate().rev() {
            reverse += count;
            if reverse >= white_target {
                white_point = i as u32;
                break;
            }
        }

        let range = white_point.saturating_sub(black_point);
        if range > 0 {
            Some((black_point as i32, range as i32))
        } else {
            None
        }
    } else {
        None
    };

    let gamma = gamma.clamp(0.1, 3.0);
    let gamma_lut = if (gamma - 1.0).abs() > GAMMA_EPSILON {
        let mut lut = [0u8; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            *v = ((i as f32 / 255.0).powf(gamma) * 255.0)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        Some(lut)
    } else {
        None
    };

    let mut out = Vec::with_capacity((w as usize) * (h as usize));
    for px in data.chunks_exact(4) {
        let mut r = px[0];
        let mut g = px[1];
        let mut b = px[2];
        if invert {
            r = 255 - r;
            g = 255 - g;
            b = 255 - b;
        }
        if let Some((black, range)) = stretch {
            r = stretch_channel(r, black, range);
            g = stretch_channel(g, black, range);
            b = stretch_channel(b, black, range);
        }
        let mut gray = luminosity(r, g, b);
        if let Some(lut) = &gamma_lut {
            gray = lut[gray as usize];
        }
        out.push(gray);
    }

    GrayImage::from_raw(w, h, out).expect("buffer sized to dimensions")
}

#[inline]
fn luminosity(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

#[inline]
fn stretch_channel(v: u8, black: i32, range: i32) -> u8 {
    ((v as i32 - black) * 255 / range).clamp(0, 255) as u8
}
