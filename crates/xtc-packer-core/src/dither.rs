use crate::config::DitherAlgorithm;
use image::{GrayImage, Luma};

/// 4x4 Bayer matrix.
const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// Floyd-Steinberg, divisor 16.
const FLOYD_STEINBERG: (&[(i32, i32, u16)], u16) =
    (&[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)], 16);

/// Atkinson, divisor 8. Only 6/8 of the error is distributed.
const ATKINSON: (&[(i32, i32, u16)], u16) = (
    &[(1, 0, 1), (2, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1), (0, 2, 1)],
    8,
);

/// Stucki, divisor 42.
const STUCKI: (&[(i32, i32, u16)], u16) = (
    &[
        (1, 0, 8),
        (2, 0, 4),
        (-2, 1, 2),
        (-1, 1, 4),
        (0, 1, 8),
        (1, 1, 4),
        (2, 1, 2),
        (-2, 2, 1),
        (-1, 2, 2),
        (0, 2, 4),
        (1, 2, 2),
        (2, 2, 1),
    ],
    42,
);

/// Zhou-Fang, divisor 103.
const ZHOU_FANG: (&[(i32, i32, u16)], u16) = (
    &[
        (1, 0, 16),
        (2, 0, 9),
        (-2, 1, 5),
        (-1, 1, 11),
        (0, 1, 16),
        (1, 1, 11),
        (2, 1, 5),
        (-2, 2, 3),
        (-1, 2, 5),
        (0, 2, 9),
        (1, 2, 5),
        (2, 2, 3),
    ],
    103,
);

/// Sierra Lite, divisor 4.
const SIERRA_LITE: (&[(i32, i32, u16)], u16) = (&[(1, 0, 2), (-1, 1, 1), (0, 1, 1)], 4);

/// Quantize to 2 levels.
#[inline]
pub fn quantize_1bit(v: f32) -> u8 {
    if v < 128.0 {
        0
    } else {
        255
    }
}

/// Quantize to 4 levels at thresholds 42 / 127 / 212.
#[inline]
pub fn quantize_2bit(v: f32) -> u8 {
    if v < 42.0 {
        0
    } else if v < 127.0 {
        85
    } else if v < 212.0 {
        170
    } else {
        255
    }
}

#[inline]
fn quantize(v: f32, two_bit: bool) -> u8 {
    if two_bit {
        quantize_2bit(v)
    } else {
        quantize_1bit(v)
    }
}

/// Dither a device-resolution grayscale page in place.
pub fn dither_in_place(img: &mut GrayImage, algo: DitherAlgorithm, two_bit: bool) {
    let mut scratch = Vec::new();
    dither_with_scratch(img, algo, two_bit, &mut scratch);
}

/// Dither with a caller-provided error buffer so repeated pages can reuse
/// the allocation. The buffer is cleared and refilled; error state never
/// carries across pages.
pub fn dither_with_scratch(
    img: &mut GrayImage,
    algo: DitherAlgorithm,
    two_bit: bool,
    scratch: &mut Vec<f32>,
) {
    match algo {
        DitherAlgorithm::FloydSteinberg => diffuse(img, FLOYD_STEINBERG, two_bit, scratch),
        DitherAlgorithm::Atkinson => diffuse(img, ATKINSON, two_bit, scratch),
        DitherAlgorithm::Stucki => diffuse(img, STUCKI, two_bit, scratch),
        DitherAlgorithm::ZhouFang => diffuse(img, ZHOU_FANG, two_bit, scratch),
        DitherAlgorithm::SierraLite => diffuse(img, SIERRA_LITE, two_bit, scratch),
        DitherAlgorithm::Ostromoukhov => ostromoukhov(img, two_bit, scratch),
        DitherAlgorithm::Ordered => ordered(img),
        DitherAlgorithm::Stochastic => hilbert_serpentine(img, two_bit),
        DitherAlgorithm::None => threshold(img, two_bit),
    }
}

/// Error diffusion over a float buffer. Integer error truncation at
/// divisors like 42 or 103 produces visible banding, so fractional
/// precision is kept until quantization.
fn diffuse(
    img: &mut GrayImage,
    (kernel, divisor): (&[(i32, i32, u16)], u16),
    two_bit: bool,
    scratch: &mut Vec<f32>,
) {
    let (w, h) = img.dimensions();
    let (wi, hi) = (w as i32, h as i32);
    scratch.clear();
    scratch.extend(img.as_raw().iter().map(|&v| v as f32));
    let div = divisor as f32;

    for y in 0..hi {
        for x in 0..wi {
            let old = scratch[(y * wi + x) as usize];
            let new = quantize(old.clamp(0.0, 255.0), two_bit);
            img.put_pixel(x as u32, y as u32, Luma([new]));
            let err = old - new as f32;
            for &(dx, dy, weight) in kernel {
                let nx = x + dx;
                let ny = y + dy;
                if nx >= 0 && nx < wi && ny < hi {
                    scratch[(ny * wi + nx) as usize] += err * weight as f32 / div;
                }
            }
        }
    }
}

/// Ostromoukhov's variable-coefficient diffusion, simplified to two linear
/// segments between the anchor coefficient sets.
fn ostromoukhov(img: &mut GrayImage, two_bit: bool, scratch: &mut Vec<f32>) {
    let (w, h) = img.dimensions();
    let (wi, hi) = (w as i32, h as i32);
    scratch.clear();
    scratch.extend(img.as_raw().iter().map(|&v| v as f32));

    for y in 0..hi {
        for x in 0..wi {
            let old = scratch[(y * wi + x) as usize];
            let clamped = old.clamp(0.0, 255.0);
            let new = quantize(clamped, two_bit);
            img.put_pixel(x as u32, y as u32, Luma([new]));
            let err = old - new as f32;
            let coeffs = ostromoukhov_coeffs(clamped);
            // (right, down-left, down)
            for (&(dx, dy), &c) in [(1i32, 0i32), (-1, 1), (0, 1)].iter().zip(coeffs.iter()) {
                let nx = x + dx;
                let ny = y + dy;
                if nx >= 0 && nx < wi && ny < hi {
                    scratch[(ny * wi + nx) as usize] += err * c;
                }
            }
        }
    }
}

fn ostromoukhov_coeffs(v: f32) -> [f32; 3] {
    const DARK: [f32; 3] = [0.7, 0.2, 0.1];
    const MID: [f32; 3] = [0.3, 0.4, 0.3];
    if v <= 128.0 {
        lerp3(DARK, MID, v / 128.0)
    } else {
        lerp3(MID, DARK, (v - 128.0) / 127.0)
    }
}

#[inline]
fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Ordered Bayer 4x4. The same comparison serves both bit depths.
fn ordered(img: &mut GrayImage) {
    let (w, h) = img.dimensions();
    for y in 0..h {
        for x in 0..w {
            let threshold = BAYER_4X4[(y % 4) as usize][(x % 4) as usize] * 16;
            let p = img.get_pixel(x, y)[0];
            let new = if p > threshold { 255 } else { 0 };
            img.put_pixel(x, y, Luma([new]));
        }
    }
}

/// Serpentine diffusion along a Hilbert curve covering the smallest
/// power-of-two square that holds the frame. A single carried error
/// follows the curve; off-frame points are skipped.
fn hilbert_serpentine(img: &mut GrayImage, two_bit: bool) {
    let (w, h) = img.dimensions();
    let side = w.max(h).max(1).next_power_of_two();
    let total = (side as u64) * (side as u64);

    let mut carry = 0.0f32;
    for d in 0..total {
        let (x, y) = hilbert_d2xy(side, d);
        if x >= w || y >= h {
            continue;
        }
        let input = img.get_pixel(x, y)[0] as f32 + carry;
        let new = quantize(input.clamp(0.0, 255.0), two_bit);
        img.put_pixel(x, y, Luma([new]));
        carry = input - new as f32;
    }
}

/// Curve distance to (x, y) on a Hilbert curve over an `n` x `n` grid
/// (`n` a power of two).
fn hilbert_d2xy(n: u32, d: u64) -> (u32, u32) {
    let mut x = 0u32;
    let mut y = 0u32;
    let mut t = d;
    let mut s = 1u32;
    while s < n {
        let rx = ((t >> 1) & 1) as u32;
        let ry = ((t ^ (rx as u64)) & 1) as u32;
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - x;
                y = s - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        x += s * rx;
        y += s * ry;
        t >>= 2;
        s <<= 1;
    }
    (x, y)
}

/// Direct quantization, no diffusion.
fn threshold(img: &mut GrayImage, two_bit: bool) {
    for px in img.pixels_mut() {
        px.0[0] = quantize(px.0[0] as f32, two_bit);
    }
}
