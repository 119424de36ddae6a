use crate::geometry::CropRect;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// Rotate by 0, 90, 180 or -90 degrees. Dimensions swap for the quarter
/// turns; pixels are repositioned exactly.
pub fn rotate(src: &GrayImage, degrees: i32) -> GrayImage {
    match degrees {
        90 => imageops::rotate90(src),
        180 => imageops::rotate180(src),
        -90 | 270 => imageops::rotate270(src),
        _ => src.clone(),
    }
}

/// Exact sub-raster copy.
pub fn extract_region(src: &GrayImage, rect: &CropRect) -> GrayImage {
    imageops::crop_imm(src, rect.x, rect.y, rect.w, rect.h).to_image()
}

/// Scale to exact dimensions. The box filter only pays off on 1-bit output
/// (sharper text than bilinear) and only when both axes shrink; bilinear
/// covers the rest.
pub fn scale_exact(src: &GrayImage, dst_w: u32, dst_h: u32, sharp: bool) -> GrayImage {
    let (sw, sh) = src.dimensions();
    if sw == dst_w && sh == dst_h {
        return src.clone();
    }
    if sharp && dst_w < sw && dst_h < sh {
        box_downsample(src, dst_w, dst_h)
    } else {
        imageops::resize(src, dst_w, dst_h, FilterType::Triangle)
    }
}

/// Fit inside the panel preserving aspect ratio, centred, remainder filled
/// with `pad`.
pub fn resize_letterbox(
    src: &GrayImage,
    dev_w: u32,
    dev_h: u32,
    pad: u8,
    sharp: bool,
) -> GrayImage {
    let (sw, sh) = src.dimensions();
    let ratio = (dev_w as f64 / sw as f64).min(dev_h as f64 / sh as f64);
    let nw = ((sw as f64 * ratio).round() as u32).clamp(1, dev_w);
    let nh = ((sh as f64 * ratio).round() as u32).clamp(1, dev_h);
    let scaled = scale_exact(src, nw, nh, sharp);

    let mut canvas = GrayImage::from_pixel(dev_w, dev_h, Luma([pad]));
    let x = (dev_w - nw) / 2;
    let y = (dev_h - nh) / 2;
    imageops::replace(&mut canvas, &scaled, x as i64, y as i64);
    canvas
}

/// Stretch to exact panel dimensions.
pub fn resize_fill(src: &GrayImage, dev_w: u32, dev_h: u32, sharp: bool) -> GrayImage {
    scale_exact(src, dev_w, dev_h, sharp)
}

/// Fill the panel preserving aspect ratio, centred, overflow cropped.
pub fn resize_cover(src: &GrayImage, dev_w: u32, dev_h: u32, sharp: bool) -> GrayImage {
    let (sw, sh) = src.dimensions();
    let ratio = (dev_w as f64 / sw as f64).max(dev_h as f64 / sh as f64);
    let nw = ((sw as f64 * ratio).round() as u32).max(dev_w);
    let nh = ((sh as f64 * ratio).round() as u32).max(dev_h);
    let scaled = scale_exact(src, nw, nh, sharp);

    let x = (nw - dev_w) / 2;
    let y = (nh - dev_h) / 2;
    imageops::crop_imm(&scaled, x, y, dev_w, dev_h).to_image()
}

/// No scaling: centre-place the source into the panel rectangle, padding
/// when smaller and cropping when larger.
pub fn resize_crop(src: &GrayImage, dev_w: u32, dev_h: u32, pad: u8) -> GrayImage {
    let (sw, sh) = src.dimensions();
    let mut canvas = GrayImage::from_pixel(dev_w, dev_h, Luma([pad]));

    let copy_w = sw.min(dev_w);
    let copy_h = sh.min(dev_h);
    let sx = (sw - copy_w) / 2;
    let sy = (sh - copy_h) / 2;
    let dx = (dev_w - copy_w) / 2;
    let dy = (dev_h - copy_h) / 2;
    let view = imageops::crop_imm(src, sx, sy, copy_w, copy_h).to_image();
    imageops::replace(&mut canvas, &view, dx as i64, dy as i64);
    canvas
}

/// Area-averaging downscale with fractional edge coverage.
pub fn box_downsample(src: &GrayImage, dst_w: u32, dst_h: u32) -> GrayImage {
    let (sw, sh) = src.dimensions();
    let x_ratio = sw as f64 / dst_w as f64;
    let y_ratio = sh as f64 / dst_h as f64;
    let data = src.as_raw();

    let mut out = Vec::with_capacity((dst_w * dst_h) as usize);
    for dy in 0..dst_h {
        let y0 = dy as f64 * y_ratio;
        let y1 = (y0 + y_ratio).min(sh as f64);
        for dx in 0..dst_w {
            let x0 = dx as f64 * x_ratio;
            let x1 = (x0 + x_ratio).min(sw as f64);

            let mut sum = 0.0f64;
            let mut area = 0.0f64;
            let mut sy = y0.floor() as usize;
            while (sy as f64) < y1 {
                let cover_y = (sy as f64 + 1.0).min(y1) - (sy as f64).max(y0);
                let row = sy * sw as usize;
                let mut sx = x0.floor() as usize;
                while (sx as f64) < x1 {
                    let cover_x = (sx as f64 + 1.0).min(x1) - (sx as f64).max(x0);
                    let weight = cover_x * cover_y;
                    sum += data[row + sx] as f64 * weight;
                    area += weight;
                    sx += 1;
                }
                sy += 1;
            }
            out.push((sum / area).round().clamp(0.0, 255.0) as u8);
        }
    }
    GrayImage::from_raw(dst_w, dst_h, out).expect("buffer sized to dimensions")
}
