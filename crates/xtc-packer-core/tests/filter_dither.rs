use image::{GrayImage, Luma, Rgba, RgbaImage};
use xtc_packer_core::config::DitherAlgorithm;
use xtc_packer_core::dither::{dither_in_place, quantize_1bit, quantize_2bit};
use xtc_packer_core::filter::grayscale_filter;

fn solid_rgba(w: u32, h: u32, v: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
}

#[test]
fn grayscale_uses_luminosity_weights() {
    let mut img = RgbaImage::new(1, 1);
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    let gray = grayscale_filter(&img, 0, 1.0, false);
    // round(0.299 * 255)
    assert_eq!(gray.get_pixel(0, 0)[0], 76);
}

#[test]
fn invert_flips_channels_before_grayscale() {
    let gray = grayscale_filter(&solid_rgba(2, 2, 10), 0, 1.0, true);
    assert_eq!(gray.get_pixel(0, 0)[0], 245);
}

#[test]
fn gamma_one_is_identity() {
    let gray = grayscale_filter(&solid_rgba(2, 2, 123), 0, 1.0, false);
    assert_eq!(gray.get_pixel(0, 0)[0], 123);
}

#[test]
fn gamma_darkens_midtones() {
    let gray = grayscale_filter(&solid_rgba(1, 1, 128), 0, 2.0, false);
    // round((128/255)^2 * 255) = 64
    assert_eq!(gray.get_pixel(0, 0)[0], 64);
    let bright = grayscale_filter(&solid_rgba(1, 1, 128), 0, 0.5, false);
    assert_eq!(bright.get_pixel(0, 0)[0], 181);
}

#[test]
fn gamma_is_clamped_to_documented_range() {
    let a = grayscale_filter(&solid_rgba(1, 1, 128), 0, 100.0, false);
    let b = grayscale_filter(&solid_rgba(1, 1, 128), 0, 3.0, false);
    assert_eq!(a.get_pixel(0, 0)[0], b.get_pixel(0, 0)[0]);
}

/// Contrast stretch over a histogram concentrated in [50, 200] reaches
/// full range (within rounding).
#[test]
fn contrast_stretch_reaches_full_range() {
    let mut img = RgbaImage::new(100, 100);
    for (i, px) in img.pixels_mut().enumerate() {
        let v = 50 + (i % 151) as u8;
        *px = Rgba([v, v, v, 255]);
    }
    let gray = grayscale_filter(&img, 8, 1.0, false);
    let min = gray.pixels().map(|p| p[0]).min().unwrap();
    let max = gray.pixels().map(|p| p[0]).max().unwrap();
    assert!(min <= 1, "minimum {min} not stretched to black");
    assert!(max >= 254, "maximum {max} not stretched to white");
}

#[test]
fn contrast_zero_leaves_levels_untouched() {
    let gray = grayscale_filter(&solid_rgba(4, 4, 77), 0, 1.0, false);
    assert!(gray.pixels().all(|p| p[0] == 77));
}

#[test]
fn quantizer_thresholds() {
    assert_eq!(quantize_1bit(127.9), 0);
    assert_eq!(quantize_1bit(128.0), 255);
    assert_eq!(quantize_2bit(41.9), 0);
    assert_eq!(quantize_2bit(42.0), 85);
    assert_eq!(quantize_2bit(126.9), 85);
    assert_eq!(quantize_2bit(127.0), 170);
    assert_eq!(quantize_2bit(211.9), 170);
    assert_eq!(quantize_2bit(212.0), 255);
}

const ALL_ALGORITHMS: [DitherAlgorithm; 9] = [
    DitherAlgorithm::FloydSteinberg,
    DitherAlgorithm::Atkinson,
    DitherAlgorithm::Stucki,
    DitherAlgorithm::ZhouFang,
    DitherAlgorithm::Ostromoukhov,
    DitherAlgorithm::SierraLite,
    DitherAlgorithm::Ordered,
    DitherAlgorithm::Stochastic,
    DitherAlgorithm::None,
];

/// Every algorithm leaves only quantized levels behind.
#[test]
fn dither_output_is_quantized() {
    for algo in ALL_ALGORITHMS {
        let mut img = GrayImage::new(33, 17);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Luma([(i * 7 % 256) as u8]);
        }
        dither_in_place(&mut img, algo, false);
        assert!(
            img.pixels().all(|p| p[0] == 0 || p[0] == 255),
            "{algo:?} left non-binary levels"
        );
    }
}

#[test]
fn two_bit_dither_uses_four_levels() {
    for algo in [
        DitherAlgorithm::Stucki,
        DitherAlgorithm::Stochastic,
        DitherAlgorithm::None,
    ] {
        let mut img = GrayImage::new(16, 16);
        for (i, px) in img.pixels_mut().enumerate() {
            *px = Luma([(i * 13 % 256) as u8]);
        }
        dither_in_place(&mut img, algo, true);
        assert!(
            img.pixels()
                .all(|p| matches!(p[0], 0 | 85 | 170 | 255)),
            "{algo:?} left off-level values"
        );
    }
}

/// A 1x1 image has nowhere to diffuse; the quantizer alone decides.
#[test]
fn dither_single_pixel() {
    for algo in ALL_ALGORITHMS {
        let mut img = GrayImage::from_pixel(1, 1, Luma([200]));
        dither_in_place(&mut img, algo, false);
        // 200 quantizes white everywhere (Bayer threshold at (0,0) is 0)
        assert_eq!(img.get_pixel(0, 0)[0], 255, "{algo:?}");
    }
}

/// Ordered dithering of a uniform midtone follows the Bayer matrix: the
/// eight cells with thresholds below 128 go white.
#[test]
fn ordered_bayer_pattern_on_midtone() {
    let mut img = GrayImage::from_pixel(4, 4, Luma([128]));
    dither_in_place(&mut img, DitherAlgorithm::Ordered, false);
    let white = img.pixels().filter(|p| p[0] == 255).count();
    assert_eq!(white, 8);
    // threshold 0 at (0,0) -> white; threshold 192 at (0,1) -> black
    assert_eq!(img.get_pixel(0, 0)[0], 255);
    assert_eq!(img.get_pixel(0, 1)[0], 0);
}

/// Error diffusion must keep fractional precision: a uniform 25% gray
/// field dithers to roughly 25% white coverage instead of collapsing.
#[test]
fn diffusion_preserves_mean_coverage() {
    for algo in [
        DitherAlgorithm::FloydSteinberg,
        DitherAlgorithm::Stucki,
        DitherAlgorithm::ZhouFang,
        DitherAlgorithm::SierraLite,
    ] {
        let mut img = GrayImage::from_pixel(64, 64, Luma([64]));
        dither_in_place(&mut img, algo, false);
        let white = img.pixels().filter(|p| p[0] == 255).count() as f64;
        let coverage = white / (64.0 * 64.0);
        assert!(
            (coverage - 64.0 / 255.0).abs() < 0.05,
            "{algo:?} coverage {coverage}"
        );
    }
}

#[test]
fn dithering_is_deterministic() {
    let mut a = GrayImage::new(40, 40);
    for (i, px) in a.pixels_mut().enumerate() {
        *px = Luma([(i * 31 % 256) as u8]);
    }
    let mut b = a.clone();
    dither_in_place(&mut a, DitherAlgorithm::Stochastic, false);
    dither_in_place(&mut b, DitherAlgorithm::Stochastic, false);
    assert_eq!(a.as_raw(), b.as_raw());
}
