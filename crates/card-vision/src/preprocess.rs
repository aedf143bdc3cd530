//! Per-frame pixel transforms applied before text recognition.
//!
//! Recognition is sensitive to lighting, so the capture loop rotates through
//! the variants in [`Enhancement::CYCLE`]: at least one sample out of every
//! three tends to be legible without detecting lighting conditions.

use card_capture::ScreenRegion;
use image::{imageops::FilterType, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Which transform to apply to a cropped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enhancement {
    /// Per-channel min-max stretch
    Normalize,
    /// Stretch, then a linear contrast boost around mid-grey
    Contrast,
    /// Stretch, then force bright pixels to white to isolate dark glyphs
    Threshold,
}

impl Enhancement {
    pub const CYCLE: [Enhancement; 3] = [
        Enhancement::Normalize,
        Enhancement::Contrast,
        Enhancement::Threshold,
    ];

    /// Variant used on the `n`th loop iteration.
    pub fn for_cycle(n: u64) -> Self {
        Self::CYCLE[(n % Self::CYCLE.len() as u64) as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Contrast multiplier; 2.0 doubles the distance from mid-grey
    pub contrast: f32,
    /// Luminance above which pixels become white in the threshold variant
    pub threshold: u8,
    /// Width the cropped region is rescaled to before recognition
    pub target_width: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            contrast: 2.0,
            threshold: 160,
            target_width: 512,
        }
    }
}

/// Crop `roi` out of `frame` and rescale it to `target_width`, keeping the
/// aspect ratio. Returns `None` when the crop is empty (no frame yet, or a
/// degenerate region).
pub fn prepare_region(frame: &RgbaImage, roi: &ScreenRegion, target_width: u32) -> Option<RgbaImage> {
    let crop = card_capture::crop_region(frame, roi);
    let (w, h) = crop.dimensions();
    if w == 0 || h == 0 || target_width == 0 {
        return None;
    }

    let target_height = ((target_width as u64 * h as u64) / w as u64).max(1) as u32;
    Some(image::imageops::resize(
        &crop,
        target_width,
        target_height,
        FilterType::Triangle,
    ))
}

/// Apply one enhancement variant. Pure: the input is not modified.
pub fn preprocess(region: &RgbaImage, variant: Enhancement, settings: &PreprocessSettings) -> RgbaImage {
    let mut out = region.clone();
    normalize(&mut out);
    match variant {
        Enhancement::Normalize => {}
        Enhancement::Contrast => boost_contrast(&mut out, settings.contrast),
        Enhancement::Threshold => whiten_above(&mut out, settings.threshold),
    }
    out
}

/// Stretch each colour channel so its observed min maps to 0 and max to 255.
fn normalize(img: &mut RgbaImage) {
    let mut min = [u8::MAX; 3];
    let mut max = [u8::MIN; 3];
    for px in img.pixels() {
        for c in 0..3 {
            min[c] = min[c].min(px[c]);
            max[c] = max[c].max(px[c]);
        }
    }

    for px in img.pixels_mut() {
        for c in 0..3 {
            let range = max[c].saturating_sub(min[c]);
            if range == 0 {
                continue;
            }
            let stretched = (px[c] - min[c]) as u32 * 255 / range as u32;
            px[c] = stretched as u8;
        }
        // Alpha unchanged
    }
}

fn boost_contrast(img: &mut RgbaImage, factor: f32) {
    let intercept = 128.0 * (1.0 - factor);
    for px in img.pixels_mut() {
        for c in 0..3 {
            let adjusted = (px[c] as f32 * factor + intercept).clamp(0.0, 255.0);
            px[c] = adjusted as u8;
        }
    }
}

fn whiten_above(img: &mut RgbaImage, threshold: u8) {
    for px in img.pixels_mut() {
        if luminance(px) > threshold as f32 {
            *px = Rgba([255, 255, 255, px[3]]);
        }
    }
}

fn luminance(px: &Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> RgbaImage {
        // Washed-out image: values only span 100..=150
        RgbaImage::from_fn(51, 1, |x, _| {
            let v = 100 + x as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_cycle_rotates() {
        let variants: Vec<Enhancement> = (0..4).map(Enhancement::for_cycle).collect();
        assert_eq!(
            variants,
            vec![
                Enhancement::Normalize,
                Enhancement::Contrast,
                Enhancement::Threshold,
                Enhancement::Normalize
            ]
        );
    }

    #[test]
    fn test_normalize_stretches_range() {
        let out = preprocess(&gradient(), Enhancement::Normalize, &PreprocessSettings::default());
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(50, 0)[0], 255);
        assert_eq!(out.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn test_normalize_leaves_flat_channel() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([40, 40, 40, 255]));
        let out = preprocess(&img, Enhancement::Normalize, &PreprocessSettings::default());
        assert_eq!(out, img);
    }

    #[test]
    fn test_contrast_pushes_away_from_mid_grey() {
        let out = preprocess(&gradient(), Enhancement::Contrast, &PreprocessSettings::default());
        // 0 -> clamp(0*2 - 128) = 0, 255 -> clamp(255*2 - 128) = 255
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(50, 0)[0], 255);
        // Middle of the stretched range stays near the middle
        let mid = out.get_pixel(25, 0)[0];
        assert!((120..=136).contains(&mid), "got {}", mid);
    }

    #[test]
    fn test_threshold_whitens_bright_pixels_only() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([10, 10, 10, 255]) // glyph
            } else {
                Rgba([200, 200, 200, 255]) // card background
            }
        });
        let out = preprocess(&img, Enhancement::Threshold, &PreprocessSettings::default());
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*out.get_pixel(1, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let settings = PreprocessSettings::default();
        let a = preprocess(&gradient(), Enhancement::Threshold, &settings);
        let b = preprocess(&gradient(), Enhancement::Threshold, &settings);
        assert_eq!(a, b);
    }

    #[test]
    fn test_prepare_region_scales_to_target_width() {
        let frame = RgbaImage::new(512, 512);
        let band = card_capture::regions::text_band();
        let region = prepare_region(&frame, &band, 512).unwrap();
        assert_eq!(region.width(), 512);
        // 409x71 crop scaled up to 512 wide
        assert_eq!(region.height(), 512 * 71 / 409);
    }

    #[test]
    fn test_prepare_region_empty_frame() {
        let frame = RgbaImage::new(0, 0);
        assert!(prepare_region(&frame, &card_capture::regions::full_frame(), 512).is_none());
    }
}
