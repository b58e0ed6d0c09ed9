use std::fmt;
use std::io::Cursor;

use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use tracing::{error, warn};

use crate::error::Result;

/// Bounding box of preset preview thumbnails.
pub const PREVIEW_SIZE: u32 = 200;

/// Named enhancement settings offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    None,
    Default,
    HighContrast,
    Bright,
    Sharp,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factors {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::None,
        Preset::Default,
        Preset::HighContrast,
        Preset::Bright,
        Preset::Sharp,
        Preset::Balanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::None => "none",
            Preset::Default => "default",
            Preset::HighContrast => "high_contrast",
            Preset::Bright => "bright",
            Preset::Sharp => "sharp",
            Preset::Balanced => "balanced",
        }
    }

    /// Look up a preset by name, falling back to [`Preset::Default`].
    pub fn parse(name: &str) -> Self {
        match Self::ALL.iter().find(|p| p.as_str() == name.trim()) {
            Some(p) => *p,
            None => {
                warn!(preset = name, "unknown preset, using default");
                Preset::Default
            }
        }
    }

    pub fn factors(&self) -> Factors {
        let (brightness, contrast, sharpness) = match self {
            Preset::None => (1.0, 1.0, 1.0),
            Preset::Default => (1.1, 1.1, 1.0),
            Preset::HighContrast => (1.0, 1.5, 1.2),
            Preset::Bright => (1.3, 1.1, 1.0),
            Preset::Sharp => (1.0, 1.2, 1.5),
            Preset::Balanced => (1.15, 1.15, 1.1),
        };
        Factors {
            brightness,
            contrast,
            sharpness,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `preset` and re-encode as PNG. Undecodable input is returned as-is.
pub fn apply(data: &[u8], preset: Preset) -> Vec<u8> {
    match try_apply(data, preset) {
        Ok(out) => out,
        Err(e) => {
            error!(preset = %preset, error = %e, "image processing failed");
            data.to_vec()
        }
    }
}

pub fn try_apply(data: &[u8], preset: Preset) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?.to_rgba8();
    encode_png(&enhance(img, preset.factors()))
}

/// One thumbnail per preset, in [`Preset::ALL`] order. Empty on decode failure.
pub fn previews(data: &[u8]) -> Vec<(Preset, Vec<u8>)> {
    let thumb = match image::load_from_memory(data) {
        Ok(img) => img.thumbnail(PREVIEW_SIZE, PREVIEW_SIZE).to_rgba8(),
        Err(e) => {
            error!(error = %e, "preview creation failed");
            return Vec::new();
        }
    };

    Preset::ALL
        .iter()
        .filter_map(|preset| {
            let out = enhance(thumb.clone(), preset.factors());
            encode_png(&out).ok().map(|bytes| (*preset, bytes))
        })
        .collect()
}

/// Brightness, then contrast, then sharpness; a factor of 1.0 is a no-op.
pub fn enhance(mut img: RgbaImage, factors: Factors) -> RgbaImage {
    if factors.brightness != 1.0 {
        let black = [0.0; 3];
        img = blend_towards(&img, |_, _| black, factors.brightness);
    }
    if factors.contrast != 1.0 {
        let mean = mean_luma(&img);
        let grey = [mean; 3];
        img = blend_towards(&img, |_, _| grey, factors.contrast);
    }
    if factors.sharpness != 1.0 {
        // 3x3 smoothing kernel; the image is pushed away from its blurred copy.
        let smooth: RgbaImage =
            imageops::filter3x3(&img, &[1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0]);
        img = blend_towards(
            &img,
            |x, y| {
                let p = smooth.get_pixel(x, y);
                [p[0] as f32, p[1] as f32, p[2] as f32]
            },
            factors.sharpness,
        );
    }
    img
}

/// `out = base + (pixel - base) * factor` per colour channel; alpha is kept.
fn blend_towards<F>(img: &RgbaImage, base: F, factor: f32) -> RgbaImage
where
    F: Fn(u32, u32) -> [f32; 3],
{
    let mut out = img.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let b = base(x, y);
        for c in 0..3 {
            let v = b[c] + (px[c] as f32 - b[c]) * factor;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn mean_luma(img: &RgbaImage) -> f32 {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img
        .pixels()
        .map(|p| {
            let l = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            l.round() as u64
        })
        .sum();
    (sum / count) as f32
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img.clone()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
