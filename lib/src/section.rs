//! Variable-density section images
//!
//! Renders a gather with traces along x and time down y, clipping the
//! amplitudes symmetrically at a percentile of their absolute values.

#[cfg(not(target_arch = "wasm32"))]
use crate::error::FxDeconError;
use crate::gather_io::Gather;
#[cfg(not(target_arch = "wasm32"))]
use crate::Result;
use image::{ImageBuffer, Rgb, RgbImage};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

/// Color map types for section display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMap {
    /// Positive amplitudes dark, negative light
    Grayscale,
    /// Blue through white to red
    Seismic,
}

impl ColorMap {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gray" | "grey" | "grayscale" => Some(ColorMap::Grayscale),
            "seismic" | "bwr" => Some(ColorMap::Seismic),
            _ => None,
        }
    }
}

/// Map a normalized amplitude in `[-1, 1]` to a color
fn value_to_color(value: f64, colormap: ColorMap) -> Rgb<u8> {
    let v = value.clamp(-1.0, 1.0);
    match colormap {
        ColorMap::Grayscale => {
            let gray = ((1.0 - v) * 0.5 * 255.0).round() as u8;
            Rgb([gray, gray, gray])
        }
        ColorMap::Seismic => {
            let fade = ((1.0 - v.abs()) * 255.0).round() as u8;
            if v >= 0.0 {
                Rgb([255, fade, fade])
            } else {
                Rgb([fade, fade, 255])
            }
        }
    }
}

/// Options for section image generation
#[derive(Debug, Clone, Copy)]
pub struct SectionImageOptions {
    /// Width of the output image in pixels
    pub width: u32,
    /// Height of the output image in pixels
    pub height: u32,
    pub colormap: ColorMap,
    /// Percentile of |amplitude| mapped to full color, in (0, 100]
    pub clip_percentile: f64,
}

impl Default for SectionImageOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            colormap: ColorMap::Grayscale,
            clip_percentile: 98.0,
        }
    }
}

/// Amplitude at `percentile` of the sorted absolute values
pub fn clip_value(gather: &Gather, percentile: f64) -> f32 {
    let mut values: Vec<f32> = gather.traces.iter().flatten().map(|v| v.abs()).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let p = percentile.clamp(0.0, 100.0) / 100.0;
    let index = (p * (values.len() - 1) as f64).round() as usize;
    values[index.min(values.len() - 1)]
}

/// Generate a section image
pub fn generate_section_image(gather: &Gather, options: &SectionImageOptions) -> RgbImage {
    let mut img = ImageBuffer::from_pixel(
        options.width,
        options.height,
        value_to_color(0.0, options.colormap),
    );

    let num_traces = gather.num_traces();
    let num_samples = gather.num_samples();
    if num_traces == 0 || num_samples == 0 || options.width == 0 || options.height == 0 {
        return img;
    }

    let clip = clip_value(gather, options.clip_percentile) as f64;
    if clip <= 0.0 {
        return img;
    }

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let trace = (x as usize * num_traces / options.width as usize).min(num_traces - 1);
        let sample = (y as usize * num_samples / options.height as usize).min(num_samples - 1);
        let value = gather.traces[trace][sample] as f64 / clip;
        *pixel = value_to_color(value, options.colormap);
    }

    img
}

/// Save a section to an image file
#[cfg(not(target_arch = "wasm32"))]
pub fn save_section<P: AsRef<Path>>(
    gather: &Gather,
    path: P,
    options: &SectionImageOptions,
) -> Result<()> {
    let img = generate_section_image(gather, options);
    img.save(path)
        .map_err(|e| FxDeconError::Io(format!("Failed to save section image: {}", e)))
}
