// src/color_analysis.rs
//
// HSV range segmentation for painted obstacles.
//
// Ranges are in OpenCV 8-bit HSV units: H 0-179 (degrees / 2), S and V 0-255.
// Saturation/value floors keep pale reflections and shadowed pavement out
// of the masks.

use crate::preprocessing::{bitwise_or, count_foreground, open, rect_kernel};
use crate::types::ColorRange;
use anyhow::{bail, Result};
use opencv::{
    core::{self, Mat, Scalar},
    prelude::*,
};

fn bound(values: [u8; 3]) -> Scalar {
    Scalar::new(values[0] as f64, values[1] as f64, values[2] as f64, 0.0)
}

/// Pixels of `hsv` inside `range`, as a 0/255 mask.
pub fn range_mask(hsv: &Mat, range: &ColorRange) -> Result<Mat> {
    let mut mask = Mat::default();
    core::in_range(hsv, &bound(range.lower), &bound(range.upper), &mut mask)?;
    Ok(mask)
}

/// Union of every configured color's mask.
pub fn combined_mask(hsv: &Mat, ranges: &[ColorRange]) -> Result<Mat> {
    let mut iter = ranges.iter();
    let Some(first) = iter.next() else {
        bail!("no color ranges configured");
    };

    let mut combined = range_mask(hsv, first)?;
    for range in iter {
        let mask = range_mask(hsv, range)?;
        combined = bitwise_or(&combined, &mask)?;
    }
    Ok(combined)
}

/// Foreground pixel count per color after an opening, in configuration
/// order. No closing here: gaps between blobs stay uncounted.
pub fn color_pixel_counts(
    hsv: &Mat,
    ranges: &[ColorRange],
    denoise_kernel: i32,
) -> Result<Vec<(String, u32)>> {
    let kernel = rect_kernel(denoise_kernel, denoise_kernel)?;
    ranges
        .iter()
        .map(|range| {
            let mask = open(&range_mask(hsv, range)?, &kernel)?;
            Ok((range.name.clone(), count_foreground(&mask)?))
        })
        .collect()
}

/// Color with the most pixels, provided it beats `floor`. Earlier entries
/// win ties.
pub fn dominant_color(counts: &[(String, u32)], floor: f64) -> Option<(&str, u32)> {
    let mut best: Option<(&str, u32)> = None;
    let mut best_count = floor;
    for (name, count) in counts {
        if *count as f64 > best_count {
            best_count = *count as f64;
            best = Some((name.as_str(), *count));
        }
    }
    best
}
