// src/preprocessing.rs

use anyhow::{bail, Result};
use opencv::{
    core::{self, Mat, Rect, Size},
    imgproc,
    prelude::*,
};

/// Reject anything that is not a non-empty 8-bit BGR image.
pub fn ensure_bgr(frame: &Mat) -> Result<()> {
    if frame.empty() {
        bail!("empty frame");
    }
    if frame.typ() != core::CV_8UC3 {
        bail!("expected 8-bit 3-channel frame, got type {}", frame.typ());
    }
    Ok(())
}

/// Copy rows `[top, bottom)` across the full width of `src`.
pub fn crop_rows(src: &Mat, top: i32, bottom: i32) -> Result<Mat> {
    if top < 0 || bottom <= top || bottom > src.rows() {
        bail!(
            "ROI rows [{}, {}) outside frame of height {}",
            top,
            bottom,
            src.rows()
        );
    }
    let roi = Mat::roi(src, Rect::new(0, top, src.cols(), bottom - top))?;
    Ok(roi.try_clone()?)
}

/// Bottom strip of `height` rows.
pub fn crop_bottom(src: &Mat, height: i32) -> Result<Mat> {
    crop_rows(src, src.rows() - height, src.rows())
}

pub fn to_gray(bgr: &Mat) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(bgr, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

pub fn to_hsv(bgr: &Mat) -> Result<Mat> {
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(bgr, &mut hsv, imgproc::COLOR_BGR2HSV)?;
    Ok(hsv)
}

/// Blur then binarize: pixels brighter than `threshold` become 255.
pub fn blur_and_threshold(gray: &Mat, blur_kernel: i32, threshold: f64) -> Result<Mat> {
    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(
        gray,
        &mut blurred,
        Size::new(blur_kernel, blur_kernel),
        0.0,
    )?;

    let mut binary = Mat::default();
    imgproc::threshold(
        &blurred,
        &mut binary,
        threshold,
        255.0,
        imgproc::THRESH_BINARY,
    )?;
    Ok(binary)
}

/// Rectangular structuring element, `width` columns by `height` rows.
pub fn rect_kernel(width: i32, height: i32) -> Result<Mat> {
    Ok(imgproc::get_structuring_element_def(
        imgproc::MORPH_RECT,
        Size::new(width, height),
    )?)
}

pub fn open(mask: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::morphology_ex_def(mask, &mut out, imgproc::MORPH_OPEN, kernel)?;
    Ok(out)
}

pub fn close(mask: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::morphology_ex_def(mask, &mut out, imgproc::MORPH_CLOSE, kernel)?;
    Ok(out)
}

/// Opening followed by closing: drops speckles, then fills small gaps.
pub fn open_close(mask: &Mat, kernel_size: i32) -> Result<Mat> {
    let kernel = rect_kernel(kernel_size, kernel_size)?;
    let opened = open(mask, &kernel)?;
    close(&opened, &kernel)
}

pub fn dilate(mask: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::dilate_def(mask, &mut out, kernel)?;
    Ok(out)
}

pub fn bitwise_or(a: &Mat, b: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    core::bitwise_or_def(a, b, &mut out)?;
    Ok(out)
}

pub fn count_foreground(mask: &Mat) -> Result<u32> {
    Ok(core::count_non_zero(mask)? as u32)
}

/// Per-column sum of mask values over rows `[from_row, rows)`. A 0/255 mask
/// contributes 255 for every lit pixel.
pub fn column_histogram(mask: &Mat, from_row: i32) -> Result<Vec<u32>> {
    let rows = mask.rows();
    let cols = mask.cols();
    if from_row < 0 || from_row > rows {
        bail!("histogram start row {} outside mask of height {}", from_row, rows);
    }
    if from_row == rows || cols <= 0 {
        return Ok(vec![0; cols.max(0) as usize]);
    }

    let lower = Mat::roi(mask, Rect::new(0, from_row, cols, rows - from_row))?;
    let mut sums = Mat::default();
    core::reduce(&lower, &mut sums, 0, core::REDUCE_SUM, core::CV_32S)?;

    let mut histogram = Vec::with_capacity(cols as usize);
    for x in 0..cols {
        histogram.push((*sums.at_2d::<i32>(0, x)?).max(0) as u32);
    }
    Ok(histogram)
}

/// Foreground pixels per row inside columns `[left, right)`.
pub fn row_profile(mask: &Mat, left: i32, right: i32) -> Result<Vec<u32>> {
    let left = left.max(0);
    let right = right.min(mask.cols());
    let mut profile = vec![0u32; mask.rows().max(0) as usize];
    for y in 0..mask.rows() {
        for x in left..right {
            if *mask.at_2d::<u8>(y, x)? > 0 {
                profile[y as usize] += 1;
            }
        }
    }
    Ok(profile)
}

/// Index and value of the maximum, ties broken by the lowest index.
pub fn peak(values: &[u32]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}
