use std::fmt;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

/// Pixel storage of a decoded or processed frame.
#[derive(Clone, PartialEq)]
pub enum Pixels {
    Color(RgbImage),
    Gray(GrayImage),
}

#[derive(Clone)]
pub struct Frame {
    pub pixels: Pixels,

    pub timestamp: f64,

    pub index: u64,
}

/// BT.601 luma in fixed point.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b) + 128) >> 8) as u8
}

impl Frame {
    pub fn new(pixels: Pixels, timestamp: f64, index: u64) -> Self {
        Self {
            pixels,
            timestamp,
            index,
        }
    }

    /// Wraps tightly packed RGB24 data. `None` when `data` has the wrong length.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, timestamp: f64, index: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|img| Self::new(Pixels::Color(img), timestamp, index))
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            Pixels::Color(img) => img.width(),
            Pixels::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            Pixels::Color(img) => img.height(),
            Pixels::Gray(img) => img.height(),
        }
    }

    pub fn is_gray(&self) -> bool {
        matches!(self.pixels, Pixels::Gray(_))
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width() || y >= self.height() {
            return None;
        }

        match &self.pixels {
            Pixels::Color(img) => {
                let p = img.get_pixel(x, y);
                Some((p[0], p[1], p[2]))
            }
            Pixels::Gray(img) => {
                let v = img.get_pixel(x, y)[0];
                Some((v, v, v))
            }
        }
    }

    pub fn intensity(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width() || y >= self.height() {
            return None;
        }

        match &self.pixels {
            Pixels::Color(img) => {
                let p = img.get_pixel(x, y);
                Some(luma(p[0], p[1], p[2]))
            }
            Pixels::Gray(img) => Some(img.get_pixel(x, y)[0]),
        }
    }

    /// Single-channel copy. Gray frames come back unchanged.
    pub fn to_grayscale(&self) -> Frame {
        let gray = match &self.pixels {
            Pixels::Gray(img) => img.clone(),
            Pixels::Color(img) => GrayImage::from_fn(img.width(), img.height(), |x, y| {
                let p = img.get_pixel(x, y);
                Luma([luma(p[0], p[1], p[2])])
            }),
        };

        self.with_pixels(Pixels::Gray(gray))
    }

    /// Bilinear resize; quality matters less than speed at character-grid sizes.
    pub fn resize(&self, new_width: u32, new_height: u32) -> Frame {
        if self.width() == new_width && self.height() == new_height {
            return self.clone();
        }

        let pixels = match &self.pixels {
            Pixels::Color(img) => {
                Pixels::Color(imageops::resize(img, new_width, new_height, FilterType::Triangle))
            }
            Pixels::Gray(img) => {
                Pixels::Gray(imageops::resize(img, new_width, new_height, FilterType::Triangle))
            }
        };

        self.with_pixels(pixels)
    }

    /// Global histogram equalisation of the luma channel.
    ///
    /// Color frames get the luma shift added to every channel so hues survive.
    /// A frame with a single intensity level is returned unchanged.
    pub fn enhance_contrast(&self) -> Frame {
        let lut = match equalisation_lut(&self.luma_histogram()) {
            Some(lut) => lut,
            None => return self.clone(),
        };

        let pixels = match &self.pixels {
            Pixels::Gray(img) => {
                let mut out = img.clone();
                for p in out.pixels_mut() {
                    p[0] = lut[p[0] as usize];
                }
                Pixels::Gray(out)
            }
            Pixels::Color(img) => {
                let mut out = img.clone();
                for p in out.pixels_mut() {
                    let l = luma(p[0], p[1], p[2]);
                    let delta = i16::from(lut[l as usize]) - i16::from(l);
                    for c in p.0.iter_mut() {
                        *c = (i16::from(*c) + delta).clamp(0, 255) as u8;
                    }
                }
                Pixels::Color(out)
            }
        };

        self.with_pixels(pixels)
    }

    /// `v * (contrast / 127 + 1) - contrast + brightness`, clamped per channel.
    pub fn adjust_brightness_contrast(&self, brightness: f32, contrast: f32) -> Frame {
        let gain = contrast / 127.0 + 1.0;
        let mut lut = [0u8; 256];
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = (v as f32 * gain - contrast + brightness).round().clamp(0.0, 255.0) as u8;
        }

        let pixels = match &self.pixels {
            Pixels::Gray(img) => {
                let mut out = img.clone();
                for p in out.pixels_mut() {
                    p[0] = lut[p[0] as usize];
                }
                Pixels::Gray(out)
            }
            Pixels::Color(img) => {
                let mut out = img.clone();
                for p in out.pixels_mut() {
                    for c in p.0.iter_mut() {
                        *c = lut[*c as usize];
                    }
                }
                Pixels::Color(out)
            }
        };

        self.with_pixels(pixels)
    }

    fn luma_histogram(&self) -> [u64; 256] {
        let mut histogram = [0u64; 256];
        match &self.pixels {
            Pixels::Gray(img) => {
                for p in img.pixels() {
                    histogram[p[0] as usize] += 1;
                }
            }
            Pixels::Color(img) => {
                for p in img.pixels() {
                    histogram[luma(p[0], p[1], p[2]) as usize] += 1;
                }
            }
        }
        histogram
    }

    fn with_pixels(&self, pixels: Pixels) -> Frame {
        Frame::new(pixels, self.timestamp, self.index)
    }
}

/// Maps the darkest present level to 0 and the brightest to 255.
fn equalisation_lut(histogram: &[u64; 256]) -> Option<[u8; 256]> {
    let total: u64 = histogram.iter().sum();
    let cdf_min = histogram.iter().copied().find(|&n| n > 0)?;
    if total == cdf_min {
        return None;
    }

    let span = (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (v, &count) in histogram.iter().enumerate() {
        cdf += count;
        lut[v] = ((cdf.saturating_sub(cdf_min)) as f64 / span * 255.0).round() as u8;
    }
    Some(lut)
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("gray", &self.is_gray())
            .field("timestamp", &self.timestamp)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intensity_range(frame: &Frame) -> (u8, u8) {
        let histogram = frame.luma_histogram();
        let min = histogram.iter().position(|&n| n > 0).unwrap_or(0);
        let max = histogram.iter().rposition(|&n| n > 0).unwrap_or(0);
        (min as u8, max as u8)
    }

    fn gradient(width: u32, height: u32, lo: u8, hi: u8) -> Frame {
        let span = f32::from(hi - lo);
        let img = GrayImage::from_fn(width, height, |x, _| {
            Luma([lo + (x as f32 / (width - 1) as f32 * span) as u8])
        });
        Frame::new(Pixels::Gray(img), 0.0, 0)
    }

    fn color_noise(width: u32, height: u32) -> Frame {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 37 % 256) as u8, (y * 91 % 256) as u8, ((x + y) * 13 % 256) as u8])
        });
        Frame::new(Pixels::Color(img), 1.5, 7)
    }

    #[test]
    fn grayscale_is_deterministic_and_idempotent() {
        let frame = color_noise(16, 9);
        let once = frame.to_grayscale();
        let again = frame.to_grayscale();
        assert!(once.pixels == again.pixels);

        let twice = once.to_grayscale();
        assert!(twice.pixels == once.pixels);
        assert_eq!(twice.timestamp, 1.5);
        assert_eq!(twice.index, 7);
    }

    #[test]
    fn luma_keeps_neutral_grays() {
        for v in [0u8, 1, 64, 128, 200, 255] {
            assert_eq!(luma(v, v, v), v);
        }
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
        assert!(luma(255, 0, 0) > luma(0, 0, 255));
    }

    #[test]
    fn resize_hits_target_dimensions() {
        let frame = color_noise(64, 36).resize(10, 2);
        assert_eq!((frame.width(), frame.height()), (10, 2));
        assert!(!frame.is_gray());
    }

    #[test]
    fn resize_of_solid_frame_keeps_value() {
        let img = GrayImage::from_pixel(64, 36, Luma([128]));
        let frame = Frame::new(Pixels::Gray(img), 0.0, 0).resize(10, 2);
        assert_eq!(intensity_range(&frame), (128, 128));
    }

    #[test]
    fn equalisation_spreads_to_full_range() {
        let frame = gradient(32, 4, 100, 140).enhance_contrast();
        assert_eq!(intensity_range(&frame), (0, 255));
    }

    #[test]
    fn equalisation_leaves_flat_frame_alone() {
        let img = GrayImage::from_pixel(8, 8, Luma([90]));
        let frame = Frame::new(Pixels::Gray(img), 0.0, 0);
        assert!(frame.enhance_contrast().pixels == frame.pixels);
    }

    #[test]
    fn enhancing_twice_never_shrinks_spread() {
        let enhance = |f: &Frame| f.enhance_contrast().adjust_brightness_contrast(15.0, 35.0);
        let spread = |f: &Frame| {
            let (lo, hi) = intensity_range(f);
            hi - lo
        };

        for frame in [gradient(32, 4, 60, 90), gradient(32, 4, 0, 255), gradient(32, 4, 10, 11)] {
            let once = enhance(&frame);
            let twice = enhance(&once);
            assert!(spread(&twice) >= spread(&once));
        }
    }

    #[test]
    fn brightness_contrast_clamps() {
        let frame = gradient(16, 1, 0, 255).adjust_brightness_contrast(15.0, 35.0);
        assert_eq!(frame.intensity(0, 0), Some(0));
        assert_eq!(frame.intensity(15, 0), Some(255));
    }

    #[test]
    fn out_of_bounds_pixels_are_none() {
        let frame = color_noise(4, 4);
        assert!(frame.get_pixel(4, 0).is_none());
        assert!(frame.intensity(0, 4).is_none());
        assert!(frame.get_pixel(3, 3).is_some());
    }
}
