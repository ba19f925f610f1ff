use std::io::Write;

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use crate::video_extraction::{Frame, RenderConfig};

/// Glyphs from sparse to dense.
pub const RAMP: &[u8] = b"  .:-=+*#%@";

/// Brightness offset applied after equalisation.
pub const BRIGHTNESS: f32 = 15.0;

/// Linear contrast gain applied after equalisation.
pub const CONTRAST: f32 = 35.0;

const SATURATION_BOOST: f32 = 1.3;

/// Position in [`RAMP`] for an intensity; never decreases as intensity grows.
pub fn ramp_index(intensity: u8) -> usize {
    (usize::from(intensity) * RAMP.len() / 256).min(RAMP.len() - 1)
}

pub fn brightness_to_ascii(intensity: u8) -> char {
    RAMP[ramp_index(intensity)] as char
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiChar {
    pub character: char,

    pub color: Option<(u8, u8, u8)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsciiFrame {
    pub width: u32,

    pub height: u32,

    /// Row-major cells.
    pub data: Vec<AsciiChar>,
}

impl AsciiFrame {
    pub fn rows(&self) -> impl Iterator<Item = &[AsciiChar]> {
        self.data.chunks(self.width.max(1) as usize)
    }
}

pub struct AsciiConverter {
    config: RenderConfig,
}

impl AsciiConverter {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Enhance, resize to the character grid and drop color when it is not wanted.
    pub fn transform(&self, frame: &Frame) -> Frame {
        let (width, height) = self.config.grid_for(frame.width(), frame.height());

        let enhanced = if self.config.enhance {
            frame
                .enhance_contrast()
                .adjust_brightness_contrast(BRIGHTNESS, CONTRAST)
        } else {
            frame.clone()
        };

        let resized = enhanced.resize(width, height);

        if self.config.color {
            resized
        } else {
            resized.to_grayscale()
        }
    }

    /// Maps an already transformed frame to glyphs.
    pub fn map(&self, frame: &Frame) -> AsciiFrame {
        let (width, height) = (frame.width(), frame.height());
        let mut data = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            for x in 0..width {
                let intensity = frame.intensity(x, y).unwrap_or(0);
                let color = if self.config.color && !frame.is_gray() {
                    frame.get_pixel(x, y)
                } else {
                    None
                };

                data.push(AsciiChar {
                    character: brightness_to_ascii(intensity),
                    color,
                });
            }
        }

        AsciiFrame {
            width,
            height,
            data,
        }
    }

    pub fn convert(&self, frame: &Frame) -> AsciiFrame {
        self.map(&self.transform(frame))
    }
}

/// 256-color palette index: the gray ramp for neutral colors, the 6x6x6 cube otherwise.
pub fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    if r == g && g == b {
        if r < 8 {
            return 16;
        }
        if r > 248 {
            return 231;
        }
        return ((f32::from(r) - 8.0) / 247.0 * 24.0).round() as u8 + 232;
    }

    let level = |c: u8| (f32::from(c) / 255.0 * 5.0).round() as u8;
    16 + 36 * level(r) + 6 * level(g) + level(b)
}

/// Scales HSV saturation, keeping hue and value.
pub fn boost_saturation(r: u8, g: u8, b: u8, factor: f32) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return (r, g, b);
    }

    let value = f32::from(max);
    let saturation = (f32::from(max - min) / value * factor).min(1.0);
    let new_min = value * (1.0 - saturation);
    let old_span = f32::from(max - min);

    let channel = |c: u8| {
        let t = f32::from(c - min) / old_span;
        (new_min + t * (value - new_min)).round().clamp(0.0, 255.0) as u8
    };
    (channel(r), channel(g), channel(b))
}

pub fn terminal_color((r, g, b): (u8, u8, u8)) -> Color {
    let (r, g, b) = boost_saturation(r, g, b, SATURATION_BOOST);
    Color::AnsiValue(rgb_to_ansi256(r, g, b))
}

/// Queues the whole frame at the top-left corner followed by `status`, then flushes once.
pub fn render_ascii_frame(out: &mut impl Write, frame: &AsciiFrame, status: &str) -> std::io::Result<()> {
    queue!(out, MoveTo(0, 0))?;

    let mut current: Option<Color> = None;
    let mut run = String::with_capacity((frame.width as usize + 2) * frame.height as usize);

    for row in frame.rows() {
        for cell in row {
            let color = cell.color.map(terminal_color);
            if color != current {
                if !run.is_empty() {
                    queue!(out, Print(&run))?;
                    run.clear();
                }
                match color {
                    Some(color) => queue!(out, SetForegroundColor(color))?,
                    None => queue!(out, ResetColor)?,
                }
                current = color;
            }
            run.push(cell.character);
        }
        run.push_str("\r\n");
    }

    if !run.is_empty() {
        queue!(out, Print(&run))?;
    }
    if current.is_some() {
        queue!(out, ResetColor)?;
    }

    queue!(out, Print(status))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video_extraction::frame::Pixels;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn config(width: u32, color: bool, enhance: bool) -> RenderConfig {
        RenderConfig {
            width,
            fps: 30.0,
            color,
            enhance,
        }
    }

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(Pixels::Color(RgbImage::from_pixel(width, height, Rgb(rgb))), 0.0, 0)
    }

    #[test]
    fn ramp_index_is_monotonic_and_clamped() {
        let mut last = 0;
        for v in 0..=255u8 {
            let idx = ramp_index(v);
            assert!(idx >= last, "ramp went backwards at {v}");
            assert!(idx < RAMP.len());
            last = idx;
        }
        assert_eq!(ramp_index(0), 0);
        assert_eq!(ramp_index(255), RAMP.len() - 1);
    }

    #[test]
    fn mid_gray_maps_to_middle_of_ramp() {
        assert_eq!(ramp_index(128), 5);
        assert_eq!(brightness_to_ascii(128), '=');
    }

    #[test]
    fn glyph_frame_matches_configured_grid() {
        for (src_w, src_h) in [(64, 36), (320, 180), (160, 120), (37, 300)] {
            for width in [1, 10, 80, 120] {
                for (color, enhance) in [(true, true), (false, false), (true, false), (false, true)] {
                    let cfg = config(width, color, enhance);
                    let frame = solid(src_w, src_h, [10, 200, 90]);
                    let ascii = AsciiConverter::new(cfg).convert(&frame);

                    let (w, h) = cfg.grid_for(src_w, src_h);
                    assert_eq!(ascii.width, width);
                    assert_eq!(ascii.height, h);
                    assert_eq!(w, width);
                    assert_eq!(ascii.data.len(), (w * h) as usize);
                }
            }
        }
    }

    #[test]
    fn monochrome_has_no_color_annotations() {
        let ascii = AsciiConverter::new(config(12, false, true)).convert(&solid(48, 48, [200, 20, 20]));
        assert!(ascii.data.iter().all(|c| c.color.is_none()));
    }

    #[test]
    fn color_mode_keeps_pixel_color() {
        let ascii = AsciiConverter::new(config(8, true, false)).convert(&solid(32, 32, [200, 20, 20]));
        assert!(ascii.data.iter().all(|c| c.color == Some((200, 20, 20))));
    }

    #[test]
    fn gray_input_in_color_mode_is_unannotated() {
        let frame = Frame::new(Pixels::Gray(GrayImage::from_pixel(20, 20, Luma([255]))), 0.0, 0);
        let ascii = AsciiConverter::new(config(5, true, false)).convert(&frame);
        assert!(ascii.data.iter().all(|c| c.color.is_none() && c.character == '@'));
    }

    #[test]
    fn ansi_palette_mapping() {
        assert_eq!(rgb_to_ansi256(0, 0, 0), 16);
        assert_eq!(rgb_to_ansi256(255, 255, 255), 231);
        assert_eq!(rgb_to_ansi256(128, 128, 128), 244);
        assert_eq!(rgb_to_ansi256(255, 0, 0), 196);
        assert_eq!(rgb_to_ansi256(0, 255, 0), 46);
        assert_eq!(rgb_to_ansi256(0, 0, 255), 21);
    }

    #[test]
    fn saturation_boost_keeps_grays_and_value() {
        assert_eq!(boost_saturation(90, 90, 90, 1.3), (90, 90, 90));

        let (r, g, b) = boost_saturation(200, 150, 150, 1.3);
        assert_eq!(r, 200);
        assert_eq!(g, b);
        assert!(g < 150);
    }

    #[test]
    fn render_writes_rows_and_status() {
        let frame = AsciiFrame {
            width: 3,
            height: 2,
            data: "ab.cd:".chars().map(|character| AsciiChar { character, color: None }).collect(),
        };

        let mut out: Vec<u8> = Vec::new();
        render_ascii_frame(&mut out, &frame, "Frame: 1").unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("\x1b[1;1H"));
        assert!(text.contains("ab.\r\ncd:\r\n"));
        assert!(text.ends_with("Frame: 1"));
        assert!(!text.contains("\x1b[38;5;"));
    }

    #[test]
    fn render_emits_one_color_per_run() {
        let red = Some((255, 0, 0));
        let blue = Some((0, 0, 255));
        let frame = AsciiFrame {
            width: 4,
            height: 1,
            data: vec![
                AsciiChar { character: '#', color: red },
                AsciiChar { character: '#', color: red },
                AsciiChar { character: '@', color: blue },
                AsciiChar { character: '@', color: blue },
            ],
        };

        let mut out: Vec<u8> = Vec::new();
        render_ascii_frame(&mut out, &frame, "").unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches("\x1b[38;5;196m").count(), 1);
        assert_eq!(text.matches("\x1b[38;5;21m").count(), 1);
        assert!(text.contains("##"));
        assert!(text.ends_with("\x1b[0m"));
    }

    #[test]
    fn uncolored_cell_after_colored_one_resets() {
        let frame = AsciiFrame {
            width: 2,
            height: 1,
            data: vec![
                AsciiChar { character: '#', color: Some((255, 0, 0)) },
                AsciiChar { character: '.', color: None },
            ],
        };

        let mut out: Vec<u8> = Vec::new();
        render_ascii_frame(&mut out, &frame, "").unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("\x1b[38;5;196m#\x1b[0m.\r\n"));
        assert_eq!(text.matches("\x1b[0m").count(), 1);
    }
}
