pub mod download;
pub mod frame;
pub mod reader;

pub use download::MediaInput;
pub use frame::Frame;
pub use reader::{FrameSource, VideoReader};

/// Terminal cells are roughly twice as tall as they are wide.
pub const CHAR_ASPECT: f64 = 0.5;

pub const DEFAULT_WIDTH: u32 = 120;

/// Playback rate used when neither the user nor the container gives one.
pub const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("decoding error: {0}")]
    DecodeFailure(String),

    #[error("end of stream reached")]
    EndOfStream,

    #[error("interrupted")]
    InterruptRequested,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] ffmpeg_next::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parameters of one playback session. Fixed once playback starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// Output width in characters.
    pub width: u32,

    pub fps: f64,

    pub color: bool,

    /// Histogram equalisation plus brightness/contrast boost before resizing.
    pub enhance: bool,
}

impl RenderConfig {
    /// Character grid for a source of `src_width` x `src_height` pixels.
    pub fn grid_for(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let width = self.width.max(1);
        if src_width == 0 || src_height == 0 {
            return (width, 1);
        }
        let height =
            (f64::from(src_height) * f64::from(width) / f64::from(src_width) * CHAR_ASPECT).floor();
        (width, (height as u32).max(1))
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            FALLBACK_FPS
        };
        std::time::Duration::from_secs_f64(1.0 / fps)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            fps: FALLBACK_FPS,
            color: true,
            enhance: true,
        }
    }
}
