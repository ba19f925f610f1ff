use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::util::rational::Rational;

use crate::video_extraction::{Error, Frame, Result};

/// Sequential, forward-only supply of frames.
pub trait FrameSource {
    /// Next frame, `Err(Error::EndOfStream)` once exhausted.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Native rate in frames per second, `0.0` when unknown.
    fn frame_rate(&self) -> f64;

    fn frame_count(&self) -> Option<u64> {
        None
    }

    fn dimensions(&self) -> (u32, u32);
}

pub struct VideoReader {
    path: PathBuf,

    context: ffmpeg::format::context::Input,

    decoder: ffmpeg::decoder::Video,

    /// Converts whatever the decoder emits to packed RGB24 at native size.
    scaler: Context,

    stream_index: usize,

    time_base: Rational,

    frame_rate: f64,

    frame_count: Option<u64>,

    duration: f64,

    decoded: u64,

    eof_sent: bool,
}

impl VideoReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::SourceUnavailable(format!("{} does not exist", path.display())));
        }

        let unavailable = |e: ffmpeg::Error| Error::SourceUnavailable(format!("{}: {e}", path.display()));

        ffmpeg::init().map_err(unavailable)?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        let context = input(&path).map_err(unavailable)?;

        let stream = context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| Error::SourceUnavailable(format!("{}: no video stream found", path.display())))?;

        let stream_index = stream.index();
        let time_base = stream.time_base();

        let codec_context =
            ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(unavailable)?;
        let decoder = codec_context.decoder().video().map_err(unavailable)?;

        let frame_rate = rate_to_fps(stream.avg_frame_rate())
            .or_else(|| rate_to_fps(stream.rate()))
            .unwrap_or(0.0);

        let frame_count = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);

        let duration = if context.duration() > 0 {
            context.duration() as f64 * f64::from(ffmpeg::rescale::TIME_BASE)
        } else {
            0.0
        };

        let scaler = Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::FAST_BILINEAR,
        )
        .map_err(unavailable)?;

        log::info!(
            "Opened {}: {}x{} @ {:.2} fps, {:?} frames",
            path.display(),
            decoder.width(),
            decoder.height(),
            frame_rate,
            frame_count
        );

        Ok(Self {
            path,
            context,
            decoder,
            scaler,
            stream_index,
            time_base,
            frame_rate,
            frame_count,
            duration,
            decoded: 0,
            eof_sent: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container duration in seconds, `0.0` when unknown.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.context.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn convert(&mut self, decoded: &Video) -> Result<Frame> {
        let mut rgb = Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .map_err(|e| Error::DecodeFailure(e.to_string()))?;

        let width = rgb.width();
        let height = rgb.height();
        let stride = rgb.stride(0);
        let row = width as usize * 3;
        let plane = rgb.data(0);

        // Rows are padded to the line size.
        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let line = plane
                .get(start..start + row)
                .ok_or_else(|| Error::DecodeFailure("truncated RGB plane".to_string()))?;
            data.extend_from_slice(line);
        }

        let pts = decoded.timestamp().or_else(|| decoded.pts()).unwrap_or(0);
        let timestamp = pts as f64 * f64::from(self.time_base);

        let index = self.decoded;
        self.decoded += 1;

        Frame::from_rgb(width, height, data, timestamp, index)
            .ok_or_else(|| Error::DecodeFailure("RGB plane size mismatch".to_string()))
    }
}

impl FrameSource for VideoReader {
    fn next_frame(&mut self) -> Result<Frame> {
        loop {
            let mut decoded = Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert(&decoded),
                Err(ffmpeg::Error::Eof) => return Err(Error::EndOfStream),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {}
                Err(e) => return Err(Error::DecodeFailure(e.to_string())),
            }

            if self.eof_sent {
                return Err(Error::EndOfStream);
            }

            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .map_err(|e| Error::DecodeFailure(e.to_string()))?,
                None => {
                    // Drain frames still buffered in the decoder.
                    self.decoder
                        .send_eof()
                        .map_err(|e| Error::DecodeFailure(e.to_string()))?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }
}

fn rate_to_fps(rate: Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(f64::from(rate))
    } else {
        None
    }
}
