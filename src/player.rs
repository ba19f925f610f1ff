use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use crate::ascii_converter::{self, AsciiConverter};
use crate::video_extraction::{Error, FrameSource, RenderConfig, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    /// Interrupted by the user.
    Stopped,
    /// The source ran out of frames.
    Finished,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Finished)
    }
}

/// Something that can ask playback to stop.
pub trait Interrupt {
    /// Blocks for up to `timeout`. Returns `true` as soon as a stop is requested.
    fn wait(&mut self, timeout: Duration) -> bool;

    fn requested(&mut self) -> bool {
        self.wait(Duration::ZERO)
    }
}

/// Ctrl+C, `q` or `Esc` on the terminal, or the process signal flag.
pub struct TerminalInterrupt {
    flag: Arc<AtomicBool>,
}

impl TerminalInterrupt {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    fn raise(&self) -> bool {
        self.flag.store(true, Ordering::SeqCst);
        true
    }
}

impl Interrupt for TerminalInterrupt {
    fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.flag.load(Ordering::SeqCst) {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match event::poll(remaining) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind != KeyEventKind::Release && is_stop_key(key.code, key.modifiers) {
                            return self.raise();
                        }
                    }
                }
                Ok(false) => return self.flag.load(Ordering::SeqCst),
                Err(_) => {
                    // No readable terminal; only the signal flag can stop us.
                    std::thread::sleep(remaining);
                    return self.flag.load(Ordering::SeqCst);
                }
            }

            if Instant::now() >= deadline {
                return self.flag.load(Ordering::SeqCst);
            }
        }
    }
}

fn is_stop_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        KeyCode::Char('q') | KeyCode::Esc => true,
        _ => false,
    }
}

/// Summary of one playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub state: PlaybackState,

    pub frames_rendered: u64,

    /// Set when a corrupt frame ended playback early.
    pub decode_error: Option<String>,
}

pub struct Player {
    converter: AsciiConverter,

    state: PlaybackState,

    frames_rendered: u64,

    decode_error: Option<String>,

    /// Reused so each frame reaches the terminal in a single write.
    frame_buf: Vec<u8>,
}

impl Player {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            converter: AsciiConverter::new(config),
            state: PlaybackState::Idle,
            frames_rendered: 0,
            decode_error: None,
            frame_buf: Vec::new(),
        }
    }

    /// Plays `source` to `out` until the stream ends or `interrupt` fires.
    ///
    /// Once playback has stopped or finished, further calls return the same
    /// report without reading from `source`.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        out: &mut impl Write,
        interrupt: &mut dyn Interrupt,
    ) -> Result<PlaybackReport> {
        if self.state.is_terminal() {
            return Ok(self.report());
        }

        self.state = PlaybackState::Playing;
        let frame_interval = self.converter.config().frame_interval();
        let total = source.frame_count();

        while self.state == PlaybackState::Playing {
            let started = Instant::now();

            if interrupt.requested() {
                self.state = PlaybackState::Stopped;
                break;
            }

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(Error::EndOfStream) => {
                    self.state = PlaybackState::Finished;
                    break;
                }
                Err(Error::DecodeFailure(msg)) => {
                    self.decode_error = Some(msg);
                    self.state = PlaybackState::Finished;
                    break;
                }
                Err(e) => {
                    self.state = PlaybackState::Finished;
                    return Err(e);
                }
            };

            let ascii = self.converter.convert(&frame);
            self.frames_rendered += 1;
            let status = progress_line(self.frames_rendered, total);
            self.frame_buf.clear();
            ascii_converter::render_ascii_frame(&mut self.frame_buf, &ascii, &status)?;
            out.write_all(&self.frame_buf)?;
            out.flush()?;

            let remaining = frame_interval.saturating_sub(started.elapsed());
            if interrupt.wait(remaining) {
                self.state = PlaybackState::Stopped;
            }
        }

        log::debug!(
            "Playback ended as {:?} after {} frames",
            self.state,
            self.frames_rendered
        );

        Ok(self.report())
    }

    fn report(&self) -> PlaybackReport {
        PlaybackReport {
            state: self.state,
            frames_rendered: self.frames_rendered,
            decode_error: self.decode_error.clone(),
        }
    }
}

fn progress_line(frame: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let percent = frame as f64 / total as f64 * 100.0;
            format!("Frame: {frame}/{total} ({percent:.1}%)")
        }
        _ => format!("Frame: {frame}"),
    }
}
