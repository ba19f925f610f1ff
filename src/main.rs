use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::{
    cursor, execute,
    style::ResetColor,
    terminal::{self, Clear, ClearType},
};

mod ascii_converter;
mod player;
mod prompt;
mod video_extraction;

use player::{Interrupt, PlaybackState, Player, TerminalInterrupt};
use video_extraction::{Error, FrameSource, MediaInput, RenderConfig, VideoReader};

/// Plays a video file or YouTube link as ASCII art in the terminal.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Video path or URL; asked for when omitted
    input: Option<String>,

    /// Accept the default width, fps, color and contrast settings
    #[clap(short, long)]
    yes: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    println!("{}", "=".repeat(60));
    println!("  COLORED ASCII VIDEO PLAYER");
    println!("{}", "=".repeat(60));

    let source = match args.input.clone() {
        Some(input) => input,
        None => prompt::ask_source()?,
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to set Ctrl-C handler")?;

    // Owns any downloaded file until the end of the session.
    let input = match MediaInput::resolve(&source, &interrupted) {
        Ok(input) => input,
        Err(Error::InterruptRequested) => {
            println!("\nDownload interrupted.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let result = play(&input, &args, &interrupted);

    let temporary = input.is_temporary().then(|| input.path().to_path_buf());
    drop(input);
    if let Some(path) = temporary.filter(|p| !p.exists()) {
        println!("Cleaned up temporary file: {}", path.display());
    }

    result
}

fn play(input: &MediaInput, args: &Args, interrupted: &Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut reader = VideoReader::open(input.path())?;
    let native_frame_rate = reader.frame_rate();

    let config = if args.yes {
        RenderConfig {
            fps: prompt::effective_native_fps(native_frame_rate),
            ..Default::default()
        }
    } else {
        match prompt::ask_render_config(native_frame_rate) {
            Ok(config) => config,
            Err(e) if interrupted.load(Ordering::SeqCst) || prompt::was_interrupted(&e) => {
                println!("\nVideo playback stopped.");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    };

    if interrupted.load(Ordering::SeqCst) {
        println!("\nVideo playback stopped.");
        return Ok(());
    }

    let (src_width, src_height) = reader.dimensions();
    let (cols, rows) = config.grid_for(src_width, src_height);
    let on_off = |b: bool| if b { "ON" } else { "OFF" };

    println!("\nStarting playback...");
    println!("Video: {}", reader.path().display());
    println!("Duration: {:.2} seconds", reader.duration());
    println!("Video FPS: {:.2}", native_frame_rate);
    println!("Playback FPS: {:.2}", config.fps);
    match reader.frame_count() {
        Some(total) => println!("Total frames: {total}"),
        None => println!("Total frames: unknown"),
    }
    println!("Resolution: {}x{}", src_width, src_height);
    println!("ASCII output: {}x{}", cols, rows);
    println!("Color mode: {}", on_off(config.color));
    println!("Contrast enhancement: {}", on_off(config.enhance));
    println!("\nPress Ctrl+C, Q or Esc to stop");

    let mut interrupt = TerminalInterrupt::new(Arc::clone(interrupted));
    if interrupt.wait(Duration::from_secs(2)) {
        println!("\nVideo playback stopped.");
        return Ok(());
    }

    let report = {
        let _terminal = TerminalGuard::enter()?;
        let stdout = stdout();
        Player::new(config).run(&mut reader, &mut stdout.lock(), &mut interrupt)?
    };

    if let Some(msg) = &report.decode_error {
        log::warn!("Stopped at a corrupt frame: {msg}");
    }

    match report.state {
        PlaybackState::Stopped => println!("\nVideo playback stopped."),
        _ => println!("\nPlayback complete!"),
    }
    log::info!("Rendered {} frames", report.frames_rendered);

    Ok(())
}

/// Raw mode and the alternate screen for as long as it lives.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> anyhow::Result<Self> {
        // Created first so a half-finished setup is still undone.
        let guard = Self;
        setup_terminal().context("Failed to prepare the terminal")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = restore_terminal() {
            log::warn!("Failed to restore the terminal: {e}");
        }
    }
}

fn setup_terminal() -> Result<(), std::io::Error> {
    terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(
        stdout,
        terminal::EnterAlternateScreen,
        cursor::Hide,
        Clear(ClearType::All)
    )?;
    Ok(())
}

fn restore_terminal() -> Result<(), std::io::Error> {
    let mut stdout = stdout();
    execute!(
        stdout,
        terminal::LeaveAlternateScreen,
        cursor::Show,
        ResetColor
    )?;
    terminal::disable_raw_mode()?;
    stdout.flush()
}
