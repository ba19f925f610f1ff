use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::TempDir;

use crate::video_extraction::{Error, Result};

const DOWNLOADER: &str = "yt-dlp";

/// Keeps downloads small enough to decode in real time.
const DOWNLOAD_FORMAT: &str = "best[height<=720]";

const DOWNLOAD_NAME: &str = "video.mp4";

fn youtube_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/(watch\?v=|embed/|v/|.+\?v=)?([^&=%\?]{11})",
        )
        .expect("valid YouTube pattern")
    })
}

/// Whether `input` should be fetched with the downloader instead of opened from disk.
pub fn is_remote(input: &str) -> bool {
    let input = input.trim();
    if youtube_pattern().is_match(input) {
        return true;
    }
    matches!(url::Url::parse(input), Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

/// The video to play: a file the user owns, or a download we must remove.
#[derive(Debug)]
pub enum MediaInput {
    Local(PathBuf),
    Downloaded(TempDownload),
}

impl MediaInput {
    /// Turns user input into an openable path, downloading remote videos first.
    ///
    /// `interrupted` is raised by the signal handler; an interrupted download
    /// reports `Error::InterruptRequested` rather than a source failure.
    pub fn resolve(input: &str, interrupted: &AtomicBool) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::SourceUnavailable("no video path or URL given".to_string()));
        }

        if is_remote(input) {
            return TempDownload::fetch(input, interrupted).map(MediaInput::Downloaded);
        }

        let path = PathBuf::from(input);
        if !path.is_file() {
            return Err(Error::SourceUnavailable(format!("{} does not exist", path.display())));
        }
        Ok(MediaInput::Local(path))
    }

    pub fn path(&self) -> &Path {
        match self {
            MediaInput::Local(path) => path,
            MediaInput::Downloaded(download) => download.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, MediaInput::Downloaded(_))
    }
}

/// A downloaded video inside its own temporary directory.
///
/// Dropping it deletes the file and the directory, whichever way the
/// session ends.
#[derive(Debug)]
pub struct TempDownload {
    dir: Option<TempDir>,

    path: PathBuf,
}

impl TempDownload {
    /// Wraps a file that already lives inside `dir`.
    pub fn new(dir: TempDir, file_name: &str) -> Self {
        let path = dir.path().join(file_name);
        Self { dir: Some(dir), path }
    }

    pub fn fetch(url: &str, interrupted: &AtomicBool) -> Result<Self> {
        check_downloader()?;

        let dir = tempfile::Builder::new()
            .prefix("ascii_video_")
            .tempdir()
            .map_err(|e| Error::SourceUnavailable(format!("cannot create temporary directory: {e}")))?;
        let download = TempDownload::new(dir, DOWNLOAD_NAME);

        println!("\nDownloading video...");
        println!("Download location: {}", download.path.display());
        println!("URL: {url}");
        log::info!("Running {DOWNLOADER} for {url}");

        let status = Command::new(DOWNLOADER)
            .args(["-f", DOWNLOAD_FORMAT, "--no-playlist", "-o"])
            .arg(&download.path)
            .arg(url)
            .stdin(Stdio::null())
            .status();

        if interrupted.load(Ordering::SeqCst) {
            return Err(Error::InterruptRequested);
        }

        let status = status.map_err(|e| Error::SourceUnavailable(format!("failed to run {DOWNLOADER}: {e}")))?;
        if !status.success() {
            return Err(Error::SourceUnavailable(format!("{DOWNLOADER} exited with {status}")));
        }
        if !download.path.is_file() {
            return Err(Error::SourceUnavailable(format!(
                "{DOWNLOADER} did not produce {}",
                download.path.display()
            )));
        }

        println!("Downloaded: {}", download.path.display());
        Ok(download)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => log::info!("Removed temporary download {}", self.path.display()),
            Err(e) => log::warn!("Failed to remove temporary download {}: {e}", self.path.display()),
        }
    }
}

fn check_downloader() -> Result<()> {
    let available = Command::new(DOWNLOADER)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if available {
        Ok(())
    } else {
        Err(Error::SourceUnavailable(format!(
            "{DOWNLOADER} is not installed (install it with `pip install yt-dlp`)"
        )))
    }
}
