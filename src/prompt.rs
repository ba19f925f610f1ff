use std::io;

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;

use crate::video_extraction::{RenderConfig, DEFAULT_WIDTH, FALLBACK_FPS};

/// `y`/`yes` and `n`/`no` in any case; blank input takes `default`.
pub fn parse_yes_no(text: &str, default: bool) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Positive character count; blank input takes [`DEFAULT_WIDTH`].
pub fn parse_width(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return Some(DEFAULT_WIDTH);
    }
    text.parse::<u32>().ok().filter(|&w| w > 0)
}

/// Playback rate; blank or `0` keeps the video's own rate.
pub fn parse_fps(text: &str, native: f64) -> Option<f64> {
    let text = text.trim();
    let requested = if text.is_empty() { 0.0 } else { text.parse::<f64>().ok()? };

    if !requested.is_finite() || requested < 0.0 {
        return None;
    }
    if requested > 0.0 {
        return Some(requested);
    }
    Some(effective_native_fps(native))
}

pub fn effective_native_fps(native: f64) -> f64 {
    if native.is_finite() && native > 0.0 {
        native
    } else {
        FALLBACK_FPS
    }
}

pub fn ask_source() -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter video path or YouTube URL")
        .validate_with(|s: &String| {
            if s.trim().is_empty() {
                Err("a path or URL is required")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .map(|s| s.trim().to_string())
        .context("reading video path")
}

/// Asks for the remaining settings, in order: width, fps, color, contrast.
pub fn ask_render_config(native_fps: f64) -> Result<RenderConfig> {
    let theme = ColorfulTheme::default();

    let width = ask_parsed(&theme, "Enter terminal width", DEFAULT_WIDTH.to_string(), parse_width)?;

    let native = effective_native_fps(native_fps);
    let fps = ask_parsed(
        &theme,
        &format!("Enter FPS (0 = video FPS, {native:.2})"),
        "0".to_string(),
        |s| parse_fps(s, native),
    )?;

    let color = ask_parsed(&theme, "Enable color? (y/n)", "y".to_string(), |s| parse_yes_no(s, true))?;
    let enhance = ask_parsed(&theme, "Enable contrast enhancement? (y/n)", "y".to_string(), |s| {
        parse_yes_no(s, true)
    })?;

    Ok(RenderConfig {
        width,
        fps,
        color,
        enhance,
    })
}

/// True when a prompt gave up because the user pressed Ctrl+C.
pub fn was_interrupted(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|cause| cause.kind() == io::ErrorKind::Interrupted)
}

fn ask_parsed<T>(
    theme: &ColorfulTheme,
    prompt: &str,
    default: String,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    let text = Input::<String>::with_theme(theme)
        .with_prompt(prompt)
        .default(default)
        .validate_with(|s: &String| parse(s.as_str()).map(|_| ()).ok_or("invalid value"))
        .interact_text()
        .with_context(|| format!("reading answer to `{prompt}`"))?;

    parse(text.as_str()).with_context(|| format!("invalid answer to `{prompt}`: {text}"))
}
