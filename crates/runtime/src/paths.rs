//! Locating browser binaries.
//!
//! Resolution order for each binary: explicit environment override, then
//! `PATH`, then platform-common install locations. The overrides exist for
//! environments where the packaged binaries are not on `PATH` (Nix,
//! containers, CI caches).

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment variable overriding the chromedriver executable.
pub const DRIVER_ENV: &str = "BIDI_CHROMEDRIVER";

/// Environment variable overriding the Chrome/Chromium executable.
pub const BROWSER_ENV: &str = "BIDI_CHROME";

/// Resolves the chromedriver executable.
///
/// # Errors
///
/// Returns [`Error::DriverNotFound`] if no candidate exists.
pub fn find_chromedriver() -> Result<PathBuf> {
    if let Some(path) = env_override(DRIVER_ENV) {
        return Ok(path);
    }

    if let Ok(path) = which::which("chromedriver") {
        return Ok(path);
    }

    for location in common_driver_locations() {
        if location.exists() {
            return Ok(location);
        }
    }

    Err(Error::DriverNotFound)
}

/// Resolves a Chrome/Chromium executable, if one can be found.
///
/// Used by the `paths` command for display and as an explicit binary hint;
/// chromedriver performs its own discovery when no hint is given.
pub fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = env_override(BROWSER_ENV) {
        return Some(path);
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    common_browser_locations().into_iter().find(|path| path.exists())
}

/// Returns the explicit binary override for launches, if set.
pub fn chrome_override() -> Option<PathBuf> {
    env_override(BROWSER_ENV)
}

fn env_override(var: &str) -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(var)?);
    path.exists().then_some(path)
}

#[cfg(not(windows))]
fn common_driver_locations() -> Vec<PathBuf> {
    ["/usr/local/bin/chromedriver", "/usr/bin/chromedriver", "/opt/homebrew/bin/chromedriver"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(windows)]
fn common_driver_locations() -> Vec<PathBuf> {
    [
        "C:\\Program Files\\chromedriver\\chromedriver.exe",
        "C:\\Program Files (x86)\\chromedriver\\chromedriver.exe",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(windows))]
fn common_browser_locations() -> Vec<PathBuf> {
    [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/opt/google/chrome/chrome",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(windows)]
fn common_browser_locations() -> Vec<PathBuf> {
    [
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
        "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}
