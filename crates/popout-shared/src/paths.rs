use std::io;
use std::path::PathBuf;

const HOME_ENV: &str = "POPOUT_HOME";

/// Get the popout data directory.
/// Checks POPOUT_HOME first so tests can redirect it, then defaults to ~/.popout
pub fn get_popout_dir() -> io::Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var(HOME_ENV) {
        if !custom_dir.trim().is_empty() {
            return Ok(PathBuf::from(custom_dir));
        }
    }

    let home = dirs::home_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Home directory not found")
    })?;
    Ok(home.join(".popout"))
}

/// Directory holding per-profile storage documents.
pub fn get_profile_dir(profile: &str) -> io::Result<PathBuf> {
    Ok(get_popout_dir()?
        .join("profiles")
        .join(sanitize_profile_name(profile)))
}

pub fn get_log_dir() -> io::Result<PathBuf> {
    Ok(get_popout_dir()?.join("logs"))
}

fn sanitize_profile_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "default".to_string()
    } else {
        out
    }
}
