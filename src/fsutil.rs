use std::path::PathBuf;

/// Normalize a data directory path: default to `./data` and make absolute.
#[must_use]
pub fn normalize_data_dir(dir: Option<&str>) -> PathBuf {
    let raw = match dir {
        Some(s) if !s.trim().is_empty() => PathBuf::from(s),
        _ => PathBuf::from("data"),
    };
    if raw.is_absolute() {
        raw
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(raw)
    }
}
