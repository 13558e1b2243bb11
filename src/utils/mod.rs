// complete-restore/src/utils/mod.rs
use std::io::IsTerminal;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `verbose`. When `RESTORE_LOG_FILE` is set, output goes
/// to that file (appended) instead of stdout.
pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_file = std::env::var_os("RESTORE_LOG_FILE").and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = match log_file {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init(),
        None => builder
            .with_ansi(std::io::stdout().is_terminal())
            .with_writer(std::io::stdout)
            .try_init(),
    };
}

/// Formats a byte count with binary units, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Current time as whole seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The first `max_chars` characters of `text`, on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Logs the layout of `root` as an indented tree at debug level.
pub fn log_directory_tree(root: &Path, max_depth: usize) {
    debug!("📂 Contents of {}:", root.display());
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        let indent = "  ".repeat(entry.depth());
        let marker = if entry.file_type().is_dir() { "📁" } else { "📄" };
        debug!("{}{} {}", indent, marker, entry.file_name().to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("INSERT INTO t", 6), "INSERT");
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("ééé", 2), "éé");
    }
}
