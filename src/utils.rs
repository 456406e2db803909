//! Small helpers for string shaping, durations and file system writes.
//!
//! - String truncation for logging and shortening for narration
//! - `HH:MM:SS` formatting for feed durations and chapter listings
//! - Output directory validation and crash-safe file replacement

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shorten text to at most `width` characters, breaking on a word boundary.
///
/// Whitespace is normalized first. When the text has to be cut, `placeholder`
/// is appended and counted towards `width`. A leading word longer than the
/// whole budget is cut mid-word rather than dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(shorten("alpha beta gamma delta", 14, "…"), "alpha beta…");
/// assert_eq!(shorten("abcdefghij", 5, "…"), "abcd…");
/// ```
pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let text = normalize_whitespace(text);
    if text.chars().count() <= width {
        return text;
    }

    let budget = width.saturating_sub(placeholder.chars().count());
    let mut out = String::new();
    let mut used = 0usize;
    for word in text.split(' ') {
        let cost = word.chars().count() + usize::from(!out.is_empty());
        if used + cost > budget {
            if out.is_empty() {
                out.extend(word.chars().take(budget));
            }
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += cost;
    }
    out.push_str(placeholder);
    out
}

/// Format a duration as `HH:MM:SS`, the form podcast clients expect.
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::File::create(&probe_path).await?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Output directory is writable");
    Ok(())
}

/// Replace `path` with `contents` so readers see either the old or the new
/// document, never a partial one.
///
/// The data is written and synced to a sibling `.tmp` file which is then
/// renamed over the target.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let tmp = sibling_tmp_path(path);
    let mut file = fs::File::create(&tmp).await?;
    if let Err(e) = async {
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await
    {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert_eq!(result, "ééé…(+14 bytes)");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
    }

    #[test]
    fn test_shorten_keeps_short_text() {
        assert_eq!(shorten("one  two\nthree", 50, "…"), "one two three");
    }

    #[test]
    fn test_shorten_breaks_on_words() {
        let out = shorten("alpha beta gamma delta", 14, "…");
        assert_eq!(out, "alpha beta…");
        assert!(out.chars().count() <= 14);
    }

    #[test]
    fn test_shorten_cuts_unbroken_text() {
        let text = "字".repeat(9_000);
        let out = shorten(&text, 100, " … end of excerpt.");
        assert!(out.starts_with(&"字".repeat(82)));
        assert!(out.ends_with(" … end of excerpt."));
        assert_eq!(out.chars().count(), 100);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_hms(Duration::from_millis(61_900)), "00:01:01");
        assert_eq!(format_hms(Duration::from_secs(3 * 3600 + 5)), "03:00:05");
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("nested").join("doc.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("docs").join("audio");
        ensure_writable_dir(&target).await.unwrap();
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }
}
