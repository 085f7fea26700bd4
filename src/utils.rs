//! Utility functions for filename/metadata sanitization and media file lookup

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Characters replaced with `_` in clip filenames
const UNSAFE_FILENAME_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '&'];

/// Characters stripped from metadata values before they reach an external tool
const UNSAFE_METADATA_CHARS: [char; 7] = ['\0', '$', '`', '\\', '\n', '\r', '\x1b'];

/// Maximum length (in characters) of a sanitized clip title
pub const MAX_CLIP_TITLE_LEN: usize = 100;

/// Maximum length (in characters) of a sanitized metadata value
pub const MAX_METADATA_LEN: usize = 200;

/// File extensions considered downloaded media, in lookup priority order
pub const MEDIA_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "webm", "avi", "mp3", "m4a"];

/// Filesystem timestamps are coarser than the system clock
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Strip characters that could be abused when a value is passed to an external tool
///
/// Removes NUL, `$`, backtick, backslash, CR, LF and ESC, then truncates to
/// [`MAX_METADATA_LEN`] characters.
///
/// # Examples
///
/// ```
/// use tea_dl::utils::sanitize_metadata;
///
/// assert_eq!(sanitize_metadata("Price: $5 `rm`"), "Price: 5 rm");
/// ```
pub fn sanitize_metadata(value: &str) -> String {
    value
        .chars()
        .filter(|c| !UNSAFE_METADATA_CHARS.contains(c))
        .take(MAX_METADATA_LEN)
        .collect()
}

/// Make a clip title safe for use as a filename component
///
/// Applies [`sanitize_metadata`], replaces `< > : " / \ | ? * &` with `_`, drops
/// remaining control characters, trims, and truncates to [`MAX_CLIP_TITLE_LEN`]
/// characters. An empty result becomes `"Untitled"`.
///
/// # Examples
///
/// ```
/// use tea_dl::utils::sanitize_clip_title;
///
/// assert_eq!(sanitize_clip_title("AC/DC: Live"), "AC_DC_ Live");
/// assert_eq!(sanitize_clip_title("   "), "Untitled");
/// ```
pub fn sanitize_clip_title(title: &str) -> String {
    let cleaned: String = sanitize_metadata(title)
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    let truncated: String = cleaned.trim().chars().take(MAX_CLIP_TITLE_LEN).collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        "Untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// Locate a downloaded media file in `dir`
///
/// When `title` is non-empty, the first file (by extension priority) whose name
/// contains one of the first three title words wins. When nothing matches and
/// `fresh_since` is set, any media file modified at or after that instant is
/// returned; without it there is no fallback. Unreadable or missing directories
/// yield `None`.
pub async fn find_downloaded_media(
    dir: &Path,
    title: &str,
    fresh_since: Option<SystemTime>,
) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot scan output directory");
            return None;
        }
    };

    let mut files: Vec<(PathBuf, Option<SystemTime>)> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if metadata.is_file() {
            files.push((entry.path(), metadata.modified().ok()));
        }
    }
    files.sort();

    let words: Vec<String> = title
        .split_whitespace()
        .take(3)
        .map(sanitize_clip_title)
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && w != "untitled")
        .collect();

    let with_extension = |ext: &'static str| {
        files
            .iter()
            .filter(move |(p, _)| p.extension().and_then(|e| e.to_str()) == Some(ext))
    };

    if !words.is_empty() {
        for ext in MEDIA_EXTENSIONS {
            let hit = with_extension(ext).find(|(p, _)| {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                words.iter().any(|w| name.contains(w.as_str()))
            });
            if let Some((path, _)) = hit {
                return Some(path.clone());
            }
        }
    }

    let since = fresh_since?;
    let is_fresh = |modified: &Option<SystemTime>| {
        modified
            .and_then(|m| m.checked_add(MTIME_SLACK))
            .is_some_and(|m| m >= since)
    };
    MEDIA_EXTENSIONS.into_iter().find_map(|ext| {
        with_extension(ext)
            .find(|(_, modified)| is_fresh(modified))
            .map(|(path, _)| path.clone())
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn metadata_strips_shell_metacharacters() {
        assert_eq!(sanitize_metadata("a$b`c\\d\ne\rf\x1bg\0h"), "abcdefgh");
    }

    #[test]
    fn metadata_is_truncated() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_metadata(&long).chars().count(), MAX_METADATA_LEN);
    }

    #[test]
    fn clip_title_replaces_filesystem_unsafe_characters() {
        assert_eq!(sanitize_clip_title(r#"a<b>c:d"e/f|g?h*i&j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn clip_title_removes_control_characters_and_trims() {
        assert_eq!(sanitize_clip_title("  Intro\t\u{7}  "), "Intro");
    }

    #[test]
    fn clip_title_falls_back_to_untitled() {
        assert_eq!(sanitize_clip_title(""), "Untitled");
        assert_eq!(sanitize_clip_title("$$$"), "Untitled");
    }

    #[test]
    fn clip_title_is_truncated_on_char_boundaries() {
        let long = "é".repeat(150);
        let title = sanitize_clip_title(&long);
        assert_eq!(title.chars().count(), MAX_CLIP_TITLE_LEN);
    }

    #[tokio::test]
    async fn find_media_prefers_title_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Another Song.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("My Great Mix.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = find_downloaded_media(dir.path(), "Great Mix 2024", None).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "My Great Mix.mp4");
    }

    #[tokio::test]
    async fn find_media_falls_back_to_fresh_media_file() {
        let dir = tempdir().unwrap();
        let since = SystemTime::now();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();
        std::fs::write(dir.path().join("track.mp3"), b"").unwrap();

        let found = find_downloaded_media(dir.path(), "unrelated", Some(since))
            .await
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "track.mp3");
    }

    #[tokio::test]
    async fn find_media_fallback_skips_files_older_than_the_attempt() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("earlier job.mp4");
        std::fs::write(&stale, b"").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let found = find_downloaded_media(dir.path(), "unrelated", Some(SystemTime::now())).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_media_without_fallback_needs_a_title_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("other job.mp4"), b"").unwrap();

        assert!(find_downloaded_media(dir.path(), "unrelated", None).await.is_none());
        let found = find_downloaded_media(dir.path(), "Other Mix", None).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "other job.mp4");
    }

    #[tokio::test]
    async fn find_media_returns_none_for_missing_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(find_downloaded_media(&missing, "x", Some(SystemTime::now())).await.is_none());
    }

    #[tokio::test]
    async fn find_media_ignores_non_media_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"").unwrap();
        assert!(find_downloaded_media(dir.path(), "", Some(SystemTime::now())).await.is_none());
    }
}
