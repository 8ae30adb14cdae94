//! Provider path normalization and media-extension filtering.
//!
//! Provider paths are compared constantly (discovery dedup, source lookup,
//! scan payloads), so every path is normalized before storage or compare:
//! leading slash, no trailing slash, collapsed duplicate separators.
//! Comparison is additionally case-insensitive because the provider's
//! filesystem is.

use crate::defaults::VIDEO_EXTENSIONS;

/// Normalize a folder or file path: trim whitespace, ensure a single
/// leading `/`, drop trailing and duplicate slashes. Idempotent.
pub fn normalize_path(input: &str) -> String {
    let trimmed = input.trim();
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push('/');
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Case-insensitive equality of two normalized-on-the-fly paths.
pub fn paths_equal(a: &str, b: &str) -> bool {
    normalize_path(a).eq_ignore_ascii_case(&normalize_path(b))
}

/// Whether a path carries a supported video extension.
pub fn is_video_path(path: &str) -> bool {
    match path.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Final path segment, used as the display filename.
pub fn filename_from_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Truncate a string to at most `max_chars` characters, respecting
/// char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_variants_collapse() {
        assert_eq!(normalize_path("/A/B/"), "/A/B");
        assert_eq!(normalize_path("/A//B"), "/A/B");
        assert_eq!(normalize_path("A/B"), "/A/B");
        assert_eq!(normalize_path("  /A/B  "), "/A/B");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["/A/B/", "A//B///C", "", "/", "x"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once);
        }
    }

    #[test]
    fn normalize_empty_is_root() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("///"), "/");
    }

    #[test]
    fn paths_equal_ignores_case_and_slashes() {
        assert!(paths_equal("/Footage/Day1/", "/footage/day1"));
        assert!(paths_equal("footage", "/FOOTAGE"));
        assert!(!paths_equal("/footage", "/footage/day1"));
    }

    #[test]
    fn video_extension_filter() {
        assert!(is_video_path("/clips/a.mp4"));
        assert!(is_video_path("/clips/A.MOV"));
        assert!(is_video_path("/clips/b.mxf"));
        assert!(is_video_path("/clips/c.mkv"));
        assert!(!is_video_path("/clips/readme.txt"));
        assert!(!is_video_path("/clips/noext"));
        assert!(!is_video_path("/clips/archive.avi"));
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(filename_from_path("/a/b/clip.mp4"), "clip.mp4");
        assert_eq!(filename_from_path("clip.mp4"), "clip.mp4");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        // Multibyte: must not split inside a code point.
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
