//! File name handling for caller supplied names and URL derived names.

use url::Url;

/// Name used when sanitizing leaves nothing.
pub const FALLBACK_FILE_NAME: &str = "file";

/// Sanitizes a caller supplied file name for use as a single path segment.
///
/// Trims surrounding whitespace and replaces path separators, the
/// characters `< > : " | ? *` and control characters with `_`. An empty
/// result becomes `file`.
///
/// ```
/// use chunkfetch_core::download::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name(" a/b:c.txt "), "a_b_c.txt");
/// assert_eq!(sanitize_file_name("   "), "file");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" => FALLBACK_FILE_NAME.to_string(),
        // A lone dot segment would resolve to the directory itself or its parent.
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

/// Derives a file name from the last non-empty path segment of `url`,
/// percent-decoded and sanitized.
#[must_use]
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rfind(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(last).ok()?;
    Some(sanitize_file_name(&decoded))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name_removes_invalid_chars() {
        assert_eq!(sanitize_file_name("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file:name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file*name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file?name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file\"name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_file_name("file<name>.pdf"), "file_name_.pdf");
        assert_eq!(sanitize_file_name("file|name.pdf"), "file_name.pdf");
    }

    #[test]
    fn test_sanitize_file_name_control_chars() {
        assert_eq!(sanitize_file_name("a\u{0}b\tc"), "a_b_c");
    }

    #[test]
    fn test_sanitize_file_name_blank_becomes_file() {
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name(" \n "), "file");
    }

    #[test]
    fn test_sanitize_file_name_preserves_valid_chars() {
        assert_eq!(sanitize_file_name("report (1).pdf"), "report (1).pdf");
        assert_eq!(sanitize_file_name("日本語.pdf"), "日本語.pdf");
    }

    #[test]
    fn test_sanitize_file_name_rewrites_dot_segments() {
        assert_eq!(sanitize_file_name("."), "_");
        assert_eq!(sanitize_file_name(".."), "__");
        assert_eq!(sanitize_file_name("../etc"), ".._etc");
    }

    #[test]
    fn test_file_name_from_url_decodes_last_segment() {
        let url = Url::parse("https://example.com/dir/my%20file.zip?x=1").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("my file.zip"));
    }

    #[test]
    fn test_file_name_from_url_skips_trailing_slash() {
        let url = Url::parse("https://example.com/dir/archive.tar/").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("archive.tar"));
    }

    #[test]
    fn test_file_name_from_url_none_for_root() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(file_name_from_url(&url), None);
    }

    #[test]
    fn test_file_name_from_url_encoded_separator_is_sanitized() {
        let url = Url::parse("https://example.com/a%2Fb.txt").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("a_b.txt"));
    }
}
