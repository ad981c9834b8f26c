//! Local names for remote entities.

use std::fmt::Write;

/// Extension of per-item sidecar files.
pub const SIDECAR_SUFFIX: &str = ".metadata";

/// Percent-escape a title for use as a path component.
///
/// Letters, digits, `_.-~`, spaces, apostrophes and commas are kept as is;
/// every other byte of the UTF-8 encoding, `/` included, becomes `%XX`.
pub fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len());
    for byte in title.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'.' | b'-' | b'~' | b' ' | b'\'' | b',');
        if keep {
            escaped.push(byte as char);
        } else {
            let _ = write!(escaped, "%{:02X}", byte);
        }
    }
    escaped
}

/// Directory name of an album. The id keeps equal titles apart.
pub fn album_dirname(id: &str, title: &str) -> String {
    format!("{} - {}", escape_title(title), id)
}

/// Directory name of a collection.
pub fn collection_dirname(id: &str, title: &str) -> String {
    format!("{} - {}", escape_title(title), id)
}

/// Content file name of a photo.
pub fn photo_basename(id: &str, format: &str) -> String {
    format!("{}.{}", id, format)
}

pub fn sidecar_name(content_basename: &str) -> String {
    format!("{}{}", content_basename, SIDECAR_SUFFIX)
}

/// Digits needed to number `count` entries.
pub fn position_width(count: usize) -> usize {
    count.max(1).to_string().len()
}

/// Album link name: 1-based position, zero-padded to `width`, so a plain
/// alphanumeric sort reproduces the remote order.
pub fn positional_name(index: usize, width: usize, basename: &str) -> String {
    format!("{:0width$}_{}", index + 1, basename, width = width)
}

/// Whether `name` is a content file (not a sidecar) belonging to `id`.
pub fn is_content_of(name: &str, id: &str) -> bool {
    match name.strip_prefix(id) {
        Some(rest) => {
            !name.ends_with(SIDECAR_SUFFIX)
                && !rest.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn basename_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let path = without_fragment.split('?').next().unwrap_or(without_fragment);
    let path = match path.find("://") {
        Some(scheme_end) => {
            let after_scheme = &path[scheme_end + 3..];
            after_scheme.find('/').map(|i| &after_scheme[i..]).unwrap_or("")
        }
        None => path,
    };

    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_keeps_safe_characters() {
        assert_eq!(escape_title("Bob's Trip, 2015"), "Bob's Trip, 2015");
        assert_eq!(escape_title("a_b.c-d~e"), "a_b.c-d~e");
    }

    #[test]
    fn test_escape_encodes_unsafe_characters() {
        assert_eq!(escape_title("AC/DC"), "AC%2FDC");
        assert_eq!(escape_title("50%"), "50%25");
        assert_eq!(escape_title("Zürich"), "Z%C3%BCrich");
        assert_eq!(escape_title("a:b?"), "a%3Ab%3F");
    }

    #[test]
    fn test_dirnames_append_id() {
        assert_eq!(album_dirname("721", "Rome"), "Rome - 721");
        assert_eq!(collection_dirname("1-72", "Travel/2015"), "Travel%2F2015 - 1-72");
        assert_eq!(album_dirname("9", ""), " - 9");
    }

    #[test]
    fn test_positional_names() {
        assert_eq!(position_width(9), 1);
        assert_eq!(position_width(10), 2);
        assert_eq!(position_width(0), 1);
        assert_eq!(positional_name(0, 3, "5.jpg"), "001_5.jpg");
        assert_eq!(positional_name(99, 3, "5.jpg"), "100_5.jpg");
    }

    #[test]
    fn test_content_and_sidecar_names() {
        assert_eq!(photo_basename("5234", "jpg"), "5234.jpg");
        assert_eq!(sidecar_name("5234.jpg"), "5234.jpg.metadata");
    }

    #[test]
    fn test_is_content_of() {
        assert!(is_content_of("1234.mp4", "1234"));
        assert!(is_content_of("1234_orig.mov", "1234"));
        assert!(!is_content_of("1234.mp4.metadata", "1234"));
        assert!(!is_content_of("12345.mp4", "1234"));
        assert!(!is_content_of("999.mp4", "1234"));
    }

    #[test]
    fn test_basename_from_url() {
        assert_eq!(
            basename_from_url("https://cdn.example.com/v/1234_orig.mp4?s=abc#t").as_deref(),
            Some("1234_orig.mp4")
        );
        assert_eq!(basename_from_url("https://cdn.example.com/"), None);
        assert_eq!(basename_from_url("https://cdn.example.com"), None);
    }
}
