//! Track title sanitization

/// Characters that are illegal in file names on at least one major filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn a track title into a filesystem-legal base name.
///
/// Illegal characters are removed, whitespace runs collapse to a single
/// space, and the result is trimmed. Every input maps to some legal name,
/// which may be empty; callers fall back to the track id in that case.
/// Distinct titles may sanitize to the same name.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
