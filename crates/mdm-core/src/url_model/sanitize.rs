/// Longest file name Linux accepts, in bytes.
const NAME_MAX: usize = 255;

fn is_forbidden(c: char) -> bool {
    matches!(c, '/' | '\\' | '\0') || c.is_control()
}

/// Makes `name` safe to use as a single Linux path component.
///
/// Separators, NUL and control characters become `_` (runs collapse to one),
/// leading/trailing dots, spaces and underscores are trimmed, and the result
/// is cut to 255 bytes on a char boundary. Returns `None` when nothing usable
/// is left (empty, `.` or `..`).
pub fn sanitize_filename(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if is_forbidden(c) {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let result = &trimmed[..end];
    if result.is_empty() || result == "." || result == ".." {
        return None;
    }
    Some(result.to_string())
}
