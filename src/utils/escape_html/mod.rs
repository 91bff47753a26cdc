use std::borrow::Cow;

/// Get the HTML entity for a special character.
#[inline]
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

/// Escapes HTML special characters, for both text content and attribute values.
///
/// Returns the input untouched when nothing needs escaping.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| escape_char(c).is_some()) {
        return Cow::Borrowed(s);
    }

    let mut escaped = String::with_capacity(s.len() + s.len() / 8);

    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => escaped.push_str(entity),
            None => escaped.push(c),
        }
    }

    Cow::Owned(escaped)
}
