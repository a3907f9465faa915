use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: char = '…';

/// Make sheet-supplied text safe to print on one terminal line.
///
/// Control characters (including ESC, so no escape sequence can take effect)
/// are dropped; line breaks and tabs become single spaces.
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.chars()
            .filter_map(|c| match c {
                '\n' | '\r' | '\t' => Some(' '),
                c if c.is_control() => None,
                c => Some(c),
            })
            .collect(),
    )
}

/// Truncate or pad `s` to exactly `width` terminal columns.
///
/// Truncated text ends in `…`. A wide character that would straddle the
/// boundary is replaced by padding.
pub fn fit_width(s: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(s);
    if current <= width {
        let mut out = String::with_capacity(s.len() + (width - current));
        out.push_str(s);
        out.extend(std::iter::repeat(' ').take(width - current));
        return out;
    }

    if width == 0 {
        return String::new();
    }

    let budget = width - 1; // room for the ellipsis
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.extend(std::iter::repeat(' ').take(budget - used));
    out.push(ELLIPSIS);
    out
}
