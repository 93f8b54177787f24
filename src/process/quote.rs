//! Quoting for every string that crosses into a shell, AppleScript or
//! property-list context.
//!
//! Command lines are always assembled from argument lists and rendered
//! here, never by interpolating raw strings.

use shlex::QuoteError;

/// Render an argument list as a single POSIX shell command line
pub fn shell_join<'a, I>(words: I) -> Result<String, QuoteError>
where
    I: IntoIterator<Item = &'a str>,
{
    shlex::try_join(words)
}

/// Render `text` as a double-quoted AppleScript string literal
pub fn applescript_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Escape `text` for use as XML character data
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
