//! Small HTML text helpers shared by routing, presentation and facet rendering.

use regex::Regex;
use std::sync::LazyLock;

/// Inline tags that survive in highlight snippets.
static ALLOWED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"</?(?:em|span)(?:\s+class="[\w\s-]*")?\s*>"#).expect("static tag pattern")
});

/// Escape HTML special characters.
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Encode a taxonomy term the way the index stores term names (`&` -> `&amp;`, ...).
///
/// Backslash escapes are resolved first so `R\&D` and `R&D` encode the same.
pub fn encode_term(term: &str) -> String {
    escape(&strip_slashes(term))
}

/// Decode a stored term name back into display text.
pub fn decode_term(term: &str) -> String {
    strip_slashes(&decode_entities(term))
}

/// Decode the named entities [`escape`] produces plus numeric references.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let decoded = candidate.find(';').and_then(|end| {
            let entity = &candidate[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| {
                        entity
                            .strip_prefix('#')
                            .and_then(|dec| dec.parse::<u32>().ok())
                    })
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Resolve C-style backslash escapes (`\n`, `\t`, `\\`); a backslash before any other
/// character is dropped.
pub fn strip_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}

/// Escape everything except `<em>` and `<span>` tags (optionally with a class attribute).
pub fn escape_except_emphasis(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for tag in ALLOWED_TAG.find_iter(s) {
        out.push_str(&escape(&s[last..tag.start()]));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&escape(&s[last..]));

    out
}
