//! Text normalisation applied before any text reaches a model.
//!
//! PDF text layers and model replies carry artefacts that are invisible to a
//! human reader but confuse both extractors: Windows line endings, lone
//! carriage returns from old producers, byte-order marks and zero-width
//! characters pasted in from web forms. [`normalize`] removes them; it is a
//! pure, total function and idempotent.
//!
//! [`strip_json_fence`] handles the one reply quirk that matters here:
//! models wrapping a JSON answer in a ```` ```json ```` fence.

use once_cell::sync::Lazy;
use regex::Regex;

/// Remove line-ending and invisible-character artefacts.
///
/// Rules (applied in order):
/// 1. CRLF → LF, then any remaining lone CR → LF
/// 2. Strip invisible Unicode (BOM, zero-width space/joiners, word joiner,
///    soft hyphen)
pub fn normalize(text: &str) -> String {
    let s = normalise_line_endings(text);
    remove_invisible_chars(&s)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{00AD}'
            )
        })
        .collect()
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// Return the body of an outer ```` ```json ```` fence, or the input unchanged.
pub fn strip_json_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_JSON_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}
