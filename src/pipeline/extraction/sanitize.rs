/// Punctuation kept in extracted text besides letters, digits and whitespace.
/// Covers statute and paragraph references, currency, and typographic quotes.
const KEPT_PUNCTUATION: &str = ".,;:!?-/()[]+=%#@&$'\"*_§¶©®€£\u{2013}\u{2014}\u{2018}\u{2019}\u{201C}\u{201D}";

fn is_kept(c: char) -> bool {
    c.is_alphanumeric() || KEPT_PUNCTUATION.contains(c)
}

/// Normalize extracted text before it travels downstream.
///
/// Control characters and unlisted symbols are dropped, runs of spaces and
/// tabs inside a line collapse to one space, and blank lines disappear.
pub fn sanitize_extracted_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let mut cleaned = String::with_capacity(line.len());
        let mut pending_space = false;
        for c in line.chars() {
            if c.is_whitespace() {
                pending_space = !cleaned.is_empty();
            } else if is_kept(c) {
                if pending_space {
                    cleaned.push(' ');
                    pending_space = false;
                }
                cleaned.push(c);
            }
        }
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&cleaned);
    }
    out
}
