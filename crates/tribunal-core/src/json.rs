//! Tolerant extraction of a JSON object from free-form model output.

const FENCE: &str = "```";

/// Locate the JSON object in `text`.
///
/// Tries, in order: a fenced block tagged `json`, any fenced block whose body
/// starts with `{`, then a scan from the first `{` to its matching `}` that
/// skips braces inside double-quoted strings. Returns `None` when nothing
/// balanced is found.
pub fn extract_json(text: &str) -> Option<&str> {
    let blocks = fenced_blocks(text);

    if let Some(body) = blocks
        .iter()
        .filter(|(lang, _)| lang.eq_ignore_ascii_case("json"))
        .map(|(_, body)| body.trim())
        .find(|body| body.starts_with('{'))
    {
        return Some(body);
    }

    if let Some(body) = blocks
        .iter()
        .map(|(_, body)| body.trim())
        .find(|body| body.starts_with('{'))
    {
        return Some(body);
    }

    scan_object(text)
}

/// `(language tag, body)` for each complete fenced block.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let (lang, body_start) = match after_open.find('\n') {
            Some(nl) => (after_open[..nl].trim(), &after_open[nl + 1..]),
            None => break,
        };
        let Some(close) = body_start.find(FENCE) else {
            break;
        };
        blocks.push((lang, &body_start[..close]));
        rest = &body_start[close + FENCE.len()..];
    }
    blocks
}

fn scan_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
