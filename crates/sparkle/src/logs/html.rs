use std::sync::LazyLock;

use regex::Regex;

static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").unwrap());

static LOG_TYPE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Log\s*Type:\s*(?:<[^>]*>\s*)*([A-Za-z0-9_.\-]+)").unwrap());

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));").unwrap());

/// Extract the log text of `log_type` from a YARN container log page.
///
/// Aggregated pages list several files, each introduced by a `Log Type: <name>`
/// marker and followed by a `<pre>` block. Live node manager pages for a single
/// file carry no marker, so the first `<pre>` block is used. Returns `None`
/// when the page has no log block at all.
pub fn extract_log_text(html: &str, log_type: &str) -> Option<String> {
    let markers: Vec<_> = LOG_TYPE_MARKER.captures_iter(html).collect();

    let block = if markers.is_empty() {
        PRE_BLOCK.captures(html)
    } else {
        let marker = markers
            .iter()
            .find(|caps| caps[1].eq_ignore_ascii_case(log_type))?;
        let start = marker.get(0).map_or(0, |m| m.end());
        PRE_BLOCK.captures(&html[start..])
    }?;

    Some(decode_entities(&block[1]))
}

/// Decode the HTML entities a log page escapes.
pub fn decode_entities(input: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(input, |caps: &regex::Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_owned())
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
