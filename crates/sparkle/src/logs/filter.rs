use super::LogKind;

/// Section headers the batch service interleaves with the actual output.
const SEPARATORS: [(&str, LogKind); 3] = [
    ("stdout:", LogKind::Stdout),
    ("stderr:", LogKind::Stderr),
    ("yarn diagnostics:", LogKind::Diagnostics),
];

/// The section a separator line opens, if `line` is one.
pub(crate) fn separator_kind(line: &str) -> Option<LogKind> {
    let trimmed = line.trim();
    SEPARATORS
        .iter()
        .find(|(separator, _)| trimmed.eq_ignore_ascii_case(separator))
        .map(|(_, kind)| *kind)
}
