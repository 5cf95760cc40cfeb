/// Canonical form used to compare CSV headers: invisible characters removed,
/// whitespace collapsed, lower-cased, with spaces and hyphens folded to `_`.
pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    collapsed.replace('-', "_").to_ascii_lowercase()
}
