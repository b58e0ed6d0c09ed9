//! Label matching rules shared by lookups and deletes.

/// Prefix some callers leave on labels and filenames (raw callback tokens).
pub const CATEGORY_PREFIX: &str = "category_";

/// Strip a single leading `category_` token, if present.
pub fn strip_category_prefix(value: &str) -> &str {
    value.strip_prefix(CATEGORY_PREFIX).unwrap_or(value)
}

/// Canonical form used for label equality: trimmed, lowercased, `ё` folded to `е`.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace('ё', "е")
}

/// Equality under `normalize_label`.
pub fn labels_match(a: &str, b: &str) -> bool {
    normalize_label(a) == normalize_label(b)
}

/// Case-insensitive substring test used by free-text label search.
pub fn label_contains(label: &str, query: &str) -> bool {
    label.to_lowercase().contains(&query.to_lowercase())
}
