use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static CATEGORY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\(?(category|cat\.?|type|division)\s*[0-9a-z.]+\)?$").unwrap());

const EDGE_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '-', '*', '•', '"', '\''];

/// Collapse whitespace and trim surrounding punctuation. Case is preserved.
pub fn clean_value(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw, " ");
    let trimmed = collapsed
        .trim()
        .trim_matches(|c: char| EDGE_PUNCTUATION.contains(&c) || c.is_whitespace());

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split on `,` and `;` that are not nested in parentheses.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' | ';' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Accumulates hazard classes, folding case variants onto the first spelling seen.
#[derive(Debug, Default)]
pub struct HazardNormalizer {
    /// Maps lowercase form -> canonical spelling
    aliases: HashMap<String, String>,
}

impl HazardNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a `,`/`;` separated hazard list and add every entry.
    ///
    /// Separators inside parentheses do not split. A "Category 2" style
    /// fragment belongs to the entry before it: "Flammable liquids,
    /// Category 2" is the single class "Flammable liquids (Category 2)".
    pub fn add_list(&mut self, raw: &str) {
        let mut pending: Option<String> = None;

        for part in split_top_level(raw) {
            let Some(part) = clean_value(part) else {
                continue;
            };

            if CATEGORY_SUFFIX.is_match(&part) {
                if let Some(previous) = pending.as_mut() {
                    let suffix = part.trim_start_matches('(').trim_end_matches(')');
                    previous.push_str(&format!(" ({})", suffix));
                    continue;
                }
            }

            if let Some(previous) = pending.replace(part) {
                self.add(&previous);
            }
        }

        if let Some(last) = pending {
            self.add(&last);
        }
    }

    pub fn add(&mut self, raw: &str) {
        if let Some(value) = clean_value(raw) {
            self.aliases
                .entry(value.to_lowercase())
                .or_insert(value);
        }
    }

    pub fn into_classes(self) -> BTreeSet<String> {
        self.aliases.into_values().collect()
    }
}
