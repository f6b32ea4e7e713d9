//! Natural-key normalization shared by every source
//!
//! All functions are idempotent: applying one twice yields the same string as applying
//! it once. Empty results come back as None so callers never build a blank dimension row.

/// Trim and collapse internal whitespace runs to a single space
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Title-case a single word, keeping separators such as '-' and '\''.
///
/// The word is lower-cased first and only the first character of each part is raised.
/// Uppercase expansions (`ﬁ` -> `FI`) keep their tail lower-cased so a second pass is a no-op.
fn title_word(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut start_of_part = true;
    for c in lower.chars() {
        if c.is_alphanumeric() {
            if start_of_part {
                let mut upper = c.to_uppercase();
                if let Some(first) = upper.next() {
                    out.push(first);
                }
                out.extend(upper.flat_map(char::to_lowercase));
            } else {
                out.push(c);
            }
            start_of_part = false;
        } else {
            out.push(c);
            start_of_part = c == '-' || c == '(' || c == '/';
        }
    }
    out
}

/// Place names (countries, cities): whitespace collapsed, title-cased
pub fn place_name(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    non_empty(
        collapsed
            .split(' ')
            .map(title_word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Room and listing type names: whitespace collapsed, lower-cased
pub fn type_name(raw: &str) -> Option<String> {
    non_empty(collapse_whitespace(raw).to_lowercase())
}

/// Currency codes: all whitespace removed, upper-cased
pub fn currency_code(raw: &str) -> Option<String> {
    non_empty(
        raw.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(|c| c.to_uppercase())
            .collect(),
    )
}

/// Free text kept as-is apart from whitespace
pub fn free_text(raw: &str) -> Option<String> {
    non_empty(collapse_whitespace(raw))
}
