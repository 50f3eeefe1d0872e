//! Board ID generation
//!
//! IDs use the format `{6-char-hex}-board-{slug}`, e.g.
//! `019a3f-board-add-oauth`.

/// Generate a board ID from its goal
pub fn generate_id(goal: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    format!("{}-board-{}", hex_prefix, slugify(goal))
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { "goal".to_string() } else { slug }
}
