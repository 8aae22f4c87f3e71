//! Postgres access: CRM, staff, users, properties, and the row change feed.

pub mod activity;
pub mod changes;
pub mod clients;
pub mod health;
pub mod properties;
pub mod staff;
pub mod users;

/// `ILIKE` pattern matching `needle` anywhere, with wildcards in it escaped.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("rao"), "%rao%");
    }
}
