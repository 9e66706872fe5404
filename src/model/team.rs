//! Team records, consumed but never managed by the engine.

/// A team, as far as the engine cares: identity plus an optional Team-scope
/// scheme override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub scheme_id: Option<String>,
    pub create_at: i64,
    pub delete_at: i64,
}
