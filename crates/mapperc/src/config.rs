/// How wildcard-carrying LIKE parameters reach SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeBinding {
    /// `<bind>` a new parameter holding the escaped value plus `%` wildcards.
    #[default]
    Bind,
    /// `<bind>` only the escaped value and concatenate the wildcards in SQL.
    Concat,
}

/// Configuration for statement compilation.
///
/// Defaults match what most mapper projects expect: `\` as LIKE escape, wildcard binds,
/// `__count` suffix for derived count statements, dynamic sorting and derived counts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Escape character used in `LIKE ... ESCAPE` clauses.
    pub escape_char: char,
    /// How LIKE wildcards are applied.
    pub like_binding: LikeBinding,
    /// Suffix appended to a statement id for its derived count statement.
    pub count_suffix: String,
    /// Whether `Sort` parameters produce dynamic ORDER BY clauses.
    pub dynamic_sort: bool,
    /// Whether pageable statements get a derived count statement.
    pub derive_count: bool,
    /// Alias used for the root table instead of the entity alias.
    pub default_alias: Option<String>,
    /// Whether to emit the CRUD statements for the entity.
    pub simple_statements: bool,
    /// Whether statements carry the dialect's `databaseId`.
    pub database_id: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            escape_char: '\\',
            like_binding: LikeBinding::Bind,
            count_suffix: "__count".to_string(),
            dynamic_sort: true,
            derive_count: true,
            default_alias: None,
            simple_statements: true,
            database_id: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the LIKE escape character.
    pub fn with_escape_char(mut self, escape: char) -> Self {
        self.escape_char = escape;
        self
    }

    pub fn with_like_binding(mut self, binding: LikeBinding) -> Self {
        self.like_binding = binding;
        self
    }

    /// Set the suffix of derived count statement ids.
    pub fn with_count_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.count_suffix = suffix.into();
        self
    }

    pub fn with_dynamic_sort(mut self, enabled: bool) -> Self {
        self.dynamic_sort = enabled;
        self
    }

    pub fn with_derived_count(mut self, enabled: bool) -> Self {
        self.derive_count = enabled;
        self
    }

    pub fn with_default_alias(mut self, alias: impl Into<String>) -> Self {
        self.default_alias = Some(alias.into());
        self
    }

    pub fn with_simple_statements(mut self, enabled: bool) -> Self {
        self.simple_statements = enabled;
        self
    }

    pub fn with_database_id(mut self, enabled: bool) -> Self {
        self.database_id = enabled;
        self
    }

    /// Id of the derived count statement for `id`.
    pub fn count_id(&self, id: &str) -> String {
        format!("{id}{}", self.count_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = CompilerConfig::new()
            .with_escape_char('!')
            .with_like_binding(LikeBinding::Concat)
            .with_count_suffix("_cnt");
        assert_eq!(config.escape_char, '!');
        assert_eq!(config.like_binding, LikeBinding::Concat);
        assert_eq!(config.count_id("findAll"), "findAll_cnt");
        assert!(config.derive_count);
    }
}
