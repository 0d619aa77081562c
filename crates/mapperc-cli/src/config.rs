use mapperc::{CompilerConfig, DatabaseFamily, LikeBinding};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_dir: PathBuf,
    pub file: ConfigFile,
    pub family: DatabaseFamily,
}

impl ProjectConfig {
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        let mut file = ConfigFile::parse(&raw).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e}",
                config_path.display()
            )
        })?;

        file.expand_env()?;
        file.validate()?;
        let family = file
            .dialect
            .parse::<DatabaseFamily>()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            config_dir,
            file,
            family,
        })
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// Database family name, e.g. `postgres` or `sqlserver2005`.
    pub dialect: String,
    /// Output directory for mapper documents.
    pub out: String,

    #[serde(default)]
    pub compiler: CompilerSection,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// `[compiler]` overrides; anything left out keeps the compiler default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerSection {
    pub escape_char: Option<String>,
    /// `bind` or `concat`.
    pub like_binding: Option<String>,
    pub count_suffix: Option<String>,
    pub dynamic_sort: Option<bool>,
    pub derive_count: Option<bool>,
    pub default_alias: Option<String>,
    pub simple_statements: Option<bool>,
    pub database_id: Option<bool>,
}

impl CompilerSection {
    pub fn to_config(&self) -> anyhow::Result<CompilerConfig> {
        let mut config = CompilerConfig::new();

        if let Some(escape) = &self.escape_char {
            let mut chars = escape.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                anyhow::bail!("compiler.escape_char must be a single character, got {escape:?}");
            };
            config = config.with_escape_char(c);
        }
        if let Some(binding) = &self.like_binding {
            let binding = match binding.as_str() {
                "bind" => LikeBinding::Bind,
                "concat" => LikeBinding::Concat,
                other => anyhow::bail!("compiler.like_binding must be bind or concat, got {other}"),
            };
            config = config.with_like_binding(binding);
        }
        if let Some(suffix) = &self.count_suffix {
            config = config.with_count_suffix(suffix.as_str());
        }
        if let Some(enabled) = self.dynamic_sort {
            config = config.with_dynamic_sort(enabled);
        }
        if let Some(enabled) = self.derive_count {
            config = config.with_derived_count(enabled);
        }
        if let Some(alias) = &self.default_alias {
            config = config.with_default_alias(alias.as_str());
        }
        if let Some(enabled) = self.simple_statements {
            config = config.with_simple_statements(enabled);
        }
        if let Some(enabled) = self.database_id {
            config = config.with_database_id(enabled);
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Fully qualified type name; defaults to `name`.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub table: String,
    pub schema: Option<String>,
    pub alias: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    /// Column name; defaults to the snake_case property name.
    pub column: Option<String>,
    #[serde(rename = "type", default = "default_property_type")]
    pub type_name: String,
    /// `assigned`, `identity` or `sequence`.
    pub id: Option<String>,
    pub sequence: Option<String>,
    #[serde(default)]
    pub not_null: bool,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub type_handler: Option<String>,
    /// Components of an embedded value.
    #[serde(default)]
    pub components: Vec<PropertyConfig>,
    pub collection: Option<CollectionConfig>,
}

fn default_property_type() -> String {
    "other".to_string()
}

/// Join table of a to-many property.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    pub table: Option<String>,
    pub owner_column: Option<String>,
    pub inverse_column: Option<String>,
}

/// To-one association reachable through an optional join.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    /// Association property name.
    pub name: String,
    /// Target entity (by `name`).
    pub entity: String,
    /// Join alias; defaults to the association name.
    pub alias: Option<String>,
    pub on: Vec<JoinColumns>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinColumns {
    pub joined: String,
    pub owner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Entity the repository manages.
    pub entity: String,
    /// Glob patterns of repository definitions (`.json` or `.toml`).
    pub files: Vec<String>,
}

impl ConfigFile {
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn expand_env(&mut self) -> anyhow::Result<()> {
        self.dialect = expand_env_vars(&self.dialect)?;
        self.out = expand_env_vars(&self.out)?;

        for e in &mut self.entities {
            if let Some(schema) = e.schema.as_mut() {
                *schema = expand_env_vars(schema)?;
            }
        }

        for r in &mut self.repositories {
            for f in &mut r.files {
                *f = expand_env_vars(f)?;
            }
        }

        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.version.trim() != "1" {
            anyhow::bail!("unsupported config version: {}", self.version);
        }
        if self.out.trim().is_empty() {
            anyhow::bail!("out must not be empty");
        }
        if self.repositories.is_empty() {
            anyhow::bail!("at least one [[repositories]] entry is required");
        }

        let mut seen = std::collections::HashSet::<&str>::new();
        for e in &self.entities {
            if e.name.trim().is_empty() {
                anyhow::bail!("entities.name must not be empty");
            }
            if !seen.insert(e.name.as_str()) {
                anyhow::bail!("duplicate entities.name: {}", e.name);
            }
            if e.table.trim().is_empty() {
                anyhow::bail!("entities.table must not be empty (entity: {})", e.name);
            }
        }

        for r in &self.repositories {
            if !seen.contains(r.entity.as_str()) {
                anyhow::bail!("repositories.entity refers to unknown entity: {}", r.entity);
            }
            if r.files.is_empty() {
                anyhow::bail!("repositories.files must not be empty (entity: {})", r.entity);
            }
        }

        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    expand_vars(input, |key| std::env::var(key).ok())
}

/// Replace every `${KEY}` in `input` with `lookup(KEY)`.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                anyhow::bail!("unterminated env var reference: ${{{key}");
            }
            if key.is_empty() {
                anyhow::bail!("invalid env var reference: ${{}}");
            }

            let v = lookup(&key)
                .ok_or_else(|| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
            out.push_str(&v);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}
