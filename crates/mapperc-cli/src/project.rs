use crate::config::ProjectConfig;
use crate::entities::build_models;
use mapperc::{Document, RepositoryCompiler, RepositoryDefinition, StatementRegistry};
use std::path::{Path, PathBuf};

/// A mapper document and where it is written.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Every namespace of a project, compiled.
pub struct CompiledProject {
    pub documents: Vec<Document>,
    out_dir: PathBuf,
}

impl CompiledProject {
    pub fn document(&self, namespace: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.namespace == namespace)
    }

    pub fn files(&self) -> Vec<GeneratedFile> {
        self.documents
            .iter()
            .map(|document| GeneratedFile {
                path: self.out_dir.join(document_path(&document.namespace)),
                content: document.render(),
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.documents
            .iter()
            .flat_map(Document::all)
            .filter(|s| s.is_placeholder())
            .count()
    }
}

/// `com.example.UserMapper` -> `com/example/UserMapper.xml`
fn document_path(namespace: &str) -> PathBuf {
    PathBuf::from(format!("{}.xml", namespace.replace('.', "/")))
}

pub fn compile(project: &ProjectConfig) -> anyhow::Result<CompiledProject> {
    let config = project.file.compiler.to_config()?;
    let dialect = project.family.dialect();
    let models = build_models(&project.file.entities)?;
    let registry = StatementRegistry::new();

    for repository in &project.file.repositories {
        let entity = models.get(&repository.entity).ok_or_else(|| {
            anyhow::anyhow!("repositories.entity refers to unknown entity: {}", repository.entity)
        })?;
        let compiler = RepositoryCompiler::new(&config, dialect.as_ref(), entity);

        for path in expand_globs(project, &repository.files)? {
            let definition = read_definition(&path)?;
            compiler
                .compile(&definition, &registry)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                namespace = %definition.namespace,
                entity = %repository.entity,
                "compiled repository"
            );
        }
    }

    let documents = registry
        .namespaces()
        .iter()
        .filter_map(|namespace| registry.finalize(namespace))
        .collect();

    Ok(CompiledProject {
        documents,
        out_dir: project.resolve_path(&project.file.out),
    })
}

fn expand_globs(project: &ProjectConfig, patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let resolved = project.resolve_path(pattern);
        let resolved = resolved.to_string_lossy();
        let mut matched = false;
        for entry in glob::glob(&resolved)
            .map_err(|e| anyhow::anyhow!("invalid glob pattern {pattern}: {e}"))?
        {
            let path = entry.map_err(|e| anyhow::anyhow!("failed to read {pattern}: {e}"))?;
            if path.is_file() {
                files.push(path);
                matched = true;
            }
        }
        if !matched {
            tracing::warn!(pattern = %pattern, "repository pattern matched no files");
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn read_definition(path: &Path) -> anyhow::Result<RepositoryDefinition> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display())),
        Some("toml") => toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display())),
        _ => anyhow::bail!(
            "unsupported repository file {} (expected .json or .toml)",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Fresh scratch directory under the system temp dir.
    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mapperc-cli-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("repositories")).unwrap();
        dir
    }

    const CONFIG: &str = r#"
version = "1"
dialect = "h2"
out = "out"

[compiler]
simple_statements = false

[[entities]]
name = "User"
type = "com.example.User"
table = "t_user"
alias = "u"
properties = [
  { name = "id", type = "long", id = "identity" },
  { name = "firstName", type = "text", not_null = true },
  { name = "age", type = "int", not_null = true },
]

[[repositories]]
entity = "User"
files = ["repositories/*"]
"#;

    #[test]
    fn compiles_json_and_toml_definitions() {
        let dir = scratch("compile");
        std::fs::write(dir.join("mapperc.toml"), CONFIG).unwrap();
        std::fs::write(
            dir.join("repositories/user.json"),
            r#"{
  "namespace": "com.example.UserMapper",
  "methods": [
    { "name": "findByFirstName", "parameters": [{ "type": "String" }] }
  ]
}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("repositories/stats.toml"),
            r#"
namespace = "com.example.UserStats"

[[queries]]
method = "countAdults"
query = "SELECT COUNT(*) FROM t_user WHERE age >= :age"
result_type = "long"
parameters = [{ name = "age", type = "Integer" }]
"#,
        )
        .unwrap();

        let project = ProjectConfig::load(dir.join("mapperc.toml")).unwrap();
        let compiled = compile(&project).unwrap();

        let namespaces: Vec<&str> = compiled
            .documents
            .iter()
            .map(|d| d.namespace.as_str())
            .collect();
        assert_eq!(namespaces, vec!["com.example.UserMapper", "com.example.UserStats"]);
        assert_eq!(compiled.placeholder_count(), 0);

        let user = compiled.document("com.example.UserMapper").unwrap();
        assert!(
            user.statement("findByFirstName_String")
                .unwrap()
                .render()
                .contains("WHERE (u.first_name = #{p1})")
        );

        let files = compiled.files();
        assert_eq!(files[0].path, dir.join("out/com/example/UserMapper.xml"));
        assert!(files[1].content.contains("<select id=\"countAdults_Integer\""));
        assert!(files[1].content.contains("WHERE age >= #{age}"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = scratch("extension");
        std::fs::write(dir.join("mapperc.toml"), CONFIG).unwrap();
        std::fs::write(dir.join("repositories/user.yaml"), "namespace: x").unwrap();

        let project = ProjectConfig::load(dir.join("mapperc.toml")).unwrap();
        let err = compile(&project).err().unwrap();
        assert!(err.to_string().contains("expected .json or .toml"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn document_paths_follow_the_namespace() {
        assert_eq!(
            document_path("com.example.UserMapper"),
            PathBuf::from("com/example/UserMapper.xml")
        );
        assert_eq!(document_path("UserMapper"), PathBuf::from("UserMapper.xml"));
    }
}
