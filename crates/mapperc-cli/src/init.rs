use crate::cli::InitArgs;
use std::path::Path;

const TEMPLATE: &str = r#"
version = "1"
# h2 | hsqldb | postgres | sqlite | mariadb | mysql | sqlserver | sqlserver2005 |
# oracle | oracle-legacy | db2 | derby | sybase | generic
dialect = "postgres"
out = "src/main/resources/mapper"

[compiler]
# escape_char = "\\"
# like_binding = "bind" # bind | concat
# count_suffix = "__count"
# dynamic_sort = true
# derive_count = true
# simple_statements = true
# database_id = false

[[entities]]
name = "User"
type = "com.example.domain.User"
table = "t_user"
alias = "u"
properties = [
  { name = "id", type = "long", id = "identity", java_type = "java.lang.Long" },
  { name = "name", type = "text", not_null = true },
  { name = "email", type = "text" },
  { name = "createdAt", type = "timestamp" },
]
# joins = [{ name = "department", entity = "Department", alias = "d", on = [{ joined = "id", owner = "department_id" }] }]

[[repositories]]
entity = "User"
# JSON or TOML files: { namespace, methods = [{ name, parameters }], queries = [{ method, query, parameters }] }
files = ["repositories/user/*.json"]
"#;

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    write_template(&args.config)
}

fn write_template(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
            })?;
        }
    }

    std::fs::write(path, TEMPLATE.trim_start_matches('\n'))
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;

    println!("wrote {}", path.display());
    Ok(())
}
