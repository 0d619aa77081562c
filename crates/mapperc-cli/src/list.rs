use crate::cli::ListArgs;
use crate::config::ProjectConfig;
use crate::project;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use mapperc::Statement;
use mapperc::statement::{ResultKind, StatementKind};

pub fn run(args: ListArgs) -> anyhow::Result<()> {
    let project = ProjectConfig::load(args.config)?;
    let compiled = project::compile(&project)?;

    let documents: Vec<_> = match &args.namespace {
        Some(namespace) => {
            let document = compiled
                .document(namespace)
                .ok_or_else(|| anyhow::anyhow!("unknown namespace: {namespace}"))?;
            vec![document]
        }
        None => compiled.documents.iter().collect(),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Namespace", "Id", "Kind", "Parameter type", "Result"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );

    for document in documents {
        for statement in document.all() {
            let (kind, result) = describe(statement);
            let kind_color = if statement.is_placeholder() {
                Color::Red
            } else {
                Color::Green
            };
            table.add_row(vec![
                Cell::new(&document.namespace).fg(Color::DarkGrey),
                Cell::new(statement.id()).fg(Color::Yellow),
                Cell::new(kind).fg(kind_color),
                Cell::new(statement.meta.parameter_type.as_deref().unwrap_or("")),
                Cell::new(result),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}

/// Element name and result column of a statement.
fn describe(statement: &Statement) -> (&'static str, String) {
    match &statement.kind {
        StatementKind::Select { result, .. } => {
            let result = match result {
                Some(ResultKind::Map(map)) => format!("resultMap {map}"),
                Some(ResultKind::Type(ty)) => format!("resultType {ty}"),
                None => String::new(),
            };
            ("select", result)
        }
        StatementKind::Insert { .. } => ("insert", String::new()),
        StatementKind::Update { .. } => ("update", String::new()),
        StatementKind::Delete { .. } => ("delete", String::new()),
        StatementKind::Fragment { .. } => ("sql", String::new()),
        StatementKind::ResultMap { type_name, mappings } => {
            ("resultMap", format!("{type_name} ({} columns)", mappings.len()))
        }
        StatementKind::Placeholder { reason } => ("unsupported", reason.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapperc::Fragment;
    use mapperc::statement::StatementMeta;

    #[test]
    fn describes_results_and_placeholders() {
        let select = Statement::new(
            StatementMeta::new("findAll"),
            StatementKind::Select {
                result: Some(ResultKind::Map("BaseResultMap".to_string())),
                body: Fragment::literal("SELECT * FROM t_user"),
            },
        );
        assert_eq!(describe(&select), ("select", "resultMap BaseResultMap".to_string()));

        let placeholder = Statement::placeholder("findByTagsContaining_String", "UnsupportedQueryShape");
        assert_eq!(
            describe(&placeholder),
            ("unsupported", "UnsupportedQueryShape".to_string())
        );
    }
}
