use crate::cli::ExplainArgs;
use crate::config::ProjectConfig;
use crate::project;
use colored::Colorize;
use mapperc::{Document, Preview, Previewer, Statement};
use serde_json::Value;

pub fn run(args: ExplainArgs) -> anyhow::Result<()> {
    let project = ProjectConfig::load(args.config)?;
    let compiled = project::compile(&project)?;

    let document = compiled
        .document(&args.namespace)
        .ok_or_else(|| anyhow::anyhow!("unknown namespace: {}", args.namespace))?;
    let statement = document.statement(&args.id).ok_or_else(|| {
        anyhow::anyhow!(
            "no statement {} in {}; known ids: {}",
            args.id,
            args.namespace,
            document.ids().join(", ")
        )
    })?;

    println!("{}", format!("-- {} ({})", statement.id(), project.family).dimmed());
    println!("{}", statement.render());

    let Some(raw) = args.params else {
        return Ok(());
    };
    let params: Value = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {e}"))?;
    let preview = preview_statement(document, statement, &params)?;

    println!();
    println!("{}", "-- preview".dimmed());
    println!("{}", preview.sql.bold());
    for (i, value) in preview.parameters.iter().enumerate() {
        println!("  {} {value}", format!("${}", i + 1).cyan());
    }

    Ok(())
}

/// Resolve `statement` against `params`, with `<include>` targets from `document`.
fn preview_statement(
    document: &Document,
    statement: &Statement,
    params: &Value,
) -> anyhow::Result<Preview> {
    let Some(body) = statement.body() else {
        anyhow::bail!("statement {} has no SQL body to preview", statement.id());
    };

    let previewer = document
        .fragments()
        .into_iter()
        .fold(Previewer::new(), |previewer, (id, fragment)| {
            previewer.with_include(id, fragment)
        });
    Ok(previewer.preview(body, params)?)
}
