use crate::cli::BuildArgs;
use crate::config::ProjectConfig;
use crate::project;
use crate::write::{WriteOptions, apply_generated_files};
use colored::Colorize;

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let project = ProjectConfig::load(args.config)?;
    let compiled = project::compile(&project)?;

    let placeholders = compiled.placeholder_count();
    if placeholders > 0 {
        eprintln!(
            "{} {placeholders} statement(s) could not be compiled and were written as comments; see `mapperc list`",
            "warning:".yellow().bold()
        );
    }

    let files = compiled.files();
    let summary = apply_generated_files(
        &files,
        WriteOptions {
            dry_run: args.dry_run,
            check: args.check,
        },
    )?;

    tracing::info!(
        dialect = %project.family,
        documents = files.len(),
        changed = summary.changed.len(),
        written = summary.written.len(),
        placeholders,
        "build finished"
    );
    if summary.changed.is_empty() {
        println!("{}", "mapper documents are up to date".dimmed());
    }

    Ok(())
}
