use crate::project::GeneratedFile;
use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub dry_run: bool,
    pub check: bool,
}

#[derive(Debug, Default)]
pub struct WriteSummary {
    pub changed: Vec<PathBuf>,
    pub written: Vec<PathBuf>,
}

pub fn apply_generated_files(
    files: &[GeneratedFile],
    opts: WriteOptions,
) -> anyhow::Result<WriteSummary> {
    let mut files = files.to_vec();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut summary = WriteSummary::default();

    for f in &files {
        let existing = std::fs::read_to_string(&f.path).ok();
        if existing.as_deref() != Some(f.content.as_str()) {
            summary.changed.push(f.path.clone());
        }
    }

    if opts.dry_run {
        for p in &summary.changed {
            println!("{} {}", "would write".yellow(), p.display());
        }
        return Ok(summary);
    }

    if opts.check {
        if !summary.changed.is_empty() {
            for p in &summary.changed {
                eprintln!("{} {}", "stale".red(), p.display());
            }
            anyhow::bail!("mapper documents are out of date; run `mapperc build`");
        }
        return Ok(summary);
    }

    for f in &files {
        if !summary.changed.contains(&f.path) {
            continue;
        }
        write_atomic(&f.path, &f.content)?;
        tracing::debug!(path = %f.path.display(), bytes = f.content.len(), "wrote mapper document");
        summary.written.push(f.path.clone());
    }

    for p in &summary.written {
        println!("{} {}", "wrote".green(), p.display());
    }

    Ok(summary)
}

/// Write to a sibling `.tmp` file, then rename it over `path`.
fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let tmp = tmp_path(path);
    std::fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))
}

/// `User.xml` -> `User.xml.tmp`
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mapperc-write-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file(path: PathBuf, content: &str) -> GeneratedFile {
        GeneratedFile {
            path,
            content: content.to_string(),
        }
    }

    #[test]
    fn writes_only_changed_files() {
        let dir = scratch("changed");
        let same = dir.join("a/Same.xml");
        std::fs::create_dir_all(dir.join("a")).unwrap();
        std::fs::write(&same, "<mapper/>").unwrap();
        let fresh = dir.join("b/Fresh.xml");

        let files = vec![file(fresh.clone(), "<mapper/>"), file(same.clone(), "<mapper/>")];
        let summary = apply_generated_files(
            &files,
            WriteOptions {
                dry_run: false,
                check: false,
            },
        )
        .unwrap();

        assert_eq!(summary.written, vec![fresh.clone()]);
        assert_eq!(std::fs::read_to_string(&fresh).unwrap(), "<mapper/>");
        assert!(!tmp_path(&fresh).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn check_fails_on_stale_output_and_dry_run_writes_nothing() {
        let dir = scratch("check");
        let target = dir.join("Stale.xml");
        let files = vec![file(target.clone(), "<mapper/>")];

        let err = apply_generated_files(
            &files,
            WriteOptions {
                dry_run: false,
                check: true,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of date"));

        let summary = apply_generated_files(
            &files,
            WriteOptions {
                dry_run: true,
                check: false,
            },
        )
        .unwrap();
        assert_eq!(summary.changed, vec![target.clone()]);
        assert!(summary.written.is_empty());
        assert!(!target.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn tmp_path_keeps_the_extension() {
        assert_eq!(tmp_path(Path::new("out/User.xml")), PathBuf::from("out/User.xml.tmp"));
        assert_eq!(tmp_path(Path::new("out/README")), PathBuf::from("out/README.tmp"));
    }
}
