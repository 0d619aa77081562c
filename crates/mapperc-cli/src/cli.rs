use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "mapperc.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Init,
    Build,
    List,
    Explain,
    Dialects,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Init(InitArgs),
    Build(BuildArgs),
    List(ListArgs),
    Explain(ExplainArgs),
    Dialects,
}

#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub config: PathBuf,
    pub dry_run: bool,
    pub check: bool,
}

#[derive(Debug, Clone)]
pub struct ListArgs {
    pub config: PathBuf,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExplainArgs {
    pub config: PathBuf,
    pub namespace: String,
    pub id: String,
    /// JSON object the statement is previewed with.
    pub params: Option<String>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    let rest = it.map(|s| s.as_str());
    match first.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help(HelpTopic::Root)),
        "init" => parse_init(rest),
        "build" => parse_build(rest),
        "list" => parse_list(rest),
        "explain" => parse_explain(rest),
        "dialects" => parse_dialects(rest),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

/// Consume `--config <FILE>` / `--config=<FILE>`; returns whether `token` was one.
fn take_config<'a>(
    token: &str,
    it: &mut impl Iterator<Item = &'a str>,
    config: &mut PathBuf,
) -> anyhow::Result<bool> {
    if token == "--config" {
        let Some(v) = it.next() else {
            anyhow::bail!("--config requires a value");
        };
        *config = PathBuf::from(v);
        return Ok(true);
    }
    if let Some(v) = token.strip_prefix("--config=") {
        *config = PathBuf::from(v);
        return Ok(true);
    }
    Ok(false)
}

fn parse_init<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);

    while let Some(token) = it.next() {
        if take_config(token, &mut it, &mut config)? {
            continue;
        }
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Init)),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Init(InitArgs { config }))
}

fn parse_build<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut dry_run = false;
    let mut check = false;

    while let Some(token) = it.next() {
        if take_config(token, &mut it, &mut config)? {
            continue;
        }
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Build)),
            "--dry-run" => dry_run = true,
            "--check" => check = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if dry_run && check {
        anyhow::bail!("--dry-run and --check cannot be combined");
    }

    Ok(Command::Build(BuildArgs {
        config,
        dry_run,
        check,
    }))
}

fn parse_list<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut namespace: Option<String> = None;

    while let Some(token) = it.next() {
        if take_config(token, &mut it, &mut config)? {
            continue;
        }
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::List)),
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other if namespace.is_none() => namespace = Some(other.to_string()),
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    Ok(Command::List(ListArgs { config, namespace }))
}

fn parse_explain<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut params: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(token) = it.next() {
        if take_config(token, &mut it, &mut config)? {
            continue;
        }
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Explain)),
            "--params" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--params requires a value");
                };
                params = Some(v.to_string());
            }
            _ if token.starts_with("--params=") => {
                params = Some(token.trim_start_matches("--params=").to_string());
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => positional.push(other.to_string()),
        }
    }

    let [namespace, id] = <[String; 2]>::try_from(positional).map_err(|got| {
        anyhow::anyhow!(
            "expected `mapperc explain <NAMESPACE> <ID>`, got {} positional argument(s)",
            got.len()
        )
    })?;

    Ok(Command::Explain(ExplainArgs {
        config,
        namespace,
        id,
        params,
    }))
}

fn parse_dialects<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    match it.next() {
        None => Ok(Command::Dialects),
        Some("-h" | "--help") => Ok(Command::Help(HelpTopic::Dialects)),
        Some(other) => anyhow::bail!("unknown argument: {other}"),
    }
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
mapperc - compile repository query descriptions into mapper XML

USAGE:
  mapperc <COMMAND> [OPTIONS]

COMMANDS:
  init          Write a starter mapperc.toml
  build         Compile every repository and write mapper documents
  list          Show compiled statements
  explain       Show one statement and preview it with parameters
  dialects      Show supported database families

Run `mapperc <command> --help` for more."
            );
        }
        HelpTopic::Init => {
            println!(
                "\
USAGE:
  mapperc init [OPTIONS]

OPTIONS:
  --config <FILE>       Output config path (default: mapperc.toml)
  -h, --help            Print help"
            );
        }
        HelpTopic::Build => {
            println!(
                "\
USAGE:
  mapperc build [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: mapperc.toml)
  --dry-run             Print files that would change
  --check               Exit non-zero if output would change
  -h, --help            Print help"
            );
        }
        HelpTopic::List => {
            println!(
                "\
USAGE:
  mapperc list [NAMESPACE] [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: mapperc.toml)
  -h, --help            Print help"
            );
        }
        HelpTopic::Explain => {
            println!(
                "\
USAGE:
  mapperc explain <NAMESPACE> <ID> [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: mapperc.toml)
  --params <JSON>       Parameter object to preview the statement with
  -h, --help            Print help"
            );
        }
        HelpTopic::Dialects => {
            println!(
                "\
USAGE:
  mapperc dialects

Lists every database family with its databaseId, pagination idiom and key
generation support."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        std::iter::once("mapperc")
            .chain(tokens.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        let cmd = parse_args(&args(&[])).unwrap();
        assert!(matches!(cmd, Command::Help(HelpTopic::Root)));
    }

    #[test]
    fn parse_build_flags() {
        let cmd = parse_args(&args(&["build", "--config=conf/mapperc.toml", "--check"])).unwrap();
        let Command::Build(build) = cmd else {
            panic!("expected build");
        };
        assert_eq!(build.config, PathBuf::from("conf/mapperc.toml"));
        assert!(build.check);
        assert!(!build.dry_run);

        assert!(parse_args(&args(&["build", "--dry-run", "--check"])).is_err());
    }

    #[test]
    fn parse_explain_with_params() {
        let cmd = parse_args(&args(&[
            "explain",
            "com.example.UserMapper",
            "findById",
            "--params",
            r#"{"id": 1}"#,
        ]))
        .unwrap();
        let Command::Explain(explain) = cmd else {
            panic!("expected explain");
        };
        assert_eq!(explain.namespace, "com.example.UserMapper");
        assert_eq!(explain.id, "findById");
        assert_eq!(explain.params.as_deref(), Some(r#"{"id": 1}"#));
        assert_eq!(explain.config, PathBuf::from("mapperc.toml"));
    }

    #[test]
    fn explain_needs_namespace_and_id() {
        let err = parse_args(&args(&["explain", "UserMapper"])).unwrap_err();
        assert!(err.to_string().contains("got 1 positional"));
    }

    #[test]
    fn list_takes_an_optional_namespace() {
        let Command::List(list) = parse_args(&args(&["list", "UserMapper"])).unwrap() else {
            panic!("expected list");
        };
        assert_eq!(list.namespace.as_deref(), Some("UserMapper"));
        assert!(parse_args(&args(&["list", "A", "B"])).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(parse_args(&args(&["generate"])).is_err());
        assert!(matches!(
            parse_args(&args(&["dialects", "--help"])).unwrap(),
            Command::Help(HelpTopic::Dialects)
        ));
    }
}
