//! cdconf command line
//!
//! Operator commands over a file-backed [`MergeEngine`]: bootstrap the
//! history, save edited files through the merge flow, inspect and verify the
//! history, and rewrite the live file after a persistence failure.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use cdconf_artifact::{ConfigDocument, ContentHash};
use cdconf_core::{EngineConfig, MergeEngine, MergeFlowError, UpdateCommand};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_USER: &str = "admin";

/// Exit code for failures the caller can fix by editing or rebasing
pub const EXIT_REJECTED: u8 = 2;

/// Exit code when history and live file may disagree
pub const EXIT_OPERATOR: u8 = 3;

fn user_arg() -> Arg {
    Arg::new("user")
        .long("user")
        .default_value(DEFAULT_USER)
        .help("Author recorded with the revision")
}

fn from_arg() -> Arg {
    Arg::new("from")
        .long("from")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Configuration file to read")
}

/// Command line definition
#[must_use]
pub fn cli() -> Command {
    Command::new("cdconf")
        .version(VERSION)
        .about("Versioned configuration store for a continuous-delivery server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine settings (TOML); paths inside are relative to the file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .subcommand(
            Command::new("init")
                .about("Commit the first revision")
                .arg(from_arg())
                .arg(user_arg()),
        )
        .subcommand(Command::new("show").about("Print the latest committed configuration"))
        .subcommand(
            Command::new("history")
                .about("List revisions, newest first")
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .default_value("20")
                        .value_parser(value_parser!(usize))
                        .help("Maximum number of revisions"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .default_value("text")
                        .value_parser(["text", "json"])
                        .help("Output format"),
                ),
        )
        .subcommand(
            Command::new("save")
                .about("Save an edited configuration, merging with changes since its base")
                .arg(
                    Arg::new("base")
                        .long("base")
                        .required(true)
                        .value_parser(value_parser!(ContentHash))
                        .help("Revision the edit started from"),
                )
                .arg(from_arg())
                .arg(user_arg())
                .arg(Arg::new("message").long("message").short('m').help("Commit message")),
        )
        .subcommand(Command::new("verify").about("Check every revision hash and parent link"))
        .subcommand(Command::new("rehydrate").about("Rewrite the live file from the latest revision"))
}

/// Parse `args` and run the selected command
///
/// # Errors
/// Returns error on invalid arguments or if the command fails
pub fn run<I, T>(args: I, out: &mut dyn Write) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cli().try_get_matches_from(args)?;
    execute(&matches, out)
}

/// Run the command selected in `matches`
///
/// # Errors
/// Returns error if the command fails
pub fn execute(matches: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let Some((name, args)) = matches.subcommand() else {
        bail!("no command given");
    };
    let engine = open_engine(args.get_one::<PathBuf>("config"))?;

    match name {
        "init" => init(&engine, args, out),
        "show" => show(&engine, out),
        "history" => history(&engine, args, out),
        "save" => save(&engine, args, out),
        "verify" => verify(&engine, out),
        "rehydrate" => rehydrate(&engine, out),
        other => bail!("unknown command '{other}'"),
    }
}

/// Process exit code for a failed command
#[must_use]
pub fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<MergeFlowError>() {
        Some(e) if e.requires_operator() => EXIT_OPERATOR,
        Some(
            MergeFlowError::PreValidation { .. }
            | MergeFlowError::MergeConflict { .. }
            | MergeFlowError::PostValidation { .. }
            | MergeFlowError::StaleBase { .. },
        ) => EXIT_REJECTED,
        _ => 1,
    }
}

fn open_engine(config_path: Option<&PathBuf>) -> anyhow::Result<MergeEngine> {
    let config = match config_path {
        Some(path) => {
            EngineConfig::load(path).with_context(|| format!("failed to load settings from {}", path.display()))?
        }
        None => EngineConfig::new(),
    };
    tracing::debug!(
        config_file = %config.config_file.display(),
        history_dir = %config.history_dir.display(),
        "opening engine"
    );
    MergeEngine::open(config).context("failed to open revision history")
}

fn read_document(engine: &MergeEngine, path: &Path) -> anyhow::Result<ConfigDocument> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    engine
        .codec()
        .parse(&text)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn required_path<'a>(args: &'a ArgMatches, id: &str) -> anyhow::Result<&'a PathBuf> {
    args.get_one::<PathBuf>(id)
        .with_context(|| format!("missing --{id}"))
}

fn user(args: &ArgMatches) -> &str {
    args.get_one::<String>("user").map_or(DEFAULT_USER, String::as_str)
}

fn init(engine: &MergeEngine, args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let document = read_document(engine, required_path(args, "from")?)?;
    let holder = engine.bootstrap(document, user(args))?;
    writeln!(out, "initialized {}", holder.hash())?;
    Ok(())
}

fn show(engine: &MergeEngine, out: &mut dyn Write) -> anyhow::Result<()> {
    let Some(holder) = engine.current()? else {
        bail!("no configuration committed yet");
    };
    out.write_all(holder.revision.content.as_bytes())?;
    Ok(())
}

fn history(engine: &MergeEngine, args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let limit = args.get_one::<usize>("limit").copied().unwrap_or(20);
    let json = args.get_one::<String>("output").is_some_and(|f| f == "json");

    for revision in engine.store().history(limit)? {
        if json {
            let line = serde_json::json!({
                "hash": revision.content_hash,
                "parent": revision.parent,
                "author": revision.author,
                "server_version": revision.server_version,
                "timestamp": revision.timestamp.to_rfc3339(),
                "message": revision.message,
            });
            writeln!(out, "{line}")?;
        } else {
            writeln!(
                out,
                "{} {} {} {}",
                revision.content_hash.short(),
                revision.timestamp.format("%Y-%m-%d %H:%M:%S"),
                revision.author,
                revision.message
            )?;
        }
    }
    Ok(())
}

fn save(engine: &MergeEngine, args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let base = *args.get_one::<ContentHash>("base").context("missing --base")?;
    let document = read_document(engine, required_path(args, "from")?)?;
    let user = user(args);

    let mut command = UpdateCommand::replace(base, user, document);
    if let Some(message) = args.get_one::<String>("message") {
        command = command.with_message(message);
    }

    match engine.execute(command, Vec::new(), user) {
        Ok(holder) => {
            writeln!(out, "saved {}", holder.hash())?;
            Ok(())
        }
        Err(MergeFlowError::MergeConflict { conflicts }) => {
            for region in &conflicts {
                writeln!(out, "{region}")?;
                out.write_all(region.to_marked_text().as_bytes())?;
            }
            Err(MergeFlowError::MergeConflict { conflicts }.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn verify(engine: &MergeEngine, out: &mut dyn Write) -> anyhow::Result<()> {
    engine.store().verify_chain()?;
    let revisions = engine.store().history(usize::MAX)?.len();
    writeln!(out, "ok: {revisions} revision(s)")?;
    Ok(())
}

fn rehydrate(engine: &MergeEngine, out: &mut dyn Write) -> anyhow::Result<()> {
    match engine.rehydrate()? {
        Some(hash) => writeln!(out, "rehydrated {hash}")?,
        None => writeln!(out, "nothing to rehydrate")?,
    }
    Ok(())
}
