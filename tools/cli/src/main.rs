//! CredVault CLI - Command line interface for credential vault requests.
//!
//! Each invocation runs one request against one container and prints the
//! JSON response on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use credvault_common::Secret;
use credvault_crypto::KdfParams;
use credvault_vault::{
    FileCodec, Orchestrator, Request, RequestFilters, RequestedState, TargetKind, VaultCodec,
};

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "CredVault - Encrypted credential vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one request against a vault container.
    Run(RunArgs),

    /// Print shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    Group,
    Entry,
}

impl From<TargetArg> for TargetKind {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Group => TargetKind::Group,
            TargetArg::Entry => TargetKind::Entry,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    Create,
    Touch,
    Find,
    Delete,
}

impl From<StateArg> for RequestedState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Create => RequestedState::Create,
            StateArg::Touch => RequestedState::Touch,
            StateArg::Find => RequestedState::Find,
            StateArg::Delete => RequestedState::Delete,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Request document (JSON). Request flags below are ignored when set.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Path to the vault container.
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Container passphrase. Prompted for when absent.
    #[arg(long, env = "CREDVAULT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// KDF strength for new containers.
    #[arg(
        short,
        long,
        default_value = "interactive",
        value_parser = ["interactive", "moderate", "sensitive"]
    )]
    strength: String,

    /// Kind of node to act on.
    #[arg(short, long, value_enum)]
    target: Option<TargetArg>,

    /// Requested state.
    #[arg(long, value_enum)]
    state: Option<StateArg>,

    /// Entry title filter.
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    #[arg(long)]
    identifier: Option<String>,

    /// Node path filter, e.g. "/email/work".
    #[arg(long = "node-path")]
    node_path: Option<String>,

    #[arg(long)]
    url: Option<String>,

    /// Tags separated by "," or ";".
    #[arg(long)]
    tags: Option<String>,

    /// Report every match instead of the first.
    #[arg(long)]
    all: bool,

    /// Only look at direct children of the search root.
    #[arg(long)]
    no_recursive: bool,

    /// Treat filters as regular expressions (unanchored).
    #[arg(long)]
    regex: bool,

    /// Group name.
    #[arg(short, long)]
    group: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    /// Entry secret.
    #[arg(long, env = "CREDVAULT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[arg(long)]
    icon: Option<String>,

    /// Expiry time (RFC 3339).
    #[arg(long)]
    expires_at: Option<DateTime<Utc>>,

    /// Create the entry's group when it does not exist.
    #[arg(long)]
    always_create: bool,

    #[arg(long)]
    no_groups: bool,

    #[arg(long)]
    no_entries: bool,

    /// Omit secrets from the response.
    #[arg(long)]
    hide_secret: bool,

    /// Resolve and report without saving.
    #[arg(long)]
    dry_run: bool,

    /// Pretty-print the response.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging on stderr; stdout carries the response.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "credvault", &mut io::stdout());
            Ok(())
        }
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Secret> {
    let password = rpassword::prompt_password(prompt).context("Failed to read passphrase")?;
    Ok(Secret::new(password))
}

/// Build the request from a JSON document or from flags.
fn build_request(args: &RunArgs) -> Result<Request> {
    if let Some(file) = &args.request {
        let bytes = fs::read(file)
            .with_context(|| format!("Failed to read request {}", file.display()))?;
        let mut request: Request = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid request document {}", file.display()))?;
        if let Some(path) = &args.path {
            request.path = path.clone();
        }
        if let Some(passphrase) = &args.passphrase {
            request.passphrase = Secret::new(passphrase.as_str());
        }
        request.dry_run |= args.dry_run;
        return Ok(request);
    }

    let path = args
        .path
        .clone()
        .context("Either --path or --request is required")?;
    let passphrase = args
        .passphrase
        .as_deref()
        .map(Secret::new)
        .unwrap_or_default();

    let mut request = Request::new(path, passphrase);
    request.target = args.target.map(TargetKind::from);
    request.state = args.state.map(RequestedState::from);
    request.filters = RequestFilters {
        title_or_name: args.title.clone(),
        notes: args.notes.clone(),
        identifier: args.identifier.clone(),
        path: args.node_path.clone(),
        url: args.url.clone(),
        tags: args.tags.clone(),
    };
    request.first = !args.all;
    request.recursive = !args.no_recursive;
    request.regex = args.regex;
    request.group_name = args.group.clone();
    request.username = args.username.clone();
    request.secret = args.secret.as_deref().map(Secret::new);
    request.icon = args.icon.clone();
    request.expires_at = args.expires_at;
    request.always_create = args.always_create;
    request.list_groups = !args.no_groups;
    request.list_entries = !args.no_entries;
    request.hide_secret = args.hide_secret;
    request.dry_run = args.dry_run;
    Ok(request)
}

/// Run one request and print its response.
fn cmd_run(args: RunArgs) -> Result<()> {
    let kdf_params = KdfParams::from_preset(&args.strength).context("Invalid strength")?;
    let engine = Orchestrator::new(FileCodec::with_kdf_params(kdf_params));

    let mut request = build_request(&args)?;
    if request.passphrase.is_empty() {
        request.passphrase = prompt_password("Enter passphrase: ")?;

        let creating = request.state == Some(RequestedState::Create)
            && !engine.codec().exists(&request.path);
        if creating {
            let confirm = prompt_password("Confirm passphrase: ")?;
            if confirm != request.passphrase {
                anyhow::bail!("Passphrases do not match");
            }
        }
    }
    debug!(path = %request.path.display(), "Request built");

    let (value, failed) = match engine.handle(&request) {
        Ok(response) => (
            serde_json::to_value(&response).context("Failed to encode response")?,
            false,
        ),
        Err(failure) => (failure.to_json(), true),
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{}", output);

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run(args) => args,
            Commands::Completions { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_request_from_flags() {
        let args = parse_run(&[
            "credvault", "run", "--path", "v.kdbx", "--passphrase", "pw", "--target", "entry",
            "--state", "touch", "--title", "gmail", "--group", "email", "--username", "u",
            "--secret", "p", "--all", "--regex", "--hide-secret",
        ]);
        let request = build_request(&args).unwrap();

        assert_eq!(request.path, PathBuf::from("v.kdbx"));
        assert_eq!(request.passphrase.expose(), "pw");
        assert_eq!(request.target, Some(TargetKind::Entry));
        assert_eq!(request.state, Some(RequestedState::Touch));
        assert_eq!(request.filters.title_or_name.as_deref(), Some("gmail"));
        assert_eq!(request.group_name.as_deref(), Some("email"));
        assert!(!request.first);
        assert!(request.recursive);
        assert!(request.regex);
        assert!(request.hide_secret);
        assert!(request.list_groups);
    }

    #[test]
    fn test_build_request_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("request.json");
        fs::write(
            &file,
            r#"{"path": "v.kdbx", "target": "group", "state": "find", "group_name": "email"}"#,
        )
        .unwrap();

        let file_arg = file.to_string_lossy().to_string();
        let args = parse_run(&["credvault", "run", "--request", &file_arg, "--dry-run"]);
        let request = build_request(&args).unwrap();

        assert_eq!(request.target, Some(TargetKind::Group));
        assert_eq!(request.group_name.as_deref(), Some("email"));
        assert!(request.first);
        assert!(request.dry_run);
    }

    #[test]
    fn test_strength_presets() {
        let args = parse_run(&["credvault", "run", "--strength", "sensitive"]);
        assert_eq!(args.strength, "sensitive");
        assert_eq!(parse_run(&["credvault", "run"]).strength, "interactive");

        let weak = Cli::try_parse_from(["credvault", "run", "--strength", "minimal"]);
        assert!(weak.is_err());
    }

    #[test]
    fn test_build_request_requires_path() {
        let args = parse_run(&["credvault", "run"]);
        assert!(build_request(&args).is_err());
    }
}
