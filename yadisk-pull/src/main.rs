use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use yadisk_core::YadiskClient;
use yadisk_pull::config::PullConfig;
use yadisk_pull::context::{MARKER_FILE, SyncContext};
use yadisk_pull::sync::apply::ChangeApplier;
use yadisk_pull::sync::confirm::{AssumeYes, Confirm, TerminalConfirm};
use yadisk_pull::sync::progress::TerminalProgress;
use yadisk_pull::sync::pull::{PullOutcome, Puller};
use yadisk_pull::sync::remote::YadiskRemote;
use yadisk_pull::sync::resolver::TreeResolver;

const DEFAULT_REMOTE_ROOT: &str = "disk:/";

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Init { remote_root: String },
    Pull { path: Option<String> },
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let mode = match args.next().as_deref() {
        None => CliMode::Pull { path: None },
        Some("--help" | "-h" | "help") => return Ok(CliMode::Help),
        Some("init") => CliMode::Init {
            remote_root: args
                .next()
                .unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string()),
        },
        Some("pull") => CliMode::Pull { path: args.next() },
        Some(other) => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(mode)
}

/// Turns a command-line path into a logical path. Absolute arguments are
/// taken as logical already; anything else is relative to `cwd`.
fn logical_target(
    context: Option<&SyncContext>,
    cwd: &Path,
    arg: Option<&str>,
) -> anyhow::Result<String> {
    match (arg, context) {
        (Some(arg), _) if arg.starts_with('/') => Ok(arg.to_string()),
        (arg, Some(context)) => {
            let local = match arg {
                Some(arg) => cwd.join(arg),
                None => cwd.to_path_buf(),
            };
            context
                .logical_path_of(&local)
                .with_context(|| format!("{} is outside the sync root", local.display()))
        }
        (Some(arg), None) => Ok(format!("/{arg}")),
        (None, None) => Ok("/".to_string()),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yadisk_pull=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_pull(arg: Option<String>) -> anyhow::Result<()> {
    let config = PullConfig::from_env()?;
    let cwd = std::env::current_dir().context("current directory is unavailable")?;
    let start = config.start_dir.clone().unwrap_or_else(|| cwd.clone());
    let context = SyncContext::discover(&start).context("failed to read sync context")?;
    let path = logical_target(context.as_ref(), &cwd, arg.as_deref())?;

    let client = match &config.api_base_url {
        Some(url) => YadiskClient::with_base_url(url, config.token.clone()),
        None => YadiskClient::new(config.token.clone()),
    }
    .context("invalid API configuration")?;
    let remote_root = context
        .as_ref()
        .map(|ctx| ctx.remote_root().to_string())
        .unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string());
    let local_root = context
        .as_ref()
        .map(|ctx| ctx.local_root().to_path_buf())
        .unwrap_or_else(|| start.clone());

    let remote = Arc::new(YadiskRemote::new(client, remote_root).with_page_size(config.page_size));
    let resolver = Arc::new(
        TreeResolver::new(remote.clone(), local_root.clone())
            .with_ignored(MARKER_FILE)
            .with_delete_extraneous(config.delete_extraneous),
    );
    let progress = if std::io::stderr().is_terminal() {
        TerminalProgress::new()
    } else {
        TerminalProgress::hidden()
    };
    let applier = ChangeApplier::new(local_root, remote.clone()).with_progress(Arc::new(progress));
    let confirm: Box<dyn Confirm> = if config.assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalConfirm)
    };

    let puller = Puller::new(context, remote, resolver, applier, confirm);
    match puller.pull(&path).await? {
        PullOutcome::NothingToPull => println!("Nothing to pull at {path}"),
        PullOutcome::UpToDate => println!("{path} is up to date"),
        PullOutcome::Declined => println!("Aborted"),
        PullOutcome::Applied(count) => println!("Applied {count} change(s) to {path}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: yadisk-pull [init [REMOTE_ROOT] | pull [PATH]]");
            println!(
                "  init   Bind the current directory to REMOTE_ROOT (default {DEFAULT_REMOTE_ROOT})"
            );
            println!("  pull   Download remote changes below PATH (default: current directory)");
            Ok(())
        }
        CliMode::Init { remote_root } => {
            let cwd = std::env::current_dir().context("current directory is unavailable")?;
            SyncContext::init(&cwd, &remote_root)?;
            tracing::info!(root = %cwd.display(), remote_root, "sync root initialized");
            Ok(())
        }
        CliMode::Pull { path } => run_pull(path).await,
    }
}
