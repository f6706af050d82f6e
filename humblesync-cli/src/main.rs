//! humblesync - command-line downloader for Humble Bundle purchases.

mod options;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use humblesync::format::Platform;
use humblesync::{Command, Options, Session};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::progress::BarSink;

#[derive(Debug, Parser)]
#[command(
    name = "humblesync",
    version,
    about = "Download and synchronize your Humble Bundle purchases"
)]
struct Cli {
    /// Folder all downloads land under
    #[arg(short = 'd', long, global = true)]
    download_folder: Option<PathBuf>,

    /// Session cookie value (_simpleauth_sess) copied from your browser
    #[arg(short = 't', long, global = true)]
    auth_token: Option<String>,

    /// Parallel download limit
    #[arg(short = 'l', long, global = true, default_value_t = 1)]
    parallel: usize,

    /// Format(s) to download, highest priority first
    #[arg(short = 'f', long, global = true, value_delimiter = ',')]
    format: Vec<String>,

    /// Platform(s) to download
    #[arg(short = 'p', long, global = true, value_delimiter = ',', value_parser = parse_platform)]
    platform: Vec<Platform>,

    /// Keep every variant instead of deduplicating purchases
    #[arg(long, global = true)]
    no_dedup: bool,

    /// Do not group downloads into per-bundle folders
    #[arg(long, global = true)]
    no_bundle_folders: bool,

    /// Accept changed settings without prompting
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum CliCommand {
    /// Download everything from all purchased bundles
    All,
    /// Download ebooks, one preferred format per title
    Ebooks,
    /// Download the subscription catalog
    Trove,
    /// Delete local files no purchase references
    Cleanup,
    /// Delete local files the ebook selection no longer references
    #[command(name = "cleanupebooks")]
    CleanupEbooks,
    /// Delete local files the catalog no longer references
    #[command(name = "cleanuptrove")]
    CleanupTrove,
    /// Recompute checksums of all existing files
    Checksums,
}

impl From<CliCommand> for Command {
    fn from(cmd: CliCommand) -> Self {
        match cmd {
            CliCommand::All => Command::All,
            CliCommand::Ebooks => Command::Ebooks,
            CliCommand::Trove => Command::Trove,
            CliCommand::Cleanup => Command::Cleanup,
            CliCommand::CleanupEbooks => Command::CleanupEbooks,
            CliCommand::CleanupTrove => Command::CleanupTrove,
            CliCommand::Checksums => Command::Checksums,
        }
    }
}

fn parse_platform(raw: &str) -> Result<Platform, String> {
    Platform::parse(raw).ok_or_else(|| {
        format!(
            "unknown platform {:?}, expected one of linux, mac, windows, android, ebook, audio, video",
            raw
        )
    })
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "humblesync=debug,humblesync_cli=debug"
    } else {
        "humblesync=info,humblesync_cli=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_options(cli: &Cli) -> Result<Options, String> {
    let download_folder = cli
        .download_folder
        .clone()
        .ok_or("please specify the download folder (--download-folder or -d)")?;

    let mut opts = Options {
        dedup: !cli.no_dedup,
        bundle_folders: !cli.no_bundle_folders,
        parallel: cli.parallel.max(1),
        auth_token: cli.auth_token.clone().unwrap_or_default(),
        download_folder,
        ..Options::default()
    };
    if !cli.format.is_empty() {
        opts.format = cli.format.clone();
    }
    if !cli.platform.is_empty() {
        opts.platform = cli.platform.clone();
    }
    Ok(opts)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(message) => {
            eprintln!("{} {}", style("error:").red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, String> {
    let command: Command = cli.command.into();
    let mut opts = build_options(&cli)?;
    options::reconcile_saved(&mut opts, cli.yes)
        .map_err(|e| format!("could not persist options snapshot: {}", e))?;

    let session = Arc::new(
        Session::new(opts, Arc::new(BarSink::new())).map_err(|e| e.to_string())?,
    );

    let interrupt_target = Arc::clone(&session);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, flushing checksum cache");
        interrupt_target.interrupt();
    }) {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }

    let report = session.run(command).await.map_err(|e| e.to_string())?;

    println!("{}", report.totals);
    if let Some(reconcile) = &report.reconcile {
        println!(
            "Removed {} file(s) and {} cache entr(ies)",
            reconcile.removed_files, reconcile.removed_checksums
        );
    }

    if report.failures.is_empty() {
        Ok(true)
    } else {
        eprintln!(
            "{} {} item(s) failed; re-run to retry just those:",
            style("warning:").yellow().bold(),
            report.failures.len()
        );
        for failure in &report.failures {
            eprintln!("  {}", style(failure).red());
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_names_match_legacy_spelling() {
        let cli = Cli::parse_from(["humblesync", "-d", "/dl", "cleanupebooks"]);
        assert!(matches!(cli.command, CliCommand::CleanupEbooks));
        let cli = Cli::parse_from(["humblesync", "-d", "/dl", "cleanuptrove"]);
        assert!(matches!(cli.command, CliCommand::CleanupTrove));
    }

    #[test]
    fn test_formats_are_comma_separated_in_priority_order() {
        let cli = Cli::parse_from(["humblesync", "-d", "/dl", "-f", "cbz,pdf", "ebooks"]);
        let opts = build_options(&cli).unwrap();
        assert_eq!(opts.format, vec!["cbz".to_string(), "pdf".to_string()]);
    }

    #[test]
    fn test_defaults_fill_in() {
        let cli = Cli::parse_from(["humblesync", "-d", "/dl", "all"]);
        let opts = build_options(&cli).unwrap();
        assert!(opts.dedup);
        assert!(opts.bundle_folders);
        assert_eq!(opts.parallel, 1);
        assert!(!opts.format.is_empty());
    }

    #[test]
    fn test_no_dedup_flag() {
        let cli = Cli::parse_from(["humblesync", "-d", "/dl", "--no-dedup", "all"]);
        let opts = build_options(&cli).unwrap();
        assert!(!opts.dedup);
    }

    #[test]
    fn test_missing_download_folder_is_an_error() {
        let cli = Cli::parse_from(["humblesync", "checksums"]);
        assert!(build_options(&cli).is_err());
    }
}
