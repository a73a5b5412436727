//! CLI command handlers

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::queue::ledger::LEDGER_FILE;
use crate::queue::{Engine, FetchOptions, FetchProgress, Ledger};
use crate::source::{YtDlpConverter, YtDlpSource};

/// Handle the `fetch` command
pub async fn fetch(
    url: String,
    output: Option<PathBuf>,
    concurrency: usize,
    page_size: u32,
    bulk: bool,
) -> Result<()> {
    let playlist_url = Url::parse(&url).context("Invalid playlist URL")?;
    let output_dir = resolve_output(output);

    println!(
        "{}",
        format!("Fetching playlist into {}", output_dir.display()).cyan()
    );

    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    // Ctrl-C requests a stop; the queue finishes its in-flight sweep
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nStopping; letting in-flight downloads settle...");
                cancel.cancel();
            }
        });
    }

    let render = tokio::spawn(render_progress(rx));

    let source = Arc::new(YtDlpSource::new(playlist_url.as_str()));
    let converter = Arc::new(YtDlpConverter::new());
    let mut engine = Engine::new(
        source,
        converter,
        output_dir,
        FetchOptions {
            concurrency,
            page_size,
        },
        cancel.clone(),
        tx,
    );

    let result = if bulk {
        engine.run_bulk().await
    } else {
        engine.run_interleaved().await
    };

    // Close the progress channel so the renderer drains and exits
    drop(engine);
    let _ = render.await;

    let summary = result?;

    println!();
    if cancel.is_cancelled() && summary.remaining() > 0 {
        println!(
            "{}",
            format!("Stopped with {} tracks not attempted.", summary.remaining()).yellow()
        );
    } else {
        println!("{}", "Fetch complete!".green().bold());
    }
    println!("  Tracks downloaded: {}", summary.downloaded);
    println!("  Already present: {}", summary.skipped);
    if summary.failed > 0 {
        println!("  {}", format!("Failed: {}", summary.failed).red());
    }

    Ok(())
}

/// Render progress events as a console bar
async fn render_progress(mut rx: mpsc::Receiver<FetchProgress>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        match event {
            FetchProgress::Loaded {
                title,
                total,
                pending,
            } => {
                println!(
                    "{} {} ({} tracks, {} to download)",
                    "Playlist:".bold(),
                    title,
                    total,
                    pending
                );
                let b = ProgressBar::new(total as u64);
                b.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap()
                        .progress_chars("#>-"),
                );
                b.set_position((total - pending) as u64);
                bar = Some(b);
            }
            FetchProgress::Progress {
                completed,
                pending,
                total,
                ..
            } => {
                if let Some(b) = &bar {
                    // Interleaved runs discover the real total as pages land
                    b.set_length(total as u64);
                    b.set_position(completed as u64);
                    b.set_message(format!("{pending} pending"));
                }
            }
            FetchProgress::Complete => {
                if let Some(b) = &bar {
                    b.finish_with_message("Done");
                }
            }
            FetchProgress::Error { message } => {
                if let Some(b) = &bar {
                    b.abandon();
                }
                eprintln!("{} {}", "Error:".red().bold(), message);
            }
        }
    }
}

/// Handle the `status` command
pub async fn status(output: Option<PathBuf>) -> Result<()> {
    let output_dir = resolve_output(output);
    println!("{}", output_dir.display().to_string().bold());

    if !output_dir.exists() {
        println!("  {}", "No downloads yet.".yellow());
        return Ok(());
    }

    let ledger = Ledger::load(&output_dir.join(LEDGER_FILE));

    let mut files = 0usize;
    let mut entries = tokio::fs::read_dir(&output_dir)
        .await
        .with_context(|| format!("Failed to read {}", output_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some_and(|ext| ext == "mp3") {
            files += 1;
        }
    }

    println!("  Tracks on ledger: {}", ledger.len());
    println!("  Audio files: {}", files);
    Ok(())
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    generate(shell, &mut cmd, "tunepull", &mut io::stdout());
}

/// Default output folder: the user's music directory, else ./downloads
fn resolve_output(output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| {
        dirs::audio_dir()
            .map(|dir| dir.join("tunepull"))
            .unwrap_or_else(|| PathBuf::from("downloads"))
    })
}
