use std::fs::OpenOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use scbox::cli;
use scbox::ops;

fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            // clap renders its own usage/help text; the exit-code contract
            // is ours: 0 for --help/--version, 1 for anything invalid
            let _ = e.print();
            let code = if e.use_stderr() { 1 } else { 0 };
            std::process::exit(code);
        }
    };
    init_tracing(cli.debug);

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        eprintln!("⚠️ cannot install the interrupt handler: {}", e);
    }

    let res: Result<()> = match cli.command {
        cli::Command::Upload {} => ops::handle_upload(interrupt.clone()),
        cli::Command::Download {} => ops::handle_download(interrupt.clone()),
        cli::Command::Sync {} => ops::handle_sync(interrupt.clone()),
    };

    if let Err(e) = res {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

/// Write tracing output to ~/.scbox/logs/debug.log only; console output
/// stays reserved for user-facing progress and summaries. Level is warn
/// unless --debug was passed.
fn init_tracing(debug: bool) {
    let logs_dir = match dirs::home_dir() {
        Some(home) => home.join(".scbox").join("logs"),
        None => return,
    };
    let _ = std::fs::create_dir_all(&logs_dir);
    let log_path = logs_dir.join("debug.log");
    let level_str = if debug { "debug" } else { "warn" };

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let (non_blocking_writer, guard) = non_blocking(file);
            // Leak the worker guard so the background writer thread stays
            // alive for the duration of the process.
            let _ = Box::leak(Box::new(guard));
            let file_layer = fmt::layer()
                .with_writer(non_blocking_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(level_str));
            tracing_subscriber::registry().with(file_layer).init();
        }
        Err(e) => {
            eprintln!("warning: could not open debug log at {}: {}", log_path.display(), e);
        }
    }
}
