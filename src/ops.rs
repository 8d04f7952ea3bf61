use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::Result;

use crate::config::{self, CONFIG_FILE, Config, OPTIONS_FILE, SyncOptions};
use crate::error::SyncError;
use crate::ignore::IgnoreSet;
use crate::journal::Journal;
use crate::reconnect::SessionHolder;
use crate::remote::ftp;
use crate::sync::{self, WalkContext};
use crate::util::join_remote;

/// Everything `prepare` resolves before a walk can start.
struct Prepared {
    ctx: WalkContext,
    local_start: PathBuf,
    remote_root: String,
    remote_start: String,
    rel: Vec<String>,
}

/// Remote path matching the CWD's position under the project root. When
/// invoked from the root itself the remote working directory is used
/// verbatim, so the tool can run from any subdirectory and touch only
/// that subtree.
pub fn derive_remote_start(remote_root: &str, rel: &[String]) -> String {
    if rel.is_empty() {
        return remote_root.to_string();
    }
    let mut current = remote_root.trim_end_matches('/').to_string();
    if current.is_empty() {
        current = "/".to_string();
    }
    for comp in rel {
        current = join_remote(&current, comp);
    }
    current
}

fn prepare(interrupt: Arc<AtomicBool>) -> Result<Prepared, SyncError> {
    let cwd = std::env::current_dir()
        .map_err(|e| SyncError::Filesystem(".".to_string(), e.to_string()))?;
    let root = config::find_project_root(&cwd)
        .ok_or_else(|| SyncError::ConfigNotFound(CONFIG_FILE.to_string()))?;
    let cfg = Config::load(&root.join(CONFIG_FILE))?;
    let options = SyncOptions::load_or_seed(&root.join(OPTIONS_FILE))?;
    let ignore = IgnoreSet::build(&options.ignore_list)?;
    let journal = Journal::open(&root)?;

    let session = ftp::connect(&cfg)?;
    println!("Connected to {}   [scbox {}]", cfg.ftp.ftp_server, env!("CARGO_PKG_VERSION"));
    let factory_cfg = cfg.clone();
    let mut holder = SessionHolder::new(session, Box::new(move || ftp::connect(&factory_cfg)));
    let remote_root = holder.remote().pwd()?;
    let rel: Vec<String> = cwd
        .strip_prefix(&root)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    let remote_start = derive_remote_start(&remote_root, &rel);

    let mut ctx = WalkContext::new(holder, ignore, journal);
    ctx.interrupt = interrupt;
    ctx.show_progress = true;
    Ok(Prepared { ctx, local_start: cwd, remote_root, remote_start, rel })
}

/// Close the session and print statistics no matter how the walk ended;
/// a user interrupt is a clean exit.
fn finish(mut p: Prepared, res: Result<(), SyncError>, started: Instant) -> Result<()> {
    p.ctx.holder.quit();
    p.ctx.stats.print_summary(started.elapsed().as_secs_f64());
    match res {
        Ok(()) => Ok(()),
        Err(SyncError::Interrupted) => {
            println!("🛑 operation cancelled by user");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn handle_download(interrupt: Arc<AtomicBool>) -> Result<()> {
    let started = Instant::now();
    let mut p = prepare(interrupt)?;
    let remote_start = p.remote_start.clone();
    let local_start = p.local_start.clone();
    println!("⬇️  pulling {} -> {}", remote_start, local_start.display());
    let res = sync::pull_tree(&mut p.ctx, &remote_start, &local_start);
    finish(p, res, started)
}

pub fn handle_upload(interrupt: Arc<AtomicBool>) -> Result<()> {
    let started = Instant::now();
    let mut p = prepare(interrupt)?;
    let remote_root = p.remote_root.clone();
    let rel = p.rel.clone();
    let local_start = p.local_start.clone();
    let res = match sync::ensure_remote_chain(&mut p.ctx, &remote_root, &rel) {
        Ok(target) => {
            println!("⬆️  pushing {} -> {}", local_start.display(), target);
            sync::push_tree(&mut p.ctx, &local_start, &target)
        }
        Err(e) => Err(e),
    };
    finish(p, res, started)
}

/// Download to completion, then upload: when a file changed on both
/// sides, the download phase refreshes the local copy first, so the
/// upload phase never pushes a stale version over the remote.
pub fn handle_sync(interrupt: Arc<AtomicBool>) -> Result<()> {
    let started = Instant::now();
    let mut p = prepare(interrupt)?;
    let remote_root = p.remote_root.clone();
    let remote_start = p.remote_start.clone();
    let rel = p.rel.clone();
    let local_start = p.local_start.clone();
    println!("🔄 synchronizing {} <-> {}", local_start.display(), remote_start);
    let res = match sync::pull_tree(&mut p.ctx, &remote_start, &local_start) {
        Ok(()) => {
            p.ctx.reset_retries();
            match sync::ensure_remote_chain(&mut p.ctx, &remote_root, &rel) {
                Ok(target) => sync::push_tree(&mut p.ctx, &local_start, &target),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };
    finish(p, res, started)
}
