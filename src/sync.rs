use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SyncError;
use crate::ignore::IgnoreSet;
use crate::journal::{Action, Journal, Kind};
use crate::mtime::{self, MTIME_TOLERANCE_SECS};
use crate::reconnect::SessionHolder;
use crate::stats::Statistics;
use crate::transfer;
use crate::util::{join_remote, remote_basename};

/// Reconnect-and-retry rounds allowed per walk invocation. The counter is
/// shared across the whole recursion, not per directory.
pub const MAX_RETRIES: u32 = 3;

/// Everything one walk needs: the session holder (swap semantics), the
/// compiled ignore set, the journal, running statistics, and the interrupt
/// flag written by the SIGINT handler.
pub struct WalkContext {
    pub holder: SessionHolder,
    pub ignore: IgnoreSet,
    pub journal: Journal,
    pub stats: Statistics,
    pub interrupt: Arc<AtomicBool>,
    pub show_progress: bool,
    retries: u32,
}

impl WalkContext {
    pub fn new(holder: SessionHolder, ignore: IgnoreSet, journal: Journal) -> WalkContext {
        WalkContext {
            holder,
            ignore,
            journal,
            stats: Statistics::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
            show_progress: false,
            retries: 0,
        }
    }

    /// The retry budget is per top-level walk; sync resets it between the
    /// download phase and the upload phase.
    pub fn reset_retries(&mut self) {
        self.retries = 0;
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

/// Download walk: reconcile the remote directory into the local one,
/// recursing depth-first. Connection-class failures reconnect and retry
/// the current directory from the beginning, bounded by MAX_RETRIES.
pub fn pull_tree(
    ctx: &mut WalkContext,
    remote_dir: &str,
    local_dir: &Path,
) -> Result<(), SyncError> {
    loop {
        match pull_dir(ctx, remote_dir, local_dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_connection() => {
                ctx.retries += 1;
                if ctx.retries > MAX_RETRIES {
                    return Err(SyncError::RetriesExhausted(remote_dir.to_string()));
                }
                tracing::warn!(
                    "[pull] {} (retry {}/{}): {}",
                    remote_dir,
                    ctx.retries,
                    MAX_RETRIES,
                    e
                );
                ctx.holder.reconnect()?;
            }
            Err(e) => return Err(e),
        }
    }
}

fn pull_dir(ctx: &mut WalkContext, remote_dir: &str, local_dir: &Path) -> Result<(), SyncError> {
    ctx.holder.ensure_alive()?;
    std::fs::create_dir_all(local_dir)
        .map_err(|e| SyncError::Filesystem(local_dir.display().to_string(), e.to_string()))?;
    let entries = match ctx.holder.remote().list(remote_dir) {
        Ok(v) => v,
        // the directory vanished between probe and listing
        Err(SyncError::RemoteMissing(_)) => return Ok(()),
        Err(e) if e.is_connection() => return Err(e),
        Err(e) => {
            tracing::warn!("[pull] cannot list {}: {}", remote_dir, e);
            ctx.stats.errors += 1;
            return Ok(());
        }
    };

    for raw in entries {
        if ctx.interrupted() {
            return Err(SyncError::Interrupted);
        }
        let name = remote_basename(&raw).to_string();
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        if ctx.ignore.is_ignored(&name) {
            continue;
        }
        let remote_path = join_remote(remote_dir, &name);
        let local_path = local_dir.join(&name);

        match ctx.holder.remote().chdir(&remote_path) {
            Ok(()) => {
                if !local_path.exists() {
                    match std::fs::create_dir_all(&local_path) {
                        Ok(()) => {
                            println!("📁 created folder {}", local_path.display());
                            ctx.journal.record(
                                ctx.holder.remote(),
                                Action::Created,
                                Kind::Carpeta,
                                &name,
                            );
                            ctx.stats.dirs_created += 1;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "[pull] cannot create {}: {}",
                                local_path.display(),
                                e
                            );
                            ctx.stats.errors += 1;
                            let _ = ctx.holder.remote().updir();
                            continue;
                        }
                    }
                }
                pull_tree(ctx, &remote_path, &local_path)?;
                if let Err(e) = ctx.holder.remote().updir() {
                    if e.is_connection() {
                        return Err(e);
                    }
                    tracing::warn!("[pull] cannot leave {}: {}", remote_path, e);
                }
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(_) => {
                // chdir refused: the entry is a file
                let ts_remote = ctx.holder.remote().mtime(&remote_path)?;
                let ts_local = mtime::local_mtime(&local_path);
                if mtime::needs_sync(ts_local, ts_remote, MTIME_TOLERANCE_SECS) {
                    println!("⬇️  {}", remote_path);
                    match transfer::download_file(
                        &mut ctx.holder,
                        &mut ctx.journal,
                        &mut ctx.stats,
                        &remote_path,
                        &local_path,
                        ctx.show_progress,
                    ) {
                        Ok(_) => {}
                        Err(e) if e.is_connection() => return Err(e),
                        Err(e) => {
                            tracing::warn!("[pull] {} failed: {}", remote_path, e);
                            ctx.stats.errors += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Upload walk: reconcile the local directory into the remote one.
pub fn push_tree(
    ctx: &mut WalkContext,
    local_dir: &Path,
    remote_dir: &str,
) -> Result<(), SyncError> {
    loop {
        match push_dir(ctx, local_dir, remote_dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_connection() => {
                ctx.retries += 1;
                if ctx.retries > MAX_RETRIES {
                    return Err(SyncError::RetriesExhausted(remote_dir.to_string()));
                }
                tracing::warn!(
                    "[push] {} (retry {}/{}): {}",
                    remote_dir,
                    ctx.retries,
                    MAX_RETRIES,
                    e
                );
                ctx.holder.reconnect()?;
            }
            Err(e) => return Err(e),
        }
    }
}

fn push_dir(ctx: &mut WalkContext, local_dir: &Path, remote_dir: &str) -> Result<(), SyncError> {
    ctx.holder.ensure_alive()?;
    let entries = match std::fs::read_dir(local_dir) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("[push] cannot read {}: {}", local_dir.display(), e);
            ctx.stats.errors += 1;
            return Ok(());
        }
    };

    for entry in entries {
        if ctx.interrupted() {
            return Err(SyncError::Interrupted);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("[push] unreadable entry in {}: {}", local_dir.display(), e);
                ctx.stats.errors += 1;
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().to_string();
        if ctx.ignore.is_ignored(&name) {
            continue;
        }
        let local_path = entry.path();
        let remote_path = join_remote(remote_dir, &name);
        let ftype = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("[push] cannot stat {}: {}", local_path.display(), e);
                ctx.stats.errors += 1;
                continue;
            }
        };

        if ftype.is_file() {
            let ts_local = mtime::local_mtime(&local_path);
            let ts_remote = ctx.holder.remote().mtime(&remote_path)?;
            if mtime::needs_sync(ts_local, ts_remote, MTIME_TOLERANCE_SECS) {
                println!("⬆️  {}", remote_path);
                match transfer::upload_file(
                    &mut ctx.holder,
                    &mut ctx.journal,
                    &mut ctx.stats,
                    &local_path,
                    &remote_path,
                    ctx.show_progress,
                ) {
                    Ok(_) => {}
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => {
                        tracing::warn!("[push] {} failed: {}", remote_path, e);
                        ctx.stats.errors += 1;
                    }
                }
            }
        } else if ftype.is_dir() {
            match ctx.holder.remote().chdir(&remote_path) {
                Ok(()) => {}
                Err(e) if e.is_connection() => return Err(e),
                Err(_) => {
                    match ctx.holder.remote().mkdir(&remote_path) {
                        Ok(()) => {
                            println!("📁 created remote folder {}", remote_path);
                            ctx.journal.record(
                                ctx.holder.remote(),
                                Action::Created,
                                Kind::Carpeta,
                                &name,
                            );
                            ctx.stats.dirs_created += 1;
                        }
                        Err(e) if e.is_connection() => return Err(e),
                        Err(e) => {
                            tracing::warn!("[push] cannot create {}: {}", remote_path, e);
                            ctx.stats.errors += 1;
                            continue;
                        }
                    }
                    if let Err(e) = ctx.holder.remote().chdir(&remote_path) {
                        if e.is_connection() {
                            return Err(e);
                        }
                        tracing::warn!("[push] cannot enter {}: {}", remote_path, e);
                        ctx.stats.errors += 1;
                        continue;
                    }
                }
            }
            push_tree(ctx, &local_path, &remote_path)?;
            if let Err(e) = ctx.holder.remote().updir() {
                if e.is_connection() {
                    return Err(e);
                }
                tracing::warn!("[push] cannot leave {}: {}", remote_path, e);
            }
        } else {
            tracing::debug!("[push] skipping special entry {}", local_path.display());
        }
    }
    Ok(())
}

/// Ensure the chain of remote directories between the remote root and the
/// walk's starting subpath exists, creating and journaling missing links.
/// Returns the final remote path.
pub fn ensure_remote_chain(
    ctx: &mut WalkContext,
    remote_root: &str,
    components: &[String],
) -> Result<String, SyncError> {
    let mut current = remote_root.trim_end_matches('/').to_string();
    if current.is_empty() {
        current = "/".to_string();
    }
    for comp in components {
        current = join_remote(&current, comp);
        match ctx.holder.remote().chdir(&current) {
            Ok(()) => {
                if let Err(e) = ctx.holder.remote().updir() {
                    if e.is_connection() {
                        return Err(e);
                    }
                    tracing::warn!("[push] cannot leave {}: {}", current, e);
                }
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(_) => {
                ctx.holder.remote().mkdir(&current)?;
                println!("📁 created remote folder {}", current);
                ctx.journal.record(ctx.holder.remote(), Action::Created, Kind::Carpeta, comp);
                ctx.stats.dirs_created += 1;
            }
        }
    }
    Ok(current)
}
