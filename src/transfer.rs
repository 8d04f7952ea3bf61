use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::SyncError;
use crate::journal::{Action, Journal, Kind};
use crate::mtime;
use crate::reconnect::SessionHolder;
use crate::stats::Statistics;
use crate::util::remote_basename;

/// Fixed block size for binary retrieves and stores.
pub const TRANSFER_BLOCK: usize = 8 * 1024;

/// `<destination>.tmp` next to the destination, on either side.
pub(crate) fn staging_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn staging_name(dest: &str) -> String {
    format!("{}.tmp", dest)
}

fn file_progress(size: Option<u64>, name: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = match size {
        Some(sz) => {
            let pb = ProgressBar::new(sz);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .expect("valid progress template")
                .progress_chars("=> "),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(name.to_string());
    pb
}

struct ProgressWriter<'a, W: Write> {
    inner: &'a mut W,
    pb: &'a ProgressBar,
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pb.inc(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct ProgressReader<'a, R: Read> {
    inner: &'a mut R,
    pb: &'a ProgressBar,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pb.inc(n as u64);
        Ok(n)
    }
}

/// Replace `dest` with `tmp`, retrying a couple of times when the target
/// reappears or is briefly locked (Windows semantics).
pub(crate) fn replace_file(tmp: &Path, dest: &Path) -> Result<(), std::io::Error> {
    if dest.exists() {
        let _ = std::fs::remove_file(dest);
    }
    let mut attempts = 0;
    loop {
        match std::fs::rename(tmp, dest) {
            Ok(()) => return Ok(()),
            Err(e) => {
                let kind = e.kind();
                if attempts < 2
                    && (kind == std::io::ErrorKind::AlreadyExists
                        || kind == std::io::ErrorKind::PermissionDenied)
                {
                    let _ = std::fs::remove_file(dest);
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    attempts += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}

/// Download one remote file into `local_path` with temp staging, size
/// verification and timestamp propagation. The destination is never
/// observable in a partial state: a failure at any step removes the
/// staging file and leaves whatever was there before.
pub fn download_file(
    holder: &mut SessionHolder,
    journal: &mut Journal,
    stats: &mut Statistics,
    remote_path: &str,
    local_path: &Path,
    show_progress: bool,
) -> Result<u64, SyncError> {
    holder.remote().noop()?;
    let expected = holder.remote().size(remote_path)?;
    let name = remote_basename(remote_path).to_string();
    let tmp_path = staging_path(local_path);

    let pb = file_progress(expected, &name, show_progress);
    let mut file = File::create(&tmp_path)
        .map_err(|e| SyncError::Filesystem(tmp_path.display().to_string(), e.to_string()))?;
    let retrieved = {
        let mut sink = ProgressWriter { inner: &mut file, pb: &pb };
        holder.remote().retrieve(remote_path, &mut sink)
    };
    let bytes = match retrieved {
        Ok(n) => n,
        Err(e) => {
            pb.finish_and_clear();
            drop(file);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };
    if let Err(e) = file.sync_all() {
        pb.finish_and_clear();
        drop(file);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(SyncError::Filesystem(tmp_path.display().to_string(), e.to_string()));
    }
    drop(file);
    pb.finish_and_clear();

    if let Some(expect) = expected {
        let actual = std::fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if actual != expect {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SyncError::SizeMismatch {
                path: remote_path.to_string(),
                expected: expect,
                actual,
            });
        }
    }

    if let Err(e) = replace_file(&tmp_path, local_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(SyncError::Filesystem(local_path.display().to_string(), e.to_string()));
    }

    if let Some(ts) = holder.remote().mtime(remote_path)? {
        if let Err(e) = mtime::set_local_mtime(local_path, ts) {
            tracing::warn!("[get] cannot set mtime on {}: {}", local_path.display(), e);
        }
    }

    journal.record(holder.remote(), Action::Downloaded, Kind::Archivo, &name);
    stats.files_downloaded += 1;
    stats.bytes_transferred += bytes;
    holder.note_download()?;
    Ok(bytes)
}

/// Upload one local file to `remote_path` via a remote staging name, then
/// publish it with delete + rename and propagate the local mtime.
pub fn upload_file(
    holder: &mut SessionHolder,
    journal: &mut Journal,
    stats: &mut Statistics,
    local_path: &Path,
    remote_path: &str,
    show_progress: bool,
) -> Result<u64, SyncError> {
    let meta = std::fs::metadata(local_path)
        .map_err(|e| SyncError::Filesystem(local_path.display().to_string(), e.to_string()))?;
    if !meta.is_file() {
        return Err(SyncError::Filesystem(
            local_path.display().to_string(),
            "not a regular file".to_string(),
        ));
    }
    let name = remote_basename(remote_path).to_string();
    let tmp_remote = staging_name(remote_path);

    let pb = file_progress(Some(meta.len()), &name, show_progress);
    let mut file = File::open(local_path)
        .map_err(|e| SyncError::Filesystem(local_path.display().to_string(), e.to_string()))?;
    let stored = {
        let mut source = ProgressReader { inner: &mut file, pb: &pb };
        holder.remote().store(&mut source, &tmp_remote)
    };
    pb.finish_and_clear();
    let bytes = match stored {
        Ok(n) => n,
        Err(e) => {
            // the control channel is gone on connection loss; otherwise
            // try not to leave staging debris behind
            if !e.is_connection() {
                let _ = holder.remote().delete(&tmp_remote);
            }
            return Err(e);
        }
    };

    if holder.remote().mtime(remote_path)?.is_some() {
        if let Err(e) = holder.remote().delete(remote_path) {
            if e.is_connection() {
                return Err(e);
            }
            tracing::warn!("[put] cannot clear {}: {}", remote_path, e);
        }
    }
    if let Err(e) = holder.remote().rename(&tmp_remote, remote_path) {
        if !e.is_connection() {
            let _ = holder.remote().delete(&tmp_remote);
        }
        return Err(e);
    }

    if let Some(ts) = mtime::local_mtime(local_path) {
        if let Err(e) = holder.remote().set_mtime(remote_path, ts) {
            tracing::warn!("[put] cannot set remote mtime on {}: {}", remote_path, e);
        }
    }

    journal.record(holder.remote(), Action::Uploaded, Kind::Archivo, &name);
    stats.files_uploaded += 1;
    stats.bytes_transferred += bytes;
    Ok(bytes)
}
