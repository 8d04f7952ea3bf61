use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::SyncError;
use crate::remote::RemoteStore;

pub const JOURNAL_FILE: &str = "scb.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Downloaded,
    Uploaded,
    Created,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Downloaded => "downloaded",
            Action::Uploaded => "uploaded",
            Action::Created => "created",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Archivo,
    Carpeta,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Archivo => "archivo",
            Kind::Carpeta => "carpeta",
        }
    }
}

/// Append-only activity log at `<project root>/scb.log`. After every
/// append the whole file is mirrored to the remote current working
/// directory, so the remote copy always reflects the full local history
/// at the time of the latest event.
pub struct Journal {
    path: PathBuf,
    user: String,
}

impl Journal {
    pub fn open(project_root: &Path) -> Result<Journal, SyncError> {
        Journal::with_user(project_root, whoami::username())
    }

    pub fn with_user(project_root: &Path, user: String) -> Result<Journal, SyncError> {
        let path = project_root.join(JOURNAL_FILE);
        if !path.exists() {
            let header = format!("Log iniciado - {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
            std::fs::write(&path, header)
                .map_err(|e| SyncError::Filesystem(path.display().to_string(), e.to_string()))?;
        }
        Ok(Journal { path, user })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and mirror the file. Journal trouble never aborts
    /// the operation that produced the event; failures are only logged.
    pub fn record(
        &mut self,
        remote: &mut dyn RemoteStore,
        action: Action,
        kind: Kind,
        description: &str,
    ) {
        let now = Local::now();
        let line = format!(
            "{} {} el usuario {} {} {} {}",
            now.format("%d-%m-%Y"),
            now.format("%H:%M"),
            self.user,
            action.as_str(),
            kind.as_str(),
            description,
        );
        if let Err(e) = self.append_line(&line) {
            tracing::warn!("[journal] cannot append to {}: {}", self.path.display(), e);
            return;
        }
        self.mirror(remote);
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(f, "{}", line)
    }

    /// Upload the entire local journal to `scb.log` in the remote CWD.
    /// If this fails the local entry survives and the next successful
    /// journaled event re-uploads the whole history.
    fn mirror(&self, remote: &mut dyn RemoteStore) {
        let mut f = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("[journal] cannot reopen {}: {}", self.path.display(), e);
                return;
            }
        };
        if let Err(e) = remote.store(&mut f, JOURNAL_FILE) {
            tracing::warn!("[journal] remote mirror failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::{MockRemote, RemoteTree};

    #[test]
    fn creates_header_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _ = Journal::with_user(dir.path(), "test".into()).expect("open");
        let body = std::fs::read_to_string(dir.path().join(JOURNAL_FILE)).expect("read");
        assert!(body.starts_with("Log iniciado - "));
        // reopening does not add a second header
        let _ = Journal::with_user(dir.path(), "test".into()).expect("reopen");
        let again = std::fs::read_to_string(dir.path().join(JOURNAL_FILE)).expect("read");
        assert_eq!(body, again);
    }

    #[test]
    fn entry_format_and_mirror() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut journal = Journal::with_user(dir.path(), "marcos".into()).expect("open");
        let tree = RemoteTree::shared();
        let mut remote = MockRemote::connect(tree.clone());

        journal.record(&mut remote, Action::Uploaded, Kind::Archivo, "hello.txt");
        journal.record(&mut remote, Action::Created, Kind::Carpeta, "a");

        let body = std::fs::read_to_string(journal.path()).expect("read");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("el usuario marcos uploaded archivo hello.txt"));
        assert!(lines[2].ends_with("el usuario marcos created carpeta a"));

        // the remote CWD holds the full journal after the last event
        let t = tree.lock().unwrap();
        let mirrored = t.files.get("/scb.log").expect("mirrored journal");
        assert_eq!(String::from_utf8_lossy(&mirrored.data), body);
    }

    #[test]
    fn mirror_failure_keeps_local_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut journal = Journal::with_user(dir.path(), "marcos".into()).expect("open");
        let tree = RemoteTree::shared();
        let mut remote = MockRemote::connect(tree);
        remote.kill();

        journal.record(&mut remote, Action::Downloaded, Kind::Archivo, "a.bin");
        let body = std::fs::read_to_string(journal.path()).expect("read");
        assert!(body.ends_with("downloaded archivo a.bin\n"));
    }
}
