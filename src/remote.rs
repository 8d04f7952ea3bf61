use std::io::{Read, Write};

use crate::error::SyncError;

pub mod ftp;
pub mod mock;

/// Trait abstracting the remote store session used by the reconciler and
/// the transfer unit. The production implementation adapts these onto an
/// FTP control connection; tests inject the in-memory store from `mock`.
/// Remote paths use `/` exclusively; the local/host separator conversion
/// happens before paths reach this seam.
pub trait RemoteStore: Send {
    /// Basenames (or server-dependent full paths) of the entries in `dir`.
    fn list(&mut self, dir: &str) -> Result<Vec<String>, SyncError>;
    /// Change into `dir`. Failing with a non-connection error is the
    /// directory test: the entry is then treated as a file.
    fn chdir(&mut self, dir: &str) -> Result<(), SyncError>;
    /// Return to the parent directory.
    fn updir(&mut self) -> Result<(), SyncError>;
    fn mkdir(&mut self, dir: &str) -> Result<(), SyncError>;
    /// Remote working directory as reported by the server.
    fn pwd(&mut self) -> Result<String, SyncError>;
    /// Modification time of `file` as a UTC epoch; Ok(None) when the server
    /// reports a not-found condition.
    fn mtime(&mut self, file: &str) -> Result<Option<i64>, SyncError>;
    fn set_mtime(&mut self, file: &str, epoch: i64) -> Result<(), SyncError>;
    /// Size in bytes, or Ok(None) when the server cannot report one.
    fn size(&mut self, file: &str) -> Result<Option<u64>, SyncError>;
    /// Retrieve `file` in binary mode into `sink`; returns bytes written.
    fn retrieve(&mut self, file: &str, sink: &mut dyn Write) -> Result<u64, SyncError>;
    /// Store `source` in binary mode at `file`; returns bytes read.
    fn store(&mut self, source: &mut dyn Read, file: &str) -> Result<u64, SyncError>;
    fn delete(&mut self, file: &str) -> Result<(), SyncError>;
    fn rename(&mut self, from: &str, to: &str) -> Result<(), SyncError>;
    /// Liveness probe; an error means the connection is dead.
    fn noop(&mut self) -> Result<(), SyncError>;
    fn quit(&mut self) -> Result<(), SyncError>;
}
