use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};

use crate::config::Config;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crate::transfer::TRANSFER_BLOCK;

/// Applied to the control connect and, via the socket, to every
/// subsequent command and data read/write.
pub const FTP_TIMEOUT_SECS: u64 = 60;

/// Production `RemoteStore` over an FTP control connection.
pub struct FtpRemote {
    ftp: FtpStream,
}

/// Open, authenticate and configure a session from scb.config: resolve the
/// address, connect with a timeout, login, passive mode, image (binary) type.
pub fn connect(config: &Config) -> Result<Box<dyn RemoteStore>, SyncError> {
    let addr = config.addr();
    let sock = addr
        .to_socket_addrs()
        .map_err(|e| SyncError::Connect(addr.clone(), e.to_string()))?
        .next()
        .ok_or_else(|| SyncError::Connect(addr.clone(), "address did not resolve".to_string()))?;
    let mut ftp = FtpStream::connect_timeout(sock, Duration::from_secs(FTP_TIMEOUT_SECS))
        .map_err(|e| SyncError::Connect(addr.clone(), e.to_string()))?;
    let _ = ftp.get_ref().set_read_timeout(Some(Duration::from_secs(FTP_TIMEOUT_SECS)));
    let _ = ftp.get_ref().set_write_timeout(Some(Duration::from_secs(FTP_TIMEOUT_SECS)));
    ftp.login(&config.ftp.ftp_user, &config.ftp.ftp_password)
        .map_err(|e| SyncError::Login(e.to_string()))?;
    ftp.set_mode(Mode::Passive);
    ftp.transfer_type(FileType::Binary)
        .map_err(|e| SyncError::Protocol(format!("TYPE I: {}", e)))?;
    Ok(Box::new(FtpRemote { ftp }))
}

/// Map an FTP error onto the sync taxonomy. 550 is the server's generic
/// "file unavailable": not-found for probes, not-a-directory for CWD.
fn classify(what: &str, e: FtpError) -> SyncError {
    match e {
        FtpError::ConnectionError(io) => SyncError::ConnectionLost(format!("{}: {}", what, io)),
        FtpError::UnexpectedResponse(resp) => match resp.status {
            Status::FileUnavailable => SyncError::RemoteMissing(what.to_string()),
            Status::NotLoggedIn | Status::StoringNeedAccount | Status::BadFilename => {
                SyncError::PermissionDenied(what.to_string())
            }
            Status::BadCommand | Status::NotImplemented => {
                SyncError::Unsupported(what.to_string())
            }
            other => SyncError::Protocol(format!("{}: {:?}", what, other)),
        },
        other => SyncError::ConnectionLost(format!("{}: {}", what, other)),
    }
}

impl RemoteStore for FtpRemote {
    fn list(&mut self, dir: &str) -> Result<Vec<String>, SyncError> {
        self.ftp.nlst(Some(dir)).map_err(|e| classify(dir, e))
    }

    fn chdir(&mut self, dir: &str) -> Result<(), SyncError> {
        match self.ftp.cwd(dir) {
            Ok(()) => Ok(()),
            Err(e) => match classify(dir, e) {
                // CWD against a file comes back 550
                SyncError::RemoteMissing(p) => Err(SyncError::NotADirectory(p)),
                other => Err(other),
            },
        }
    }

    fn updir(&mut self) -> Result<(), SyncError> {
        self.ftp.cdup().map_err(|e| classify("..", e))
    }

    fn mkdir(&mut self, dir: &str) -> Result<(), SyncError> {
        self.ftp.mkdir(dir).map_err(|e| classify(dir, e))
    }

    fn pwd(&mut self) -> Result<String, SyncError> {
        self.ftp.pwd().map_err(|e| classify("PWD", e))
    }

    fn mtime(&mut self, file: &str) -> Result<Option<i64>, SyncError> {
        match self.ftp.mdtm(file) {
            Ok(dt) => Ok(Some(dt.and_utc().timestamp())),
            Err(e) => match classify(file, e) {
                SyncError::RemoteMissing(_) => Ok(None),
                SyncError::ConnectionLost(ctx) => Err(SyncError::ConnectionLost(ctx)),
                other => {
                    // servers without MDTM: treat as unknown rather than failing the walk
                    tracing::warn!("[remote] MDTM failed for {}: {}", file, other);
                    Ok(None)
                }
            },
        }
    }

    fn set_mtime(&mut self, file: &str, epoch: i64) -> Result<(), SyncError> {
        let cmd = format!("MFMT {} {}", crate::mtime::format_mdtm(epoch), file);
        match self.ftp.custom_command(cmd, &[Status::File]) {
            Ok(_) => Ok(()),
            Err(e) => match classify(file, e) {
                SyncError::ConnectionLost(ctx) => Err(SyncError::ConnectionLost(ctx)),
                SyncError::RemoteMissing(p) => Err(SyncError::RemoteMissing(p)),
                other => Err(SyncError::Unsupported(format!("MFMT {}: {}", file, other))),
            },
        }
    }

    fn size(&mut self, file: &str) -> Result<Option<u64>, SyncError> {
        match self.ftp.size(file) {
            Ok(n) => Ok(Some(n as u64)),
            Err(e) => match classify(file, e) {
                SyncError::RemoteMissing(_) => Ok(None),
                SyncError::ConnectionLost(ctx) => Err(SyncError::ConnectionLost(ctx)),
                other => {
                    tracing::warn!("[remote] SIZE failed for {}: {}", file, other);
                    Ok(None)
                }
            },
        }
    }

    fn retrieve(&mut self, file: &str, sink: &mut dyn Write) -> Result<u64, SyncError> {
        let mut stream = self.ftp.retr_as_stream(file).map_err(|e| classify(file, e))?;
        let mut buf = [0u8; TRANSFER_BLOCK];
        let mut total = 0u64;
        loop {
            let n = stream
                .read(&mut buf)
                .map_err(|e| SyncError::ConnectionLost(format!("{}: {}", file, e)))?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])
                .map_err(|e| SyncError::Filesystem(file.to_string(), e.to_string()))?;
            total += n as u64;
        }
        self.ftp.finalize_retr_stream(stream).map_err(|e| classify(file, e))?;
        Ok(total)
    }

    fn store(&mut self, source: &mut dyn Read, file: &str) -> Result<u64, SyncError> {
        let mut stream = self.ftp.put_with_stream(file).map_err(|e| classify(file, e))?;
        let mut buf = [0u8; TRANSFER_BLOCK];
        let mut total = 0u64;
        loop {
            let n = source
                .read(&mut buf)
                .map_err(|e| SyncError::Filesystem(file.to_string(), e.to_string()))?;
            if n == 0 {
                break;
            }
            stream
                .write_all(&buf[..n])
                .map_err(|e| SyncError::ConnectionLost(format!("{}: {}", file, e)))?;
            total += n as u64;
        }
        self.ftp.finalize_put_stream(stream).map_err(|e| classify(file, e))?;
        Ok(total)
    }

    fn delete(&mut self, file: &str) -> Result<(), SyncError> {
        self.ftp.rm(file).map_err(|e| classify(file, e))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SyncError> {
        self.ftp.rename(from, to).map_err(|e| classify(from, e))
    }

    fn noop(&mut self) -> Result<(), SyncError> {
        self.ftp.noop().map_err(|e| classify("NOOP", e))
    }

    fn quit(&mut self) -> Result<(), SyncError> {
        self.ftp.quit().map_err(|e| classify("QUIT", e))
    }
}
