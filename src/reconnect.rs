use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::SyncError;
use crate::remote::RemoteStore;

/// Successful downloads allowed on one session before it is proactively
/// replaced. Some endpoints accumulate latent state or rate-limit
/// long-lived sessions.
pub const ROTATE_AFTER_DOWNLOADS: u32 = 50;

/// Well-known endpoint used to decide whether the network is back.
pub const NETWORK_PROBE_ADDR: &str = "8.8.8.8:53";
pub const NETWORK_WAIT_CEILING: Duration = Duration::from_secs(600);
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(5);

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Health-check + rebuild policy applied when the liveness probe fails:
/// wait for reachability up to the ceiling, then let the holder rebuild a
/// fresh session from config.
#[derive(Debug, Clone)]
pub struct Reconnector {
    pub probe_addr: String,
    pub ceiling: Duration,
    pub poll: Duration,
}

impl Default for Reconnector {
    fn default() -> Self {
        Reconnector {
            probe_addr: NETWORK_PROBE_ADDR.to_string(),
            ceiling: NETWORK_WAIT_CEILING,
            poll: NETWORK_POLL_INTERVAL,
        }
    }
}

impl Reconnector {
    /// Block until the probe endpoint accepts a TCP connection, polling at
    /// the configured interval. Signals fatal when the ceiling expires.
    pub fn wait_for_network(&self) -> Result<(), SyncError> {
        let deadline = Instant::now() + self.ceiling;
        loop {
            if probe_reachable(&self.probe_addr) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SyncError::NetworkDown(self.ceiling.as_secs()));
            }
            tracing::info!("[reconnect] network unreachable, polling {}", self.probe_addr);
            std::thread::sleep(self.poll);
        }
    }
}

fn probe_reachable(addr: &str) -> bool {
    let Ok(mut addrs) = addr.to_socket_addrs() else {
        return false;
    };
    let Some(sock) = addrs.next() else {
        return false;
    };
    TcpStream::connect_timeout(&sock, PROBE_CONNECT_TIMEOUT).is_ok()
}

pub type SessionFactory = Box<dyn FnMut() -> Result<Box<dyn RemoteStore>, SyncError>>;

/// Owns the live session plus the factory that rebuilds it from config.
/// The reconciler threads everything through this holder, so a replaced
/// session is observed by the whole walk (swap semantics).
pub struct SessionHolder {
    remote: Box<dyn RemoteStore>,
    factory: SessionFactory,
    reconnector: Reconnector,
    downloads_since_rotate: u32,
    rotations: u32,
}

impl SessionHolder {
    pub fn new(remote: Box<dyn RemoteStore>, factory: SessionFactory) -> SessionHolder {
        SessionHolder {
            remote,
            factory,
            reconnector: Reconnector::default(),
            downloads_since_rotate: 0,
            rotations: 0,
        }
    }

    pub fn with_reconnector(mut self, reconnector: Reconnector) -> SessionHolder {
        self.reconnector = reconnector;
        self
    }

    pub fn set_reconnector(&mut self, reconnector: Reconnector) {
        self.reconnector = reconnector;
    }

    pub fn remote(&mut self) -> &mut dyn RemoteStore {
        self.remote.as_mut()
    }

    /// Times the session has been replaced, for any reason.
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    pub fn downloads_since_rotate(&self) -> u32 {
        self.downloads_since_rotate
    }

    /// Probe the connection; on a dead session wait for the network and
    /// rebuild. Callers invoke this before any operation likely to
    /// fail-in-flight.
    pub fn ensure_alive(&mut self) -> Result<(), SyncError> {
        if self.remote.noop().is_ok() {
            return Ok(());
        }
        tracing::warn!("[reconnect] liveness probe failed, rebuilding session");
        self.reconnect()
    }

    /// Reactive replacement: the session is assumed dead.
    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        self.reconnector.wait_for_network()?;
        self.replace()
    }

    /// Count one successful download; at the threshold, proactively rotate
    /// the session and reset the counter.
    pub fn note_download(&mut self) -> Result<(), SyncError> {
        self.downloads_since_rotate += 1;
        if self.downloads_since_rotate >= ROTATE_AFTER_DOWNLOADS {
            tracing::info!(
                "[reconnect] rotating session after {} downloads",
                self.downloads_since_rotate
            );
            return self.replace();
        }
        Ok(())
    }

    fn replace(&mut self) -> Result<(), SyncError> {
        let fresh = (self.factory)()?;
        let mut old = std::mem::replace(&mut self.remote, fresh);
        let _ = old.quit();
        self.rotations += 1;
        self.downloads_since_rotate = 0;
        Ok(())
    }

    /// Close the live session, swallowing transport noise on the way out.
    pub fn quit(&mut self) {
        if let Err(e) = self.remote.quit() {
            tracing::debug!("[reconnect] quit: {}", e);
        }
    }
}
