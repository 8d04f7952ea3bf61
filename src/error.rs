/// Repository-wide structured errors for synchronization operations.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// scb.config was not found in the current directory or any ancestor
    ConfigNotFound(String),
    /// config/options file exists but could not be read or parsed
    ConfigInvalid(String, String),
    // connection related
    Connect(String, String),
    Login(String),
    ConnectionLost(String),
    /// network reachability wait gave up after the given number of seconds
    NetworkDown(u64),
    RetriesExhausted(String),
    // per-entry remote failures
    RemoteMissing(String),
    NotADirectory(String),
    PermissionDenied(String),
    SizeMismatch { path: String, expected: u64, actual: u64 },
    Unsupported(String),
    Protocol(String),
    // local side
    Filesystem(String, String),
    Interrupted,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use SyncError::*;
        match self {
            ConfigNotFound(name) => {
                write!(f, "configuration file '{}' not found in any ancestor directory", name)
            }
            ConfigInvalid(path, msg) => write!(f, "invalid configuration {}: {}", path, msg),
            Connect(addr, msg) => write!(f, "cannot connect to {}: {}", addr, msg),
            Login(msg) => write!(f, "login rejected: {}", msg),
            ConnectionLost(ctx) => write!(f, "connection lost: {}", ctx),
            NetworkDown(secs) => {
                write!(f, "network unreachable after waiting {} seconds", secs)
            }
            RetriesExhausted(dir) => write!(f, "giving up on {} after repeated retries", dir),
            RemoteMissing(path) => write!(f, "remote path not found: {}", path),
            NotADirectory(path) => write!(f, "not a directory: {}", path),
            PermissionDenied(path) => write!(f, "permission denied: {}", path),
            SizeMismatch { path, expected, actual } => write!(
                f,
                "size mismatch for {}: expected {} bytes, got {}",
                path, expected, actual
            ),
            Unsupported(ctx) => write!(f, "command not supported by server: {}", ctx),
            Protocol(msg) => write!(f, "unexpected server reply: {}", msg),
            Filesystem(path, msg) => write!(f, "filesystem error on {}: {}", path, msg),
            Interrupted => write!(f, "operation cancelled by user"),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Connection-class errors bubble up to the reconnect boundary of the
    /// current directory walk; everything else is handled per entry.
    pub fn is_connection(&self) -> bool {
        use SyncError::*;
        matches!(self, Connect(_, _) | ConnectionLost(_))
    }

    /// Fatal errors abort the whole operation with exit code 1 instead of
    /// being logged and skipped.
    pub fn is_fatal(&self) -> bool {
        use SyncError::*;
        matches!(
            self,
            ConfigNotFound(_)
                | ConfigInvalid(_, _)
                | Login(_)
                | NetworkDown(_)
                | RetriesExhausted(_)
        )
    }
}
