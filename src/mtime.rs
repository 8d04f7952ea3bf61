use std::path::Path;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use filetime::FileTime;

/// The control protocol reports whole seconds and MFMT sets whole seconds,
/// while some filesystems carry subsecond mtimes. Comparing with slack
/// prevents ping-pong re-transfers of files that are already in sync.
pub const MTIME_TOLERANCE_SECS: i64 = 2;

/// Decide whether a file needs to be transferred. A missing timestamp on
/// either side (file absent there) always means "transfer".
pub fn needs_sync(ts_local: Option<i64>, ts_remote: Option<i64>, tolerance: i64) -> bool {
    match (ts_local, ts_remote) {
        (Some(l), Some(r)) => (l - r).abs() > tolerance,
        _ => true,
    }
}

/// Format a UTC epoch as the `YYYYMMDDhhmmss` string used by MFMT.
pub fn format_mdtm(epoch: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp(epoch, 0).unwrap_or_default();
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// Local file mtime as a UTC epoch, or None when the file does not exist.
pub fn local_mtime(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => Some(d.as_secs() as i64),
        Err(_) => Some(0),
    }
}

/// Apply `epoch` to `path` as both atime and mtime (whole seconds).
pub fn set_local_mtime(path: &Path, epoch: i64) -> std::io::Result<()> {
    let t = FileTime::from_unix_time(epoch, 0);
    filetime::set_file_times(path, t, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_side_always_syncs() {
        assert!(needs_sync(None, Some(100), MTIME_TOLERANCE_SECS));
        assert!(needs_sync(Some(100), None, MTIME_TOLERANCE_SECS));
        assert!(needs_sync(None, None, MTIME_TOLERANCE_SECS));
    }

    #[test]
    fn within_tolerance_is_in_sync() {
        // one second apart, tolerance two: no transfer in either direction
        assert!(!needs_sync(Some(1000), Some(1001), MTIME_TOLERANCE_SECS));
        assert!(!needs_sync(Some(1001), Some(1000), MTIME_TOLERANCE_SECS));
        assert!(!needs_sync(Some(1000), Some(1002), MTIME_TOLERANCE_SECS));
    }

    #[test]
    fn beyond_tolerance_syncs() {
        assert!(needs_sync(Some(1000), Some(1003), MTIME_TOLERANCE_SECS));
        assert!(needs_sync(Some(1003), Some(1000), MTIME_TOLERANCE_SECS));
    }

    #[test]
    fn mdtm_format_is_utc() {
        // 2024-01-01T10:00:00Z
        assert_eq!(format_mdtm(1_704_103_200), "20240101100000");
    }

    #[test]
    fn local_mtime_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("stamp.txt");
        std::fs::write(&file, b"x").expect("write");
        set_local_mtime(&file, 1_704_103_200).expect("set mtime");
        assert_eq!(local_mtime(&file), Some(1_704_103_200));
        assert_eq!(local_mtime(&dir.path().join("absent")), None);
    }
}
