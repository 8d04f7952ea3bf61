use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::ignore::ALWAYS_IGNORED;

pub const CONFIG_FILE: &str = "scb.config";
pub const OPTIONS_FILE: &str = "scb.options";

/// Connection settings from scb.config. Immutable after load.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(rename = "FTP")]
    pub ftp: FtpSection,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FtpSection {
    pub ftp_server: String,
    pub ftp_user: String,
    pub ftp_password: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, SyncError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigInvalid(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::ConfigInvalid(path.display().to_string(), e.to_string()))
    }

    /// Server address with the default control port appended when the
    /// config carries a bare hostname.
    pub fn addr(&self) -> String {
        if self.ftp.ftp_server.contains(':') {
            self.ftp.ftp_server.clone()
        } else {
            format!("{}:21", self.ftp.ftp_server)
        }
    }
}

/// User options from scb.options.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct SyncOptions {
    #[serde(default)]
    pub ignore_list: Vec<String>,
}

impl SyncOptions {
    /// Load the options file, creating it with the seed list when absent.
    pub fn load_or_seed(path: &Path) -> Result<SyncOptions, SyncError> {
        if !path.exists() {
            let seeded = SyncOptions {
                ignore_list: ALWAYS_IGNORED.iter().map(|s| s.to_string()).collect(),
            };
            let body = serde_json::to_string_pretty(&seeded)
                .map_err(|e| SyncError::ConfigInvalid(path.display().to_string(), e.to_string()))?;
            std::fs::write(path, body).map_err(|e| {
                SyncError::ConfigInvalid(path.display().to_string(), e.to_string())
            })?;
            println!("📄 options file created: {}", path.display());
            return Ok(seeded);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigInvalid(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::ConfigInvalid(path.display().to_string(), e.to_string()))
    }
}

/// The project root is the nearest ancestor of `start` holding scb.config.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    crate::util::find_in_ancestors(start, CONFIG_FILE)
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_shape() {
        let raw = r#"{ "FTP": { "ftp_server": "ftp.example.net",
                                "ftp_user": "marcos",
                                "ftp_password": "secret" } }"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, raw).expect("write");
        let cfg = Config::load(&path).expect("load");
        assert_eq!(cfg.ftp.ftp_server, "ftp.example.net");
        assert_eq!(cfg.addr(), "ftp.example.net:21");
    }

    #[test]
    fn explicit_port_is_kept() {
        let cfg = Config {
            ftp: FtpSection {
                ftp_server: "10.0.0.2:2121".into(),
                ftp_user: "u".into(),
                ftp_password: "p".into(),
            },
        };
        assert_eq!(cfg.addr(), "10.0.0.2:2121");
    }

    #[test]
    fn malformed_config_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, b"{ \"FTP\": { }").expect("write");
        assert!(matches!(Config::load(&path), Err(SyncError::ConfigInvalid(_, _))));
    }

    #[test]
    fn options_seeded_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(OPTIONS_FILE);
        let opts = SyncOptions::load_or_seed(&path).expect("seed");
        assert_eq!(opts.ignore_list, vec!["scb.log", "scb.config", "scb.options"]);
        assert!(path.exists());
        // second load reads the file back instead of rewriting it
        let reloaded = SyncOptions::load_or_seed(&path).expect("reload");
        assert_eq!(reloaded.ignore_list, opts.ignore_list);
    }

    #[test]
    fn project_root_found_from_subdirectory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), b"{}").expect("write");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        assert_eq!(find_project_root(&nested), Some(dir.path().to_path_buf()));
    }
}
