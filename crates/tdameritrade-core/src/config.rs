use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

/// Overrides the platform configuration directory when set to a non-empty path.
pub const CONFIG_DIR_ENV: &str = "TDAMERITRADE_CONFIG_DIR";

/// Where stored credentials and pending login state live on disk.
///
/// Each profile gets a `credentials-<profile>.json` token file and a `state-<profile>` file for
/// the CSRF state of a login that has been started but not finished.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Resolve `$TDAMERITRADE_CONFIG_DIR`, falling back to the platform configuration directory,
    /// and make sure it exists and is private to the current user.
    pub fn new() -> Result<Self, ConfigError> {
        let root = match env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("com", "tdameritrade", "tdameritrade-rs")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or(ConfigError::MissingProjectDirs)?,
        };
        let locator = Self { root };
        locator.ensure_root()?;
        Ok(locator)
    }

    /// Use an explicit directory. Nothing is created until a store writes to it.
    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn credentials_file(&self, profile: &str) -> PathBuf {
        self.root.join(format!("credentials-{profile}.json"))
    }

    pub fn state_file(&self, profile: &str) -> PathBuf {
        self.root.join(format!("state-{profile}"))
    }

    fn ensure_root(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.root).map_err(|source| ConfigError::CreateDir {
            path: self.root.clone(),
            source,
        })?;
        restrict_to_owner(&self.root)
    }
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(|source| {
        ConfigError::Permissions {
            path: dir.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine a configuration directory; set {CONFIG_DIR_ENV}")]
    MissingProjectDirs,
    #[error("failed to create configuration directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to restrict permissions on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
