//!
//! Platform-native path resolution for KeyRelay.
//!
//! Resolves configuration and data locations using the `directories` crate:
//! - Linux: XDG Base Directory specification
//! - macOS: Apple File System Programming Guide
//! - Windows: Known Folder API
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::error::{ProxyError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/* --- constants ------------------------------------------------------------------------------ */

/** application name used for directory names */
const APP_NAME: &str = "keyrelay";

/** organization qualifier for ProjectDirs */
const ORGANIZATION: &str = "com";

/** organization name for ProjectDirs */
const ORG_NAME: &str = "skycorp";

/* --- start of code -------------------------------------------------------------------------- */

///
/// Get the user configuration directory, creating it if missing.
///
/// - Linux: ~/.config/keyrelay/
/// - macOS: ~/Library/Application Support/keyrelay/
/// - Windows: %APPDATA%/keyrelay/
pub fn user_config_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    let config_dir = project_dirs.config_dir();

    ensure_directory_exists(config_dir)?;
    Ok(config_dir.to_path_buf())
}

///
/// Get the user data directory (holds the default sqlite database).
///
/// Creates the directory if it doesn't exist.
pub fn user_data_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    let data_dir = project_dirs.data_dir();

    ensure_directory_exists(data_dir)?;
    Ok(data_dir.to_path_buf())
}

/// System-wide configuration directory. Not created (requires admin privileges).
pub fn system_config_dir() -> Result<PathBuf> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Ok(PathBuf::from("/etc").join(APP_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Preferences").join(APP_NAME))
    }

    #[cfg(windows)]
    {
        std::env::var("PROGRAMDATA").map(|path| PathBuf::from(path).join(APP_NAME)).map_err(|_| {
            ProxyError::Config("PROGRAMDATA environment variable not found".to_string())
        })
    }
}

/// Path of the user configuration file (`config.toml` in [`user_config_dir`]).
pub fn user_config_file() -> Result<PathBuf> {
    Ok(user_config_dir()?.join("config.toml"))
}

/// Path of the system configuration file.
pub fn system_config_file() -> Result<PathBuf> {
    Ok(system_config_dir()?.join("config.toml"))
}

/// Path of the default sqlite key store.
pub fn default_database_file() -> Result<PathBuf> {
    Ok(user_data_dir()?.join("keyrelay.db"))
}

///
/// Expand tilde (~) and environment variables in file paths.
///
/// # Arguments
///  * `path` - Path string that may contain ~ or environment variables
///
/// # Returns
///  * `Ok(PathBuf)` - Expanded path
///  * `Err(ProxyError)` - Path expansion failed
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path_str = path.as_ref().to_string_lossy();

    if !path_str.contains('~') && !path_str.contains('$') {
        return Ok(path.as_ref().to_path_buf());
    }

    let expanded = shellexpand::full(&path_str).map_err(|e| {
        ProxyError::Config(format!(
            "Failed to expand environment variables in path '{}': {}",
            path_str, e
        ))
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

///
/// Check that a configuration file exists, is a regular file and is readable.
pub fn validate_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "Configuration file '{}' does not exist",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "Configuration path '{}' exists but is not a regular file",
            path.display()
        )));
    }

    std::fs::File::open(path).map_err(|e| {
        ProxyError::Config(format!(
            "Configuration file '{}' exists but cannot be read: {}\n\
             \n\
             Please check file permissions. You can fix this with: chmod 644 '{}'",
            path.display(),
            e,
            path.display()
        ))
    })?;

    Ok(())
}

/// Configuration file paths in precedence order (highest first).
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(user_config) = user_config_file() {
        paths.push(user_config);
    }

    if let Ok(system_config) = system_config_file() {
        paths.push(system_config);
    }

    paths
}

/* --- private functions ----------------------------------------------------------------------- */

fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(ORGANIZATION, ORG_NAME, APP_NAME).ok_or_else(|| {
        ProxyError::Config(
            "Unable to determine user directories. Please ensure your user account has a \
             valid home directory."
                .to_string(),
        )
    })
}

fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        if !path.is_dir() {
            return Err(ProxyError::Config(format!(
                "Path '{}' exists but is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        ProxyError::Config(format!("Failed to create directory '{}': {}", path.display(), e))
    })?;

    Ok(())
}

/* --- tests ----------------------------------------------------------------------------------- */
