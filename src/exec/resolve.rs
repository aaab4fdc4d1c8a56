//! Executable path resolution with a TTL cache.
//!
//! Bare command names (no path separator) are resolved by checking, in order:
//! a cached prior resolution, a fixed list of common installation directories,
//! then each entry of the current `PATH`. Cached entries expire after five
//! minutes and are also dropped when the environment fingerprint changes or
//! when a run through the cached path fails.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::error::FetchError;

/// How long a cached resolution stays valid
const CACHE_TTL: Duration = Duration::from_secs(300);

/// A resolved executable path
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Absolute path to the executable
    pub path: PathBuf,
    /// Whether this came from the cache (vs. a fresh lookup)
    pub from_cache: bool,
}

/// Cached resolution entry
#[derive(Debug, Clone)]
struct CachedPath {
    path: PathBuf,
    resolved_at: Instant,
    fingerprint: String,
}

/// Resolver for bare command names with a TTL cache
pub struct PathResolver {
    cache: Mutex<HashMap<String, CachedPath>>,
    ttl: Duration,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    /// Create a resolver with the default cache TTL (5 minutes)
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// Create a resolver with a custom TTL
    #[cfg(test)]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Resolve a command to an absolute executable path.
    ///
    /// Commands containing a path separator bypass resolution and are only
    /// checked for existence and an executable bit.
    pub fn resolve(&self, command: &str) -> Result<Resolved, FetchError> {
        if command.contains('/') {
            let path = PathBuf::from(command);
            if is_executable(&path) {
                return Ok(Resolved {
                    path,
                    from_cache: false,
                });
            }
            return Err(FetchError::CommandNotFound(command.to_string()));
        }

        let fingerprint = env_fingerprint();

        // Cached resolution, if still fresh and the environment is unchanged
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(command) {
                if entry.resolved_at.elapsed() < self.ttl && entry.fingerprint == fingerprint {
                    return Ok(Resolved {
                        path: entry.path.clone(),
                        from_cache: true,
                    });
                }
            }
        }

        let path = lookup(command).ok_or_else(|| FetchError::CommandNotFound(command.to_string()))?;

        self.cache.lock().insert(
            command.to_string(),
            CachedPath {
                path: path.clone(),
                resolved_at: Instant::now(),
                fingerprint,
            },
        );

        Ok(Resolved {
            path,
            from_cache: false,
        })
    }

    /// Drop the cached entry for a command (e.g., after a failed run)
    pub fn invalidate(&self, command: &str) {
        self.cache.lock().remove(command);
    }
}

/// Fingerprint of the environment bits that influence resolution.
///
/// A change in any of these invalidates cached paths: the PATH itself, the
/// home directory, and the node version manager markers (ccusage is typically
/// installed under an nvm/volta-managed prefix).
fn env_fingerprint() -> String {
    let path = std::env::var("PATH").unwrap_or_default();
    let home = std::env::var("HOME").unwrap_or_default();
    let nvm = std::env::var("NVM_BIN").unwrap_or_default();
    let volta = std::env::var("VOLTA_HOME").unwrap_or_default();
    format!("{path}|{home}|{nvm}|{volta}")
}

/// Fresh lookup: fixed install directories first, then PATH entries
fn lookup(command: &str) -> Option<PathBuf> {
    for dir in common_dirs() {
        let candidate = dir.join(command);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(command);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

/// Common installation directories checked before the PATH scan
fn common_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        PathBuf::from("/bin"),
    ];

    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".local/bin"));
        dirs.push(home.join(".npm-global/bin"));
        dirs.push(home.join(".volta/bin"));
        dirs.push(home.join(".bun/bin"));
    }

    dirs
}

/// Check that a path exists, is a file, and carries an executable bit
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
