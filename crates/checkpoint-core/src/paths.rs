use std::env;
use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const HOME_ENV: &str = "CHECKPOINT_HOME";

const DATA_DIR_NAME: &str = ".checkpoint";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Result<String, String> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(home);
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Ok(profile);
        }
    }

    Err("Home directory not set".to_string())
}

/// Resolve the data directory: an explicit override, then
/// `CHECKPOINT_HOME`, then `~/.checkpoint`.
pub fn data_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(dir) = override_dir {
        return Ok(dir);
    }
    if let Ok(dir) = env::var(HOME_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    get_home_dir().map(|home| PathBuf::from(home).join(DATA_DIR_NAME))
}
