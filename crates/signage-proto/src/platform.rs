use std::path::PathBuf;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "SIGNAGE_CONFIG";

const APP_DIR: &str = "signage";

/// Logs and other runtime files. XDG layout on every unix, macOS included.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home_relative(&[".local", "share"])
    }
    #[cfg(not(unix))]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home_relative(&[".config"])
    }
    #[cfg(not(unix))]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn log_path() -> PathBuf {
    data_dir().join("player.log")
}

#[cfg(unix)]
fn home_relative(parts: &[&str]) -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    parts
        .iter()
        .fold(home, |dir, part| dir.join(part))
        .join(APP_DIR)
}
