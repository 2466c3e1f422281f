use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

fn home() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home))
    }
}

/// Base courier config directory (~/.config/courier/)
pub fn courier() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        Ok(home()?.join("courier"))
    }

    #[cfg(not(windows))]
    {
        Ok(home()?.join(".config").join("courier"))
    }
}

/// Global courier.json config file path
pub fn courier_json() -> Result<PathBuf> {
    Ok(courier()?.join("courier.json"))
}

/// Default artifact cache root (~/.cache/courier/artifacts)
pub fn artifact_cache() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        Ok(home()?.join("courier").join("cache").join("artifacts"))
    }

    #[cfg(not(windows))]
    {
        Ok(home()?.join(".cache").join("courier").join("artifacts"))
    }
}
