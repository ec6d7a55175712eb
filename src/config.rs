use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// The structure of our configuration file (config.toml)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Admitted requests per identity per 60-second window.
    pub rate_limit_rpm: u32,
    /// Upper bound on a single extraction run, in seconds.
    pub info_timeout_secs: u64,
    /// Connect timeout for upstream media fetches, in seconds.
    pub upstream_connect_timeout_secs: u64,
    /// Path to a Netscape cookies.txt handed to the extractor when present.
    pub cookies_path: String,
    /// Allowed CORS origins; "*" allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rate_limit_rpm: 30,
            info_timeout_secs: 30,
            upstream_connect_timeout_secs: 15,
            cookies_path: "cookies.txt".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Returns the cross-platform path to the configuration file, creating the directory if needed.
async fn get_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "AnyVid", "anyvid-api")
        .ok_or_else(|| anyhow!("Could not find a valid home directory to store config"))?;

    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir).await?;

    Ok(config_dir.join("config.toml"))
}

/// Loads the configuration from the file, or creates a default one if it doesn't exist.
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path().await?;

    if !config_path.exists() {
        tracing::info!(
            "No config file found. Creating a default one at: {}",
            config_path.display()
        );
        let default_config = Config::default();
        save_config(&default_config).await?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow!("Failed to parse config file at {}: {}", config_path.display(), e))?;

    Ok(config)
}

/// Saves the provided configuration object to the file.
pub async fn save_config(config: &Config) -> Result<()> {
    let config_path = get_config_path().await?;
    let toml_string = toml::to_string_pretty(config)?;
    fs::write(config_path, toml_string).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.rate_limit_rpm, 30);
        assert_eq!(parsed.info_timeout_secs, 30);
        assert_eq!(parsed.cors_origins, vec!["*".to_string()]);
    }
}
