//! Mount configuration: CLI flags (`clap`), merged with an optional TOML
//! file for anything a user would rather not retype on every mount.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// Mount a remote cloud store as a local directory tree.
#[derive(Parser, Debug)]
#[command(name = "cloudmount", about, version)]
pub struct CliArgs {
    /// Local directory to mount the filesystem at.
    pub mountpoint: PathBuf,

    /// Base URL of the remote object-store API.
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// API key used to authenticate with the remote.
    #[arg(long, env = "CLOUDMOUNT_API_KEY")]
    pub api_key: Option<String>,

    /// Directory used for staged (in-progress) file content.
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Path to the persisted catalog cache.
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Optional TOML config file merged under the CLI flags above.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run FUSE in the foreground instead of daemonizing.
    #[arg(long)]
    pub foreground: bool,
}

/// On-disk configuration file, every field optional so it can be partially
/// overridden by CLI flags.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub staging_dir: Option<PathBuf>,
    pub cache_file: Option<PathBuf>,
}

/// Fully resolved configuration the rest of the binary runs on.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub mountpoint: PathBuf,
    pub api_base_url: String,
    pub api_key: String,
    pub staging_dir: PathBuf,
    pub cache_file: PathBuf,
    pub foreground: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("parsing config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("missing required setting: {0} (pass it on the command line or in --config)")]
    Missing(&'static str),
}

impl MountConfig {
    pub fn resolve(args: CliArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.clone(), source })?
            }
            None => ConfigFile::default(),
        };

        let api_base_url = args
            .api_base_url
            .or(file.api_base_url)
            .ok_or(ConfigError::Missing("api_base_url"))?;
        let api_key = args.api_key.or(file.api_key).ok_or(ConfigError::Missing("api_key"))?;
        let staging_dir = args
            .staging_dir
            .or(file.staging_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("cloudmount-staging"));
        let cache_file = args
            .cache_file
            .or(file.cache_file)
            .unwrap_or_else(|| std::env::temp_dir().join("cloudmount-catalog.bin"));

        Ok(Self {
            mountpoint: args.mountpoint,
            api_base_url,
            api_key,
            staging_dir,
            cache_file,
            foreground: args.foreground,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_reported() {
        let args = CliArgs {
            mountpoint: PathBuf::from("/mnt/cloud"),
            api_base_url: Some("https://example.com".into()),
            api_key: None,
            staging_dir: None,
            cache_file: None,
            config: None,
            foreground: false,
        };
        assert!(matches!(MountConfig::resolve(args), Err(ConfigError::Missing("api_key"))));
    }
}
