use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::Version;
use crate::decode::LabelStyle;
use crate::encode::{EncodeOptions, DEFAULT_PRODUCT_ID};
use crate::sheet::OutputFormat;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "vcfsheet";

/// Effective settings after merging the optional config file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// File the settings came from, if one was read.
    pub config_path: Option<PathBuf>,
    pub version: Version,
    pub phone_region: Option<String>,
    pub product_id: String,
    pub decode: DecodeConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeConfig {
    pub labels: LabelStyle,
    pub format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            version: Version::default(),
            phone_region: None,
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            decode: DecodeConfig::default(),
        }
    }
}

impl Config {
    /// Encoder options for `version`, carrying the configured region and PRODID.
    pub fn encode_options(&self, version: Version) -> EncodeOptions {
        EncodeOptions {
            version,
            phone_region: self.phone_region.clone(),
            product_id: self.product_id.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    version: Option<String>,
    phone_region: Option<String>,
    product_id: Option<String>,
    decode: DecodeFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecodeFile {
    labels: Option<LabelStyle>,
    format: Option<OutputFormat>,
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Load settings. An explicit path must exist; the default location is
/// optional and falls back to built-in defaults when absent.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("configuration file not found at {}", path.display());
            }
            path.to_path_buf()
        }
        None => match config_path() {
            Ok(path) if path.exists() => path,
            Ok(path) => {
                debug!(path = %path.display(), "no configuration file; using defaults");
                return Ok(Config::default());
            }
            Err(err) => {
                debug!(error = %err, "no configuration directory; using defaults");
                return Ok(Config::default());
            }
        },
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
    let mut config =
        parse(&raw).with_context(|| format!("invalid configuration in {}", path.display()))?;
    config.config_path = Some(path);
    Ok(config)
}

/// Parse config TOML text into effective settings.
pub fn parse(raw: &str) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw).context("failed to parse configuration as TOML")?;

    for key in unknown_keys(&value) {
        warn!("unknown configuration key `{}`", key);
    }

    let cfg_file: ConfigFile = value
        .try_into()
        .context("failed to deserialize configuration")?;

    let version = match cfg_file.version.as_deref().map(str::trim) {
        Some(tag) if !tag.is_empty() => tag
            .parse::<Version>()
            .with_context(|| "invalid `version` in configuration")?,
        _ => Version::default(),
    };

    let phone_region = cfg_file
        .phone_region
        .as_ref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_uppercase());

    let product_id = cfg_file
        .product_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PRODUCT_ID.to_string());

    Ok(Config {
        config_path: None,
        version,
        phone_region,
        product_id,
        decode: DecodeConfig {
            labels: cfg_file.decode.labels.unwrap_or_default(),
            format: cfg_file.decode.format.unwrap_or_default(),
        },
    })
}

fn unknown_keys(value: &toml::Value) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };

    let known = HashSet::from(["version", "phone_region", "product_id", "decode"]);
    let mut unknown: Vec<String> = table
        .keys()
        .filter(|key| !known.contains(key.as_str()))
        .cloned()
        .collect();

    if let Some(decode) = table.get("decode").and_then(|v| v.as_table()) {
        let known_decode = HashSet::from(["labels", "format"]);
        unknown.extend(
            decode
                .keys()
                .filter(|key| !known_decode.contains(key.as_str()))
                .map(|key| format!("decode.{key}")),
        );
    }

    unknown
}
