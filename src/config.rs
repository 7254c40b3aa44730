use anyhow::Context;
use camino::Utf8PathBuf;
use serde::{de, Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

fn deserialize_path<'de, D>(de: D) -> Result<Utf8PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = de::Deserialize::deserialize(de)?;
    Ok(Utf8PathBuf::from(s))
}

fn deserialize_url<'de, D>(de: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = de::Deserialize::deserialize(de)?;
    Url::parse(&s).map_err(de::Error::custom)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub storage: Storage,
    pub export: Export,
}

impl Config {
    /// Reads `$CONFIG`, or `config.yaml` when it is unset.
    pub fn read() -> anyhow::Result<Config> {
        Self::read_from(std::env::var("CONFIG").ok().map(Utf8PathBuf::from))
    }

    /// An explicitly named file must exist; only a missing implicit
    /// `config.yaml` yields the defaults.
    pub fn read_from(explicit: Option<Utf8PathBuf>) -> anyhow::Result<Config> {
        let config_path = match explicit {
            Some(path) => path,
            None => {
                let path = Utf8PathBuf::from("config.yaml");
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };

        let config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Reading config file {}", config_path))?;
        Self::parse(&config)
    }

    pub fn parse(config: &str) -> anyhow::Result<Config> {
        serde_yaml::from_str(config).context("Parsing config file")
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    #[serde(deserialize_with = "deserialize_url")]
    pub default_base_url: Url,
    pub user_agent: String,
    /// Unset means the HTTP stack's own behaviour.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            default_base_url: Url::parse(DEFAULT_SERVER_URL)
                .expect("hard-coded default url should be valid"),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Storage {
    #[serde(deserialize_with = "deserialize_path")]
    pub settings_path: Utf8PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            settings_path: Utf8PathBuf::from("qr-attendance.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Export {
    #[serde(deserialize_with = "deserialize_path")]
    pub cache_dir: Utf8PathBuf,
}

impl Default for Export {
    fn default() -> Self {
        let cache_dir = std::env::temp_dir().join(env!("CARGO_PKG_NAME"));
        Export {
            cache_dir: Utf8PathBuf::from_path_buf(cache_dir)
                .unwrap_or_else(|_| Utf8PathBuf::from("cache")),
        }
    }
}
