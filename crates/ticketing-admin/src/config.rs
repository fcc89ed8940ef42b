use anyhow::Context;
use std::{io::Read, path::Path, str::FromStr};

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub database: ticketing_db::Config,
    #[serde(default)]
    pub tracing: TracingConfig,
}

#[derive(serde::Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TracingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format {other:?}, expected compact, pretty or json"),
        }
    }
}

/// Reads `path` when it exists, otherwise builds the configuration from the
/// environment alone. Environment variables win over the file either way.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        let mut configuration = String::with_capacity(4096);
        std::fs::File::open(path)
            .with_context(|| format!("unable to open configuration file {}", path.display()))?
            .read_to_string(&mut configuration)
            .with_context(|| format!("unable to read configuration file {}", path.display()))?;
        let mut config = toml::from_str::<Config>(&configuration)
            .with_context(|| format!("unable to parse configuration file {}", path.display()))?;
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database.db_url = db_url;
        }
        config
            .database
            .apply_env()
            .context("applying TICKETING_DB_* overrides")?;
        config
    } else {
        Config {
            database: ticketing_db::Config::from_env()
                .with_context(|| format!("{} not found and environment incomplete", path.display()))?,
            tracing: TracingConfig::default(),
        }
    };
    if let Ok(format) = std::env::var("TICKETING_LOG_FORMAT") {
        config.tracing.format = format.parse().context("parsing TICKETING_LOG_FORMAT")?;
    }
    Ok(config)
}
