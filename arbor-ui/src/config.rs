use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("invalid origin: {0}")]
    Origin(#[from] url::ParseError),

    #[error("max tick {max:?} is shorter than the frame interval {base:?}")]
    TickRange { base: Duration, max: Duration },
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Frames per second while the application is busy; 0 falls back to the
    /// default.
    pub frame_rate: u32,
    /// Longest interval between two passes while idle.
    pub max_tick: Duration,
    /// Path prefix the application is served under, e.g. `/app`.
    pub root_prefix: String,
    /// URL the page starts at.
    pub origin: String,
    /// `tracing` filter directive; `off` disables logging.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            max_tick: Duration::from_secs(1),
            root_prefix: String::new(),
            origin: "http://localhost/".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Interval between passes while there is work to do.
    pub fn base_tick(&self) -> Duration {
        let rate = if self.frame_rate == 0 {
            DEFAULT_FRAME_RATE
        } else {
            self.frame_rate
        };
        Duration::from_secs(1) / rate
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.origin)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;
        let base = self.base_tick();
        if self.max_tick < base {
            return Err(ConfigError::TickRange {
                base,
                max: self.max_tick,
            });
        }
        Ok(())
    }

    /// Reads `{PREFIX}_FRAME_RATE`, `{PREFIX}_MAX_TICK_MS`,
    /// `{PREFIX}_ROOT_PREFIX`, `{PREFIX}_ORIGIN` and `{PREFIX}_LOG_LEVEL`,
    /// after loading a `.env` file if there is one.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded .env file from {:?}", path),
            Err(err) => debug!("no .env file loaded: {}", err),
        }
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`EngineConfig::from_env`], over an explicit set of variables.
    pub fn from_vars<I>(prefix: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}_", prefix.trim_end_matches('_').to_uppercase());
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| Some((key.strip_prefix(&prefix)?.to_string(), value)))
            .collect();

        let mut config = Self::default();
        if let Some(value) = vars.get("FRAME_RATE") {
            config.frame_rate = parse(&prefix, "FRAME_RATE", value)?;
        }
        if let Some(value) = vars.get("MAX_TICK_MS") {
            config.max_tick = Duration::from_millis(parse(&prefix, "MAX_TICK_MS", value)?);
        }
        if let Some(value) = vars.get("ROOT_PREFIX") {
            config.root_prefix = value.clone();
        }
        if let Some(value) = vars.get("ORIGIN") {
            config.origin = value.clone();
        }
        if let Some(value) = vars.get("LOG_LEVEL") {
            config.log_level = value.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(prefix: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{prefix}{key}"),
        value: value.to_string(),
    })
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, falling back to
/// `level`. Does nothing if one is already installed or `level` is `off`.
pub fn init_logging(level: &str) {
    if level == "off" {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
