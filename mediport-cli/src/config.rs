//! Configuration for the `mediport` command line client.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `MP__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `MP__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `MP__SERVICE_URL=https://mediport.example.com/api/` sets the backend URL
//! - `MP__LOGGING__FORMAT=json` switches to JSON logs
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! service_url: https://mediport.example.com/api/
//!
//! logging:
//!   format: json
//! ```

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "MP__";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// [Sentry](https://sentry.io/) error reporting configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided. Warnings and errors
/// logged by the client are then reported as events.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN (Data Source Name).
    ///
    /// # Default
    ///
    /// `None` (Sentry disabled)
    ///
    /// # Environment Variable
    ///
    /// `MP__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name, for example `"production"` or `"staging"`.
    ///
    /// # Environment Variable
    ///
    /// `MP__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Fraction of error events to send, between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0`
    ///
    /// # Environment Variable
    ///
    /// `MP__SENTRY__SAMPLE_RATE`
    pub sample_rate: f32,
}

impl Sentry {
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
        }
    }
}

/// Log output format.
///
/// Used in: [`Logging::format`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogFormat {
    /// Pretty output when stderr is a terminal, simplified output otherwise.
    Auto,

    /// Multi-line output with colors and source locations.
    Pretty,

    /// Single-line output without timestamps.
    Simplified,

    /// Newline-delimited JSON records.
    Json,
}

#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Auto => "auto",
            LogFormat::Pretty => "pretty",
            LogFormat::Simplified => "simplified",
            LogFormat::Json => "json",
        })
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are written to stderr so that command output on stdout stays machine readable. Setting
/// `RUST_LOG` overrides the level.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum level to log, for example `"debug"` or `"off"`.
    ///
    /// # Default
    ///
    /// `"warn"`
    ///
    /// # Environment Variable
    ///
    /// `MP__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Output format, see [`LogFormat`].
    ///
    /// # Default
    ///
    /// `"auto"`
    ///
    /// # Environment Variable
    ///
    /// `MP__LOGGING__FORMAT`
    #[serde(with = "display_fromstr")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the `mediport` client.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the MediPort backend.
    ///
    /// All endpoints are resolved relative to this URL, so it should end with a slash when the
    /// backend is mounted under a path prefix.
    ///
    /// # Default
    ///
    /// `"http://localhost:8000/"`
    ///
    /// # Environment Variable
    ///
    /// `MP__SERVICE_URL`
    pub service_url: String,

    /// Path of the file holding the session between invocations.
    ///
    /// # Default
    ///
    /// `".mediport/session.json"` (relative to the working directory)
    ///
    /// # Environment Variable
    ///
    /// `MP__SESSION_PATH`
    pub session_path: PathBuf,

    /// Connect and read timeout for backend requests.
    ///
    /// # Default
    ///
    /// `"10s"`
    ///
    /// # Environment Variable
    ///
    /// `MP__TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Password used by `mediport login` when `--password` is not given.
    ///
    /// # Environment Variable
    ///
    /// `MP__PASSWORD`
    pub password: Option<SecretBox<ConfigSecret>>,

    /// Logging configuration, see [`Logging`].
    pub logging: Logging,

    /// Sentry configuration, see [`Sentry`].
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8000/".to_owned(),
            session_path: PathBuf::from(".mediport/session.json"),
            timeout: Duration::from_secs(10),
            password: None,
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided in `args`)
    /// 3. Environment variables (prefixed with `MP__`)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML configuration file cannot be read or parsed, or if
    /// environment variables contain invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.service_url, "http://localhost:8000/");
            assert_eq!(config.session_path, Path::new(".mediport/session.json"));
            assert_eq!(config.timeout, Duration::from_secs(10));
            assert!(config.password.is_none());
            assert_eq!(config.logging.level, LevelFilter::WARN);
            assert!(!config.sentry.is_enabled());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MP__SERVICE_URL", "https://mediport.example.com/api/");
            jail.set_env("MP__TIMEOUT", "1m 30s");
            jail.set_env("MP__PASSWORD", "hunter2");
            jail.set_env("MP__LOGGING__LEVEL", "debug");
            jail.set_env("MP__LOGGING__FORMAT", "JSON");
            jail.set_env("MP__SENTRY__DSN", "abcde");
            jail.set_env("MP__SENTRY__SAMPLE_RATE", "0.5");
            jail.set_env("MP__SENTRY__ENVIRONMENT", "production");

            let config = Config::load(None).unwrap();

            assert_eq!(config.service_url, "https://mediport.example.com/api/");
            assert_eq!(config.timeout, Duration::from_secs(90));
            assert_eq!(
                config.password.unwrap().expose_secret().as_str(),
                "hunter2"
            );
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            assert_eq!(config.sentry.dsn.unwrap().expose_secret().as_str(), "abcde");
            assert_eq!(config.sentry.environment.as_deref(), Some("production"));
            assert_eq!(config.sentry.sample_rate, 0.5);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            service_url: http://10.0.0.5:8000/
            session_path: /var/lib/mediport/session.json
            timeout: 500ms
            logging:
                format: simplified
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.service_url, "http://10.0.0.5:8000/");
            assert_eq!(
                config.session_path,
                Path::new("/var/lib/mediport/session.json")
            );
            assert_eq!(config.timeout, Duration::from_millis(500));
            assert_eq!(config.logging.format, LogFormat::Simplified);
            assert_eq!(config.logging.level, LevelFilter::WARN);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            service_url: http://10.0.0.5:8000/
            timeout: 5s
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("MP__SERVICE_URL", "http://10.0.0.6:8000/");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.service_url, "http://10.0.0.6:8000/");
            assert_eq!(config.timeout, Duration::from_secs(5));

            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_format() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MP__LOGGING__FORMAT", "fancy");
            assert!(Config::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn secrets_are_redacted() {
        let config = Config {
            password: Some(SecretBox::new(Box::new("hunter2".into()))),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
