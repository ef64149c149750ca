//! Layered configuration for the `fetchsink` binary.
//!
//! Values are merged, lowest precedence first, from built-in defaults, an
//! optional JSON file and `FETCHSINK_`-prefixed environment variables. Nested
//! keys use `__` in the environment, e.g. `FETCHSINK_POSTGRES__PASSWORD`.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use fetchsink_core::{
    DEFAULT_MAX_DEPTH, FlattenOptions, IdentifierRule, RequestSpec, ResponseFormat, RetryPolicy,
    StatusPolicy,
};
use fetchsink_data::{HttpTransportConfig, PostgresConfig};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};

use crate::CliError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FETCHSINK_CONFIG";
/// Configuration file read when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "fetchsink.json";
/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "FETCHSINK_";

/// String-typed keys taken verbatim from the environment.
///
/// figment's `Env` provider parses `123456` as an integer and `true` as a
/// boolean; these keys are re-read as raw text so credentials and names keep
/// their exact spelling, leading zeros included.
const VERBATIM_KEYS: &[&str] = &[
    "url",
    "identifier_param",
    "output_dir",
    "http.user_agent",
    "sqlite.path",
    "sqlite.table",
    "postgres.host",
    "postgres.user",
    "postgres.password",
    "postgres.database",
    "postgres.table",
];

/// A named string, used for query parameters and headers.
///
/// Lists keep their order through every configuration layer, which the
/// last-parameter identifier rule depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    /// Parameter or header name.
    pub name: String,
    /// Value sent verbatim.
    pub value: String,
}

impl Pair {
    /// Pair `name` with `value`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Total attempts per fetch; `1` disables retrying.
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let http = HttpTransportConfig::default();
        let retry = RetryPolicy::default();
        Self {
            timeout_secs: http.timeout.as_secs(),
            user_agent: http.user_agent,
            max_attempts: retry.max_attempts,
            backoff_ms: u64::try_from(retry.backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Which file artefacts to write under the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Write `<id>.json`, keeping any existing file.
    pub json: bool,
    /// Write `<id>.csv`, replacing any existing file.
    pub csv: bool,
    /// Write `<id>.xlsx`, replacing any existing file.
    pub xlsx: bool,
    /// Write the leading index column in CSV and XLSX exports.
    pub include_index: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            json: true,
            csv: true,
            xlsx: true,
            include_index: true,
        }
    }
}

/// Embedded store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    /// Append to the SQLite table.
    pub enabled: bool,
    /// Database file, created with its parent directories when absent.
    pub path: Utf8PathBuf,
    /// Table appended to, created on first write.
    pub table: String,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Utf8PathBuf::from("files/api.db"),
            table: "table_01".to_owned(),
        }
    }
}

/// Networked store settings. Disabled unless configured.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    /// Append to the PostgreSQL table.
    pub enabled: bool,
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Role to connect as.
    pub user: String,
    /// Expected from `FETCHSINK_POSTGRES__PASSWORD`.
    pub password: Option<String>,
    /// Database name.
    pub database: String,
    /// Table appended to, created on first write.
    pub table: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        let defaults = PostgresConfig::default();
        Self {
            enabled: false,
            host: defaults.host,
            port: defaults.port,
            user: defaults.user,
            password: None,
            database: defaults.database,
            table: "table_01".to_owned(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
        }
    }
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("table", &self.table)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Everything one run of the binary needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Endpoint fetched with a GET.
    pub url: String,
    /// Query parameters, in request order.
    pub params: Vec<Pair>,
    /// Extra request headers.
    pub headers: Vec<Pair>,
    /// How the response body is interpreted.
    pub format: ResponseFormat,
    /// Parameter naming the artefacts. Unset means the last parameter wins.
    pub identifier_param: Option<String>,
    /// Persist non-2xx responses instead of aborting.
    pub accept_any_status: bool,
    /// HTTP client and retry settings.
    pub http: HttpSettings,
    /// Deepest object nesting flattened into columns.
    pub max_depth: usize,
    /// Directory receiving the file artefacts.
    pub output_dir: Utf8PathBuf,
    /// File artefacts to write.
    pub outputs: OutputSettings,
    /// Embedded store sink.
    pub sqlite: SqliteSettings,
    /// Networked store sink.
    pub postgres: PostgresSettings,
    /// Read each relational table back after the run and log it.
    pub echo_tables: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: "https://api.datamuse.com/words".to_owned(),
            params: vec![Pair::new("rel_rhy", "forgetful")],
            headers: Vec::new(),
            format: ResponseFormat::Json,
            identifier_param: None,
            accept_any_status: false,
            http: HttpSettings::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            output_dir: Utf8PathBuf::from("files"),
            outputs: OutputSettings::default(),
            sqlite: SqliteSettings::default(),
            postgres: PostgresSettings::default(),
            echo_tables: true,
        }
    }
}

/// `postgres.password` -> `FETCHSINK_POSTGRES__PASSWORD`.
fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.replace('.', "__").to_ascii_uppercase())
}

impl AppConfig {
    /// Load from the file named by [`CONFIG_ENV`] (or [`DEFAULT_CONFIG_FILE`])
    /// and the environment.
    ///
    /// # Errors
    ///
    /// Fails when [`CONFIG_ENV`] names a missing file, when a layer does not
    /// deserialise, or when the merged values are invalid.
    pub fn load() -> Result<Self, CliError> {
        let path = match std::env::var(CONFIG_ENV) {
            Ok(explicit) => {
                let path = Utf8PathBuf::from(explicit);
                if !path.is_file() {
                    return Err(CliError::MissingConfigFile {
                        path,
                        env: CONFIG_ENV,
                    });
                }
                path
            }
            Err(_) => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        let config: Self = Self::figment(&path)
            .extract()
            .map_err(|err| CliError::Configuration(Box::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider stack; a missing file contributes nothing.
    pub fn figment(path: &Utf8Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path.as_std_path()))
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]));
        VERBATIM_KEYS.iter().fold(figment, |figment, key| {
            match std::env::var(env_var_name(key)) {
                Ok(value) => figment.merge(Serialized::default(key, value)),
                Err(_) => figment,
            }
        })
    }

    /// Reject values no run could succeed with.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), CliError> {
        let invalid = |field, reason| Err(CliError::InvalidConfig { field, reason });
        if self.url.trim().is_empty() {
            return invalid("url", "must not be empty");
        }
        if self.max_depth == 0 {
            return invalid("max_depth", "must be at least 1");
        }
        if self.sqlite.enabled && self.sqlite.table.is_empty() {
            return invalid("sqlite.table", "must not be empty");
        }
        if self.postgres.enabled && self.postgres.table.is_empty() {
            return invalid("postgres.table", "must not be empty");
        }
        let outputs = &self.outputs;
        if !(outputs.json
            || outputs.csv
            || outputs.xlsx
            || self.sqlite.enabled
            || self.postgres.enabled)
        {
            return invalid("outputs", "enable at least one sink");
        }
        Ok(())
    }

    /// The request to fetch.
    #[must_use]
    pub fn request(&self) -> RequestSpec {
        let mut request = RequestSpec::new(self.url.clone());
        for Pair { name, value } in &self.params {
            request = request.with_param(name.clone(), value.clone());
        }
        for Pair { name, value } in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        request
    }

    /// `identifier_param` as a rule; unset selects the last parameter.
    #[must_use]
    pub fn identifier_rule(&self) -> IdentifierRule {
        self.identifier_param
            .clone()
            .map_or(IdentifierRule::LastParameter, IdentifierRule::Parameter)
    }

    /// Whether non-2xx responses abort the run.
    #[must_use]
    pub const fn status_policy(&self) -> StatusPolicy {
        if self.accept_any_status {
            StatusPolicy::AcceptAny
        } else {
            StatusPolicy::RequireSuccess
        }
    }

    /// Transport settings from [`HttpSettings`].
    #[must_use]
    pub fn http_config(&self) -> HttpTransportConfig {
        HttpTransportConfig::default()
            .with_timeout(Duration::from_secs(self.http.timeout_secs))
            .with_user_agent(self.http.user_agent.clone())
    }

    /// Retry settings from [`HttpSettings`].
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http.max_attempts,
            Duration::from_millis(self.http.backoff_ms),
        )
    }

    /// Flattening limits for tabular sinks.
    #[must_use]
    pub const fn flatten_options(&self) -> FlattenOptions {
        FlattenOptions {
            max_depth: self.max_depth,
        }
    }

    /// Connection settings for the PostgreSQL backend.
    #[must_use]
    pub fn postgres_config(&self) -> PostgresConfig {
        let settings = &self.postgres;
        PostgresConfig {
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        }
    }
}
