//! Configuration for the filegate server.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `FG__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `FG__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `FG__HTTP_ADDR=0.0.0.0:8888` sets the HTTP server address
//! - `FG__STORAGE__TYPE=filesystem` sets the storage type
//! - `FG__STORAGE__PATH=/data` sets the directory name
//! - `FG__UPLOAD_POLICY__SECRET=...` sets the policy signing secret
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:8888
//!
//! storage:
//!   type: filesystem
//!   path: /data
//!
//! upload_policy:
//!   secret: change-me
//!   ttl: 5m
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use filegate_service::DEFAULT_OPERATION_TIMEOUT;
use filegate_service::policy::DEFAULT_POLICY_TTL;
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "FG__";

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

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage backend (type `"filesystem"`).
    ///
    /// Stores objects as files below a directory. Suitable for development, testing, and
    /// single-server deployments.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /data
    /// ```
    FileSystem {
        /// Directory path for storing objects.
        ///
        /// The directory will be created if it doesn't exist. Relative paths are resolved from
        /// the server's working directory.
        ///
        /// # Default
        ///
        /// `"data"`
        path: PathBuf,
    },

    /// S3-compatible storage backend (type `"s3compatible"`).
    ///
    /// Sends unauthenticated requests to `{endpoint}/{bucket}/{key}`, which suits MinIO and
    /// emulators, or deployments where the network grants access.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: s3compatible
    ///   endpoint: http://localhost:9000
    ///   bucket: my-bucket
    /// ```
    S3Compatible {
        /// S3 endpoint URL.
        endpoint: String,
        /// Bucket name. The bucket must exist before starting the server.
        bucket: String,
    },

    /// [Google Cloud Storage] backend (type `"gcs"`).
    ///
    /// Authentication uses Application Default Credentials (ADC), which can be provided via the
    /// `GOOGLE_APPLICATION_CREDENTIALS` environment variable or the GCE/GKE metadata service.
    ///
    /// [Google Cloud Storage]: https://cloud.google.com/storage
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: gcs
    ///   bucket: filegate-bucket
    /// ```
    Gcs {
        /// Optional custom GCS endpoint URL.
        ///
        /// Useful for testing with emulators. If set, requests are sent without authentication.
        endpoint: Option<String>,
        /// GCS bucket name. The bucket must exist before starting the server.
        bucket: String,
    },
}

/// Signing configuration for upload policies.
///
/// The secret is handed to the storage backend at startup and never logged. The server refuses to
/// start without one.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Secret key for signing upload policies.
    ///
    /// # Environment Variable
    ///
    /// `FG__UPLOAD_POLICY__SECRET`
    pub secret: Option<SecretBox<ConfigSecret>>,

    /// Lifetime of an issued policy.
    ///
    /// Keep this short to bound the misuse of a leaked policy. Must be between one second and 24
    /// hours.
    ///
    /// # Default
    ///
    /// `5m`
    ///
    /// # Environment Variable
    ///
    /// `FG__UPLOAD_POLICY__TTL`
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            secret: None,
            ttl: DEFAULT_POLICY_TTL,
        }
    }
}

/// Storage service tuning.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Service {
    /// Upper bound for a single storage operation, after which it fails as unavailable.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Handling of files uploaded through the gateway.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Upload {
    /// Directory for spooling uploaded files before they are sent to the backend.
    ///
    /// Spooled files are removed once the request completes.
    ///
    /// # Default
    ///
    /// `None` (the system temporary directory)
    pub spool_dir: Option<PathBuf>,

    /// Maximum size of an upload request body in bytes.
    ///
    /// # Default
    ///
    /// `104857600` (100 MiB)
    pub max_size: usize,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            spool_dir: None,
            max_size: 100 * 1024 * 1024,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `FG__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. When `None`, Sentry integration is disabled.
    ///
    /// # Environment Variable
    ///
    /// `FG__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, such as `"production"`.
    pub environment: Option<Cow<'static, str>>,

    /// Server name or identifier, such as the hostname or pod name.
    pub server_name: Option<Cow<'static, str>>,

    /// Error event sample rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0`
    pub sample_rate: f32,

    /// Transaction sample rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `0.01`
    pub traces_sample_rate: f32,

    /// Enables the Sentry SDK debug output.
    pub debug: bool,
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
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
            debug: false,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
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
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// # Default
    ///
    /// `info`
    ///
    /// # Environment Variable
    ///
    /// `FG__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the filegate server.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:8888`
    ///
    /// # Environment Variable
    ///
    /// `FG__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// The storage backend all operations are delegated to.
    pub storage: Storage,

    /// Signing of upload policies.
    pub upload_policy: UploadPolicy,

    /// Storage service tuning.
    pub service: Service,

    /// Handling of files uploaded through the gateway.
    pub upload: Upload,

    /// Tokio runtime configuration.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8888".parse().unwrap(),
            storage: Storage::FileSystem {
                path: PathBuf::from("data"),
            },
            upload_policy: UploadPolicy::default(),
            service: Service::default(),
            upload: Upload::default(),
            runtime: Runtime::default(),
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
    /// 2. YAML configuration file (if provided in `path`)
    /// 3. Environment variables (prefixed with `FG__`)
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
