use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf};
use thiserror::Error;

pub const FEATURES_ENV: &str = "FEATURES";
pub const INPUT_BUCKET_ENV: &str = "INPUT_BUCKET";
pub const ANNOTATIONS_BUCKET_ENV: &str = "ANNOTATIONS_BUCKET";
pub const GCP_PROJECT_ENV: &str = "GCP_PROJECT";
pub const OUTPUT_BUCKET_ENV: &str = "OUTPUT_BUCKET";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Which entrypoint this process serves. One deployment = one target.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Online annotation plus the bucket browse API.
    AnnotateHttp,
    /// Storage-finalize subscriber writing `<image>.json` results.
    AnnotateGcs,
    /// Batch visual question answering over HTTP.
    VqaHttp,
    /// Storage-finalize subscriber writing `<image>.txt` answers.
    VqaGcs,
}

impl Target {
    fn parse(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(&value.replace('_', "-"), true).ok()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::AnnotateHttp => "annotate-http",
            Target::AnnotateGcs => "annotate-gcs",
            Target::VqaHttp => "vqa-http",
            Target::VqaGcs => "vqa-gcs",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

/// What to do when persisting a result fails in the event path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Log the failure and acknowledge the event.
    BestEffort,
    /// Fail the invocation so the platform can redeliver.
    Fail,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not defined")]
    Missing(&'static str),
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub target: Target,
    pub features: Option<String>,
    pub input_bucket: Option<String>,
    pub annotations_bucket: Option<String>,
    pub gcp_project: Option<String>,
    pub gcp_location: String,
    pub output_bucket: Option<String>,
    pub log_level: Option<String>,
    pub storage_backend: StorageBackend,
    pub local_storage_dir: PathBuf,
    pub storage_endpoint: String,
    pub vision_endpoint: String,
    pub vertex_endpoint: String,
    pub access_token: Option<String>,
    pub write_policy: WritePolicy,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Cloud Vision annotation functions")]
pub struct Args {
    /// Entrypoint to serve (overrides FUNCTION_TARGET)
    #[arg(long, value_enum)]
    pub target: Option<Target>,

    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Serve buckets from this directory instead of Cloud Storage
    #[arg(long)]
    pub local_storage_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::from_lookup(args, |key| env::var(key).ok())
    }

    /// Build the configuration from parsed args and a variable lookup.
    pub fn from_lookup<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env_target = match var("FUNCTION_TARGET") {
            Some(value) => Some(
                Target::parse(&value)
                    .with_context(|| format!("parsing FUNCTION_TARGET value `{}`", value))?,
            ),
            None => None,
        };
        let env_port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 8080,
        };
        let write_policy = match var("WRITE_FAILURE_POLICY").as_deref() {
            None | Some("best-effort") | Some("best_effort") => WritePolicy::BestEffort,
            Some("fail") => WritePolicy::Fail,
            Some(other) => anyhow::bail!("unknown WRITE_FAILURE_POLICY `{}`", other),
        };

        let env_storage_dir = var("LOCAL_STORAGE_DIR").map(PathBuf::from);
        let storage_backend = match (&args.local_storage_dir, var("STORAGE_BACKEND").as_deref()) {
            (Some(_), _) | (None, Some("local")) => StorageBackend::Local,
            (None, None) | (None, Some("gcs")) => StorageBackend::Gcs,
            (None, Some(other)) => anyhow::bail!("unknown STORAGE_BACKEND `{}`", other),
        };

        let gcp_location = var("GCP_LOCATION").unwrap_or_else(|| "us-central1".into());
        let vertex_endpoint = var("VERTEX_ENDPOINT")
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", gcp_location));

        Ok(Self {
            host: args.host.or_else(|| var("HOST")).unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            target: args.target.or(env_target).unwrap_or(Target::AnnotateHttp),
            features: lookup(FEATURES_ENV),
            input_bucket: var(INPUT_BUCKET_ENV),
            annotations_bucket: var(ANNOTATIONS_BUCKET_ENV),
            gcp_project: var(GCP_PROJECT_ENV),
            gcp_location,
            output_bucket: var(OUTPUT_BUCKET_ENV),
            log_level: var(LOG_LEVEL_ENV),
            storage_backend,
            local_storage_dir: args
                .local_storage_dir
                .or(env_storage_dir)
                .unwrap_or_else(|| PathBuf::from("./data/buckets")),
            storage_endpoint: var("STORAGE_ENDPOINT")
                .unwrap_or_else(|| "https://storage.googleapis.com".into()),
            vision_endpoint: var("VISION_ENDPOINT")
                .unwrap_or_else(|| "https://vision.googleapis.com".into()),
            vertex_endpoint,
            access_token: var("GOOGLE_OAUTH_ACCESS_TOKEN"),
            write_policy,
        })
    }

    /// Fail fast when the selected target is missing a required variable.
    pub fn validate_for_target(&self) -> Result<(), ConfigError> {
        match self.target {
            Target::AnnotateHttp => {
                self.input_bucket()?;
                self.annotations_bucket()?;
            }
            Target::AnnotateGcs => {
                self.annotations_bucket()?;
            }
            Target::VqaHttp | Target::VqaGcs => {
                self.gcp_project()?;
                self.output_bucket()?;
            }
        }
        Ok(())
    }

    pub fn input_bucket(&self) -> Result<&str, ConfigError> {
        self.input_bucket
            .as_deref()
            .ok_or(ConfigError::Missing(INPUT_BUCKET_ENV))
    }

    pub fn annotations_bucket(&self) -> Result<&str, ConfigError> {
        self.annotations_bucket
            .as_deref()
            .ok_or(ConfigError::Missing(ANNOTATIONS_BUCKET_ENV))
    }

    pub fn gcp_project(&self) -> Result<&str, ConfigError> {
        self.gcp_project
            .as_deref()
            .ok_or(ConfigError::Missing(GCP_PROJECT_ENV))
    }

    pub fn output_bucket(&self) -> Result<&str, ConfigError> {
        self.output_bucket
            .as_deref()
            .ok_or(ConfigError::Missing(OUTPUT_BUCKET_ENV))
    }

    /// Tracing filter derived from `LOG_LEVEL`; logging is off when unset.
    ///
    /// Accepts Python-style level names as well as tracing directives.
    pub fn log_filter(&self) -> String {
        let Some(level) = self.log_level.as_deref() else {
            return "off".into();
        };
        match level.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => "debug".into(),
            "INFO" => "info".into(),
            "WARN" | "WARNING" => "warn".into(),
            "ERROR" | "CRITICAL" | "FATAL" => "error".into(),
            "TRACE" => "trace".into(),
            "NOTSET" => "trace".into(),
            _ => level.trim().to_string(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_lookup(Args::default(), |key| match key {
        INPUT_BUCKET_ENV => Some("images".into()),
        ANNOTATIONS_BUCKET_ENV => Some("annotations".into()),
        GCP_PROJECT_ENV => Some("demo-project".into()),
        OUTPUT_BUCKET_ENV => Some("answers".into()),
        _ => None,
    })
    .expect("test config")
}
