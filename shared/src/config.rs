use crate::error::ConfigError;
use crate::geometry::Constraint;
use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use aws_sdk_sqs as sqs;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;
pub const DEFAULT_UPLOAD_TTL: u64 = 15 * 60;
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct Config {
    /// Receives raw uploads through pre-signed URLs.
    pub upload_bucket: Option<String>,

    /// Holds finalized images, also the target of deletes.
    pub public_bucket: Option<String>,

    /// Originals read by the serve-time transforms.
    pub source_bucket: Option<String>,

    /// Crop and ratio variants are written here.
    pub destination_bucket: Option<String>,

    /// SQS queue url for callback messages.
    pub callback_queue: Option<String>,

    pub region: String,

    /// Overrides the S3 website endpoint used in redirects.
    pub public_base_url: Option<String>,

    pub constraint: Constraint,

    /// Lifetime of pre-signed upload urls, in seconds.
    pub upload_ttl: u64,

    /// `TEST` suppresses outbound webhook calls.
    pub environment: String,

    pub callback_auth: CallbackAuth,

    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct CallbackAuth {
    pub api_secret_key: Option<String>,
    pub api_username: Option<String>,
    pub api_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = Self::from_lookup(|name| env::var(name).ok())?;

        tracing::debug!(
            region = %cfg.region,
            environment = %cfg.environment,
            constraint = ?cfg.constraint,
            "config loaded"
        );

        Ok(cfg)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Ok(Config {
            upload_bucket: var("AWS_S3_BUCKET_UPLOAD"),
            public_bucket: var("AWS_S3_BUCKET_PUBLIC"),
            source_bucket: var("AWS_S3_BUCKET_SOURCE"),
            destination_bucket: var("AWS_S3_BUCKET_DESTINATION"),
            callback_queue: var("CALLBACK_QUEUE"),
            region: var("REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            public_base_url: var("PUBLIC_BASE_URL"),
            constraint: Constraint {
                max_width: positive("MAX_WIDTH", var("MAX_WIDTH"), DEFAULT_MAX_DIMENSION)?,
                max_height: positive("MAX_HEIGHT", var("MAX_HEIGHT"), DEFAULT_MAX_DIMENSION)?,
                max_bytes: positive("MAX_BYTES", var("MAX_BYTES"), DEFAULT_MAX_BYTES)?,
            },
            upload_ttl: parse_or("UPLOAD_TTL", var("UPLOAD_TTL"), DEFAULT_UPLOAD_TTL)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "local".to_string()),
            callback_auth: CallbackAuth {
                api_secret_key: var("API_SECRET_KEY"),
                api_username: var("API_USERNAME"),
                api_password: var("API_PASSWORD"),
            },
            staging_dir: var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
        })
    }

    pub fn upload_bucket(&self) -> Result<&str, ConfigError> {
        required(&self.upload_bucket, "AWS_S3_BUCKET_UPLOAD")
    }

    pub fn public_bucket(&self) -> Result<&str, ConfigError> {
        required(&self.public_bucket, "AWS_S3_BUCKET_PUBLIC")
    }

    pub fn source_bucket(&self) -> Result<&str, ConfigError> {
        required(&self.source_bucket, "AWS_S3_BUCKET_SOURCE")
    }

    pub fn destination_bucket(&self) -> Result<&str, ConfigError> {
        required(&self.destination_bucket, "AWS_S3_BUCKET_DESTINATION")
    }

    pub fn callback_queue(&self) -> Result<&str, ConfigError> {
        required(&self.callback_queue, "CALLBACK_QUEUE")
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "TEST"
    }

    /// Public location of `key` inside the destination bucket.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "http://{}.s3-website-{}.amazonaws.com/{}",
                bucket, self.region, key
            ),
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::Missing(name))
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let parsed = parse_or(name, value, default)?;

    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: parsed.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(parsed)
}

pub async fn get_s3_client() -> s3::Client {
    let cfg = aws_config::load_defaults(BehaviorVersion::latest()).await;

    s3::Client::new(&cfg)
}

pub async fn get_sqs_client() -> sqs::Client {
    let cfg = aws_config::load_defaults(BehaviorVersion::latest()).await;

    sqs::Client::new(&cfg)
}
