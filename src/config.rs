use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Which pair of store implementations the gateway wires at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Cloudinary for binaries, Firestore for metadata.
    Cloud,
    /// In-process stores; nothing leaves the machine.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown backend `{}` (expected cloud or memory)", other)),
        }
    }
}

/// Cloudinary account credentials.
#[derive(Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl CloudinaryCredentials {
    /// Parse a `cloudinary://<api_key>:<api_secret>@<cloud_name>` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("cloudinary://")
            .ok_or_else(|| anyhow!("CLOUDINARY_URL must start with cloudinary://"))?;
        let (auth, cloud) = rest
            .rsplit_once('@')
            .ok_or_else(|| anyhow!("CLOUDINARY_URL is missing `@<cloud_name>`"))?;
        let (api_key, api_secret) = auth
            .split_once(':')
            .ok_or_else(|| anyhow!("CLOUDINARY_URL is missing `<api_key>:<api_secret>`"))?;
        // Anything after the cloud name (`?secure=true`, a path) is ignored.
        let cloud_name = cloud
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
            .to_string();

        if api_key.is_empty() || api_secret.is_empty() || cloud_name.is_empty() {
            bail!("CLOUDINARY_URL has an empty component");
        }

        Ok(Self {
            cloud_name,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }
}

/// Where the Firestore client gets its project and credentials.
#[derive(Debug, Clone)]
pub struct FirestoreSettings {
    pub credentials_path: PathBuf,
    pub project_id: Option<String>,
    pub emulator_host: Option<String>,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub backend: Backend,
    pub max_upload_bytes: usize,
    pub collection: String,
    pub media_folder: String,
    pub default_image_limit: usize,
    pub jpeg_quality: u8,
    pub trusted_proxies: usize,
    pub cloudinary: Option<CloudinaryCredentials>,
    pub firestore: FirestoreSettings,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Camera image gateway (Cloudinary + Firestore)")]
pub struct Args {
    /// Host to bind to (overrides CAMGATE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CAMGATE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Verbose logging (overrides CAMGATE_DEBUG)
    #[arg(long)]
    pub debug: bool,

    /// Store backend (overrides CAMGATE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Largest accepted image in bytes (overrides CAMGATE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Firestore collection holding image records (overrides CAMGATE_COLLECTION)
    #[arg(long)]
    pub collection: Option<String>,

    /// Root Cloudinary folder (overrides CAMGATE_MEDIA_FOLDER)
    #[arg(long)]
    pub media_folder: Option<String>,

    /// Service-account key file (overrides GOOGLE_APPLICATION_CREDENTIALS)
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("CAMGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port: u16 = env_parse("CAMGATE_PORT", 5000)?;
        let env_debug: bool = env_parse("CAMGATE_DEBUG", false)?;
        let env_backend: Backend = env_parse("CAMGATE_BACKEND", Backend::Cloud)?;
        let env_max_upload: usize = env_parse("CAMGATE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let env_collection = env::var("CAMGATE_COLLECTION").unwrap_or_else(|_| "images".into());
        let env_folder = env::var("CAMGATE_MEDIA_FOLDER").unwrap_or_else(|_| "esp32_images".into());
        let env_credentials = env::var("GOOGLE_APPLICATION_CREDENTIALS")
            .unwrap_or_else(|_| "firebase-service-account-key.json".into());

        let default_image_limit: usize = env_parse("CAMGATE_DEFAULT_IMAGE_LIMIT", 50)?;
        if default_image_limit == 0 {
            bail!("CAMGATE_DEFAULT_IMAGE_LIMIT must be greater than 0");
        }
        let jpeg_quality: u8 = env_parse("CAMGATE_JPEG_QUALITY", 85)?;
        if !(1..=100).contains(&jpeg_quality) {
            bail!("CAMGATE_JPEG_QUALITY must be between 1 and 100");
        }

        let backend = args.backend.unwrap_or(env_backend);
        let cloudinary = cloudinary_from_env()?;
        if backend == Backend::Cloud && cloudinary.is_none() {
            bail!(
                "Cloudinary credentials missing: set CLOUDINARY_URL or \
                 CLOUDINARY_CLOUD_NAME/CLOUDINARY_API_KEY/CLOUDINARY_API_SECRET"
            );
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            debug: args.debug || env_debug,
            backend,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            collection: args.collection.unwrap_or(env_collection),
            media_folder: args.media_folder.unwrap_or(env_folder),
            default_image_limit,
            jpeg_quality,
            trusted_proxies: env_parse("CAMGATE_TRUSTED_PROXIES", 0)?,
            cloudinary,
            firestore: FirestoreSettings {
                credentials_path: args.credentials.unwrap_or_else(|| env_credentials.into()),
                project_id: env::var("FIRESTORE_PROJECT_ID").ok(),
                emulator_host: env::var("FIRESTORE_EMULATOR_HOST").ok(),
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn cloudinary_from_env() -> Result<Option<CloudinaryCredentials>> {
    if let Ok(url) = env::var("CLOUDINARY_URL") {
        return CloudinaryCredentials::from_url(&url).map(Some);
    }

    let parts = (
        env::var("CLOUDINARY_CLOUD_NAME"),
        env::var("CLOUDINARY_API_KEY"),
        env::var("CLOUDINARY_API_SECRET"),
    );
    match parts {
        (Ok(cloud_name), Ok(api_key), Ok(api_secret)) => Ok(Some(CloudinaryCredentials {
            cloud_name,
            api_key,
            api_secret,
        })),
        _ => Ok(None),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
