use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_dir: String,
    pub database_url: String,
    /// Base URL under which stored media is reachable from outside.
    pub public_base_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video-sharing platform REST API")]
pub struct Args {
    /// Host to bind to (overrides VIDTUBE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDTUBE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where media objects are stored (overrides VIDTUBE_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Database URL (overrides VIDTUBE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for media links (overrides VIDTUBE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("VIDTUBE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("VIDTUBE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing VIDTUBE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading VIDTUBE_PORT"),
        };
        let env_media = env::var("VIDTUBE_MEDIA_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("VIDTUBE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/vidtube.db".into());

        let port = args.port.unwrap_or(env_port);
        let env_public = env::var("VIDTUBE_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            media_dir: args.media_dir.unwrap_or(env_media),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_public),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
