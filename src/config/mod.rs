//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::assembler::MissingFragmentPolicy;

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "prerender";
const ENV_PREFIX: &str = "PRERENDER";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RENDERER_ENDPOINT: &str = "http://localhost:3001/";
const DEFAULT_RENDERER_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PUBLIC_URL: &str = "https://example.com/";
const DEFAULT_STATIC_DIR: &str = "static";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub renderer: RendererSettings,
    pub pages: PagesSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Where the rendering service listens and how long any single call may take.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub endpoint: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PagesSettings {
    pub missing_fragment: MissingFragmentPolicy,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub public_url: Url,
    pub static_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_renderer_overrides(&args.renderer),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    renderer: RawRendererSettings,
    pages: RawPagesSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(policy) = overrides.pages_missing_fragment.as_ref() {
            self.pages.missing_fragment = Some(policy.clone());
        }
        if let Some(url) = overrides.site_public_url.as_ref() {
            self.site.public_url = Some(url.clone());
        }
        if let Some(dir) = overrides.site_static_dir.as_ref() {
            self.site.static_dir = Some(dir.clone());
        }

        self.apply_renderer_overrides(&overrides.renderer);
    }

    fn apply_renderer_overrides(&mut self, overrides: &RendererOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.renderer.endpoint = Some(endpoint.clone());
        }
        if let Some(timeout) = overrides.timeout_ms {
            self.renderer.timeout_ms = Some(timeout);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            renderer,
            pages,
            site,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            renderer: build_renderer_settings(renderer)?,
            pages: build_pages_settings(pages)?,
            site: build_site_settings(site)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let endpoint = renderer
        .endpoint
        .unwrap_or_else(|| DEFAULT_RENDERER_ENDPOINT.to_string());
    let endpoint = parse_base_url(&endpoint)
        .map_err(|reason| LoadError::invalid("renderer.endpoint", reason))?;

    let timeout_ms = renderer.timeout_ms.unwrap_or(DEFAULT_RENDERER_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "renderer.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RendererSettings {
        endpoint,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_pages_settings(pages: RawPagesSettings) -> Result<PagesSettings, LoadError> {
    let missing_fragment = match pages.missing_fragment {
        Some(value) => value
            .parse::<MissingFragmentPolicy>()
            .map_err(|reason| LoadError::invalid("pages.missing_fragment", reason))?,
        None => MissingFragmentPolicy::default(),
    };

    Ok(PagesSettings { missing_fragment })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let public_url = site
        .public_url
        .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
    let public_url = parse_base_url(&public_url)
        .map_err(|reason| LoadError::invalid("site.public_url", reason))?;

    let static_dir = site
        .static_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
    if static_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "site.static_dir",
            "path must not be empty",
        ));
    }

    Ok(SiteSettings {
        public_url,
        static_dir,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPagesSettings {
    missing_fragment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    public_url: Option<String>,
    static_dir: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse an http(s) base URL, normalising the path to end with `/` so relative joins
/// extend it instead of replacing its last segment.
fn parse_base_url(value: &str) -> Result<Url, String> {
    let trimmed = value.trim();
    let mut url = Url::parse(trimmed).map_err(|err| format!("invalid URL `{trimmed}`: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "unsupported scheme `{}` (expected http or https)",
            url.scheme()
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
