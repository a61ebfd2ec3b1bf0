use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the prerender binary.
#[derive(Debug, Parser)]
#[command(
    name = "prerender",
    version,
    about = "Page server that splices server-rendered web component fragments into HTML"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRERENDER_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the page server.
    Serve(Box<ServeArgs>),
    /// Render fragments through the rendering service and print the HTML.
    #[command(name = "render")]
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RendererOverrides {
    /// Override the rendering service base URL.
    #[arg(long = "renderer-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the deadline applied to every rendering service call.
    #[arg(long = "renderer-timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub renderer: RendererOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override how batch pages treat fragments that failed to render (omit|placeholder|fail).
    #[arg(long = "pages-missing-fragment", value_name = "POLICY")]
    pub pages_missing_fragment: Option<String>,

    /// Override the public site URL used for canonical links and the sitemap.
    #[arg(long = "site-public-url", value_name = "URL")]
    pub site_public_url: Option<String>,

    /// Override the directory served under /static.
    #[arg(long = "site-static-dir", value_name = "PATH")]
    pub site_static_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub renderer: RendererOverrides,

    /// Component tags to render; more than one tag is sent as a single batch.
    #[arg(value_name = "TAG", required = true, num_args = 1..)]
    pub tags: Vec<String>,

    /// JSON object of props applied to every tag.
    #[arg(long, value_name = "JSON")]
    pub props: Option<String>,

    /// Use the batch endpoint even for a single tag.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub batch: bool,
}
