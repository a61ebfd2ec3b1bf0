use std::{io, process, sync::Arc};

use prerender::{
    application::{
        assembler::PageAssembler,
        error::AppError,
        fragments::FragmentSource,
        pages::PageService,
        render::{self, RenderMode},
        sitemap::SitemapService,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        renderer::HttpFragmentClient,
        telemetry,
    },
};
use serde_json::Map;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let renderer: Arc<dyn FragmentSource> = Arc::new(HttpFragmentClient::new(&settings.renderer)?);
    let state = build_http_state(&settings, renderer);
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        addr = %settings.server.addr,
        renderer = %settings.renderer.endpoint,
        timeout_ms = settings.renderer.timeout.as_millis() as u64,
        missing_fragment = %settings.pages.missing_fragment,
        "serving pages"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("server stopped");
    Ok(())
}

fn build_http_state(settings: &config::Settings, renderer: Arc<dyn FragmentSource>) -> HttpState {
    let assembler = PageAssembler::new(renderer.clone(), settings.pages.missing_fragment);
    HttpState {
        pages: Arc::new(PageService::new(
            assembler,
            settings.site.public_url.clone(),
        )),
        sitemap: Arc::new(SitemapService::new(settings.site.public_url.clone())),
        renderer,
        static_dir: Arc::new(settings.site.static_dir.clone()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let client = HttpFragmentClient::new(&settings.renderer)?;

    let props = match args.props.as_deref() {
        Some(raw) => render::parse_props(raw)?,
        None => Map::new(),
    };
    let requests = render::build_requests(&args.tags, &props)?;
    let mode = RenderMode::select(requests.len(), args.batch);

    let summary = render::render_fragments(
        &client,
        &requests,
        mode,
        &mut io::stdout(),
        &mut io::stderr(),
    )
    .await?;

    info!(
        rendered = summary.rendered,
        failed = summary.failed,
        "render finished"
    );
    Ok(())
}
