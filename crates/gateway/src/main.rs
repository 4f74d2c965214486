use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig};
use clap::Parser;
use pagemap_browser::{BrowserPool, ChromiumSession, SessionManager};
use pagemap_domain::config::{Config, ConfigSeverity, TransportKind};
use pagemap_security::rate_limit::RateLimiter;
use pagemap_security::robots::RobotsChecker;
use tracing_subscriber::EnvFilter;

mod assembler;
mod classify;
mod cli;
mod dispatch;
mod extraction;
mod offline;
mod output;

use cli::{BuildArgs, Cli, Command, OutputFormat, ServeArgs, TransportArg};
use dispatch::PageMapToolsImpl;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pagemap=debug")))
        .json()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(CliError::User(msg)) => {
            eprintln!("error: {msg}");
            1
        }
        Err(CliError::Internal(err)) => {
            eprintln!("internal error: {err:?}");
            2
        }
    };
    std::process::exit(exit_code);
}

enum CliError {
    User(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Internal(e)
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Build(args) => run_build(args).await,
        Command::Serve(args) => {
            init_tracing();
            run_serve(args).await
        }
    }
}

async fn run_build(args: BuildArgs) -> Result<(), CliError> {
    let config = load_config(None)?;

    let page_map = if args.offline {
        let html = fetch_html(&args.url).await.map_err(CliError::User)?;
        offline::build_page_map_offline(&html, &args.url, "en", &config.prune)
    } else {
        let chrome_cfg = ChromeConfig::builder().build().map_err(|e| CliError::User(format!("failed to build browser config: {e}")))?;
        let (browser, handler) =
            Browser::launch(chrome_cfg).await.map_err(|e| CliError::User(format!("failed to launch browser: {e}")))?;
        tokio::spawn(async move {
            let mut handler = handler;
            use futures_util::StreamExt;
            while handler.next().await.is_some() {}
        });
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CliError::User(format!("failed to open page: {e}")))?;
        let session = ChromiumSession::standalone(page, browser, config.browser.max_dialog_buffer);

        let result = assembler::build_page_map_live(
            &session,
            &session,
            Some(&args.url),
            &config.browser,
            &config.prune,
            "en",
        )
        .await;
        session.stop().await;
        result.map_err(|e| CliError::User(e.sanitized_message()))?
    };

    let rendered = match args.format {
        OutputFormat::Json => output::render_json(&page_map).map_err(|e| CliError::Internal(e.into()))?,
        OutputFormat::Text => output::render_text(&page_map),
        OutputFormat::Markdown => output::render_markdown(&page_map),
    };

    match args.output {
        Some(path) => std::fs::write(&path, rendered).context("writing output file").map_err(CliError::Internal)?,
        None => println!("{rendered}"),
    }

    Ok(())
}

/// `build --offline` still needs *some* HTML to run the rule-based
/// pipeline against; fetch it with a plain HTTP client rather than a
/// browser, keeping the offline path free of chromiumoxide entirely.
async fn fetch_html(url: &str) -> Result<String, String> {
    if pagemap_security::url_validator::validate_url(url, false).is_some() {
        return Err(format!("refusing to fetch {url}: failed URL validation"));
    }
    let response = reqwest::get(url).await.map_err(|e| e.to_string())?;
    response.text().await.map_err(|e| e.to_string())
}

async fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.clone())?;
    apply_serve_overrides(&mut config, &args);

    let issues = config.validate();
    let mut has_error = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => {
                has_error = true;
                tracing::error!("{issue}");
            }
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if has_error {
        return Err(CliError::User("invalid configuration, see logged errors above".into()));
    }

    let config = Arc::new(config);
    tracing::info!(transport = ?config.server.transport, "pagemap gateway starting");

    let (pool, handler) = BrowserPool::launch(config.browser.max_contexts, config.browser.max_dialog_buffer)
        .await
        .map_err(|e| CliError::Internal(anyhow::anyhow!(e.sanitized_message())))?;
    tokio::spawn(handler.run());

    let sessions = Arc::new(SessionManager::new(Arc::new(pool), config.browser.clone(), 16));
    let robots = Arc::new(RobotsChecker::new(config.robots.fetch_timeout_ms, config.robots.max_bytes));
    let tools = Arc::new(PageMapToolsImpl::new(sessions.clone(), robots, config.clone()));
    tools.mark_browser_connected();

    let shutdown = shutdown_signal();

    match config.server.transport {
        TransportKind::Stdio => {
            pagemap_transport::stdio::run(tools).await.map_err(CliError::Internal)?;
        }
        TransportKind::Http => {
            let rate_limiter = Arc::new(RateLimiter::new(
                config.rate_limit.per_client_capacity,
                config.rate_limit.per_client_refill_rate,
                config.rate_limit.global_capacity,
                config.rate_limit.global_refill_rate,
                config.rate_limit.warn_ratio,
            ));
            let router = pagemap_transport::http::router(
                tools.clone(),
                tools.clone(),
                rate_limiter,
                &config.server.cors.allowed_origins,
                config.server.require_tls,
                &config.server.trusted_proxies,
            )
            .into_make_service_with_connect_info::<std::net::SocketAddr>();

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| CliError::Internal(e.into()))?;
            tracing::info!(%addr, "listening");

            let drain_timeout = std::time::Duration::from_secs(config.server.drain_timeout_secs);
            let tools_for_shutdown = tools.clone();
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                    tools_for_shutdown.start_draining();
                    tokio::time::sleep(drain_timeout).await;
                })
                .await
                .map_err(|e| CliError::Internal(e.into()))?;
        }
    }

    sessions.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Load config from (in ascending precedence) defaults, an optional TOML
/// file, `PAGEMAP_*` env vars, then the `serve` CLI flags applied by the
/// caller afterward (§6.4).
fn load_config(path: Option<PathBuf>) -> Result<Config, CliError> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))
                .map_err(CliError::Internal)?;
            toml::from_str(&text).map_err(|e| CliError::User(format!("invalid config file: {e}")))?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    use std::env;

    if let Ok(v) = env::var("PAGEMAP_TRANSPORT") {
        config.server.transport = match v.as_str() {
            "http" => TransportKind::Http,
            _ => TransportKind::Stdio,
        };
    }
    if let Ok(v) = env::var("PAGEMAP_HOST") {
        config.server.host = v;
    }
    if let Ok(v) = env::var("PAGEMAP_PORT") {
        if let Ok(port) = v.parse() {
            config.server.port = port;
        }
    }
    if let Ok(v) = env::var("PAGEMAP_CORS_ORIGIN") {
        config.server.cors.allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(v) = env::var("PAGEMAP_ALLOW_LOCAL") {
        config.security.allow_local = is_truthy(&v);
    }
    if let Ok(v) = env::var("PAGEMAP_TELEMETRY") {
        config.server.telemetry = is_truthy(&v);
    }
    if let Ok(v) = env::var("PAGEMAP_IGNORE_ROBOTS") {
        config.robots.ignore_robots = is_truthy(&v);
    }
    if let Ok(v) = env::var("PAGEMAP_BOT_UA") {
        config.security.bot_ua = is_truthy(&v);
    }
    if let Ok(v) = env::var("PAGEMAP_TRUSTED_PROXIES") {
        config.server.trusted_proxies = v.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(v) = env::var("PAGEMAP_DRAIN_TIMEOUT") {
        if let Ok(secs) = v.parse() {
            config.server.drain_timeout_secs = secs;
        }
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// CLI flags outrank both the config file and environment variables
/// (§6.4); applied last, and only when actually passed.
fn apply_serve_overrides(config: &mut Config, args: &ServeArgs) {
    if let Some(t) = args.transport {
        config.server.transport = match t {
            TransportArg::Stdio => TransportKind::Stdio,
            TransportArg::Http => TransportKind::Http,
        };
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if !args.cors_origin.is_empty() {
        config.server.cors.allowed_origins = args.cors_origin.clone();
    }
    if args.allow_local {
        config.security.allow_local = true;
    }
    if args.telemetry {
        config.server.telemetry = true;
    }
    if args.ignore_robots {
        config.robots.ignore_robots = true;
    }
    if args.bot_ua {
        config.security.bot_ua = true;
    }
    if !args.trusted_proxy.is_empty() {
        config.server.trusted_proxies = args.trusted_proxy.clone();
    }
    if let Some(secs) = args.drain_timeout {
        config.server.drain_timeout_secs = secs;
    }
}
