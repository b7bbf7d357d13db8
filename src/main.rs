use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use prop_flow::api;
use prop_flow::api::state::AppState;
use prop_flow::cli::{Cli, Command};
use prop_flow::config::Config;
use prop_flow::example;
use prop_flow::ingest::feed::{FeedSource, HttpFeed, JsonFileFeed};
use prop_flow::pipeline::{Pipeline, PipelineDeps};
use prop_flow::schema;
use prop_flow::store;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Schema => {
            schema::run()?;
            Ok(0)
        }
        Command::Example => {
            example::run()?;
            Ok(0)
        }
        Command::Serve { addr, db_path, feed } => {
            let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
            rt.block_on(serve_cmd(addr, db_path, feed))
        }
        Command::Pipeline { feed, db_path, once } => {
            let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
            rt.block_on(pipeline_cmd(feed, db_path, once))
        }
    }
}

fn load_config(db_path: Option<PathBuf>, addr: Option<String>) -> Result<Arc<Config>> {
    let mut cfg = Config::from_env()?;
    if let Some(db_path) = db_path {
        cfg.db_path = db_path;
    }
    if let Some(addr) = addr {
        cfg.http_addr = addr;
    }
    Ok(Arc::new(cfg))
}

/// CLI `--feed` file wins; otherwise `PF_FEED_URL` is either an HTTP
/// endpoint or a local path.
fn resolve_feed(cli_feed: Option<PathBuf>, cfg: &Config) -> Result<Option<Arc<dyn FeedSource>>> {
    if let Some(path) = cli_feed {
        return Ok(Some(Arc::new(JsonFileFeed::new("file-feed", path))));
    }
    match &cfg.feed_url {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            let feed = HttpFeed::new("mls-http", url.clone(), cfg.http_timeout)
                .map_err(|e| anyhow::anyhow!("building http feed: {e}"))?;
            Ok(Some(Arc::new(feed)))
        }
        Some(path) => Ok(Some(Arc::new(JsonFileFeed::new(
            "file-feed",
            PathBuf::from(path),
        )))),
        None => Ok(None),
    }
}

async fn serve_cmd(
    addr: Option<String>,
    db_path: Option<PathBuf>,
    feed: Option<PathBuf>,
) -> Result<i32> {
    let cfg = load_config(db_path, addr)?;
    let db = store::open(&cfg.db_path)?;
    let feed = resolve_feed(feed, &cfg)?;

    let pipeline = Pipeline::build(
        db.clone(),
        cfg.clone(),
        PipelineDeps {
            feed,
            ..PipelineDeps::default()
        },
    );
    let ingest_handle = pipeline.spawn_ingestor();

    let app_state = AppState::new(db, cfg.clone(), pipeline.underwriting.clone());
    let shutdown_rx = pipeline.shutdown_receiver();
    let http_addr = cfg.http_addr.clone();
    let mut server =
        tokio::spawn(async move { api::serve(&http_addr, app_state, shutdown_rx).await });

    // A server that returns before the signal is a failed bind or a fatal
    // runtime error, not a shutdown.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        result = &mut server => {
            pipeline.shutdown().await;
            match result {
                Ok(Ok(())) => return Ok(2),
                Ok(Err(err)) => return Err(err),
                Err(err) => return Err(anyhow::anyhow!("gateway task: {err}")),
            }
        }
    }

    let code = pipeline.shutdown().await;
    if let Some(handle) = ingest_handle {
        let _ = handle.await;
    }
    match server.await {
        Ok(Ok(())) => Ok(code),
        Ok(Err(err)) => {
            eprintln!("gateway error: {err:#}");
            Ok(2)
        }
        Err(_) => Ok(2),
    }
}

async fn pipeline_cmd(feed: Option<PathBuf>, db_path: Option<PathBuf>, once: bool) -> Result<i32> {
    let cfg = load_config(db_path, None)?;
    let db = store::open(&cfg.db_path)?;
    let feed = resolve_feed(feed, &cfg)?;
    if feed.is_none() {
        anyhow::bail!("no feed configured; pass --feed or set PF_FEED_URL");
    }

    let pipeline = Pipeline::build(
        db,
        cfg,
        PipelineDeps {
            feed,
            ..PipelineDeps::default()
        },
    );

    if once {
        return pipeline.run_once().await;
    }

    let ingest_handle = pipeline.spawn_ingestor();
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    let code = pipeline.shutdown().await;
    if let Some(handle) = ingest_handle {
        let _ = handle.await;
    }
    Ok(code)
}
