mod cli;
mod dispatch;

use std::sync::Arc;

use anyhow::Context;
use chat_sink::Sink;
use chat_sink::slack::SlackClient;
use clap::Parser;
use cluster_watch::Observer;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(err) = run(args).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone())?;

    let client = cluster_client(&args)
        .await
        .context("building cluster client")?;
    let observer = Observer::new(client, args.watch_config());

    let slack = Arc::new(SlackClient::new(args.slack_config()));
    let sink = Arc::new(Sink::new(Arc::clone(&slack), slack, args.channel.clone()));

    let handle = observer.start(shutdown.clone());
    let sink_handle = sink
        .connect(shutdown.clone())
        .await
        .context("opening chat session")?;

    let mut watch_errors = handle.errors;
    let mut sink_task = sink_handle.task;
    let dispatcher = tokio::spawn(dispatch::run(handle.events, sink_handle.inbound, sink));

    info!("watchbot running, press ctrl-c to stop");
    let outcome = tokio::select! {
        _ = shutdown.cancelled() => Ok(()),

        Some(err) = watch_errors.recv() => {
            Err(anyhow::Error::new(err)).context("cluster watch failed")
        }

        session = &mut sink_task => match session {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::new(err)).context("chat session failed"),
            Err(err) => Err(anyhow::Error::new(err)).context("chat session task panicked"),
        },
    };

    // Tear the watches down and let the loops drain out.
    shutdown.cancel();
    for task in handle.tasks {
        let _ = task.await;
    }
    let _ = dispatcher.await;

    outcome
}

/// Build the cluster client from an explicit host, or fall back to
/// kubeconfig/in-cluster discovery.
async fn cluster_client(args: &Args) -> anyhow::Result<kube::Client> {
    let mut config = match &args.host {
        Some(host) => {
            let url: http::Uri = host.parse().context("parsing K8S_HOST")?;
            kube::Config::new(url)
        }
        None => kube::Config::infer().await?,
    };
    if args.insecure {
        config.accept_invalid_certs = true;
    }
    Ok(kube::Client::try_from(config)?)
}

fn spawn_signal_listener(shutdown: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
            shutdown.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt, shutting down");
            }
            shutdown.cancel();
        });
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
