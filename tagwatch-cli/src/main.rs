mod config;
mod terminal;

use std::process::ExitCode;
use std::sync::Arc;

use reqwest::{redirect, ClientBuilder};
use tagwatch_core::stackexchange::REQUEST_TIMEOUT;
use tagwatch_core::{
    DispatchHandle, MonitorEvent, ResultCache, SharedSettings, StackExchangeClient, TagMonitor,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::terminal::{format_notification, TerminalSink};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut once = false;
    let mut tags = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            _ => tags.push(arg),
        }
    }

    let mut config = AppConfig::load();
    // Saved tags alone only start the loop when auto-start is on.
    let once = once || (tags.is_empty() && !config.monitor.auto_start_monitoring);
    if !tags.is_empty() {
        if let Err(e) = config.update_tags(tags) {
            warn!(error = %e, "failed to save tags");
        }
    }
    if config.tags.is_empty() {
        eprintln!("usage: tagwatch [--once] <tag>...");
        return ExitCode::FAILURE;
    }

    let client = match ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .timeout(REQUEST_TIMEOUT)
        .gzip(true)
        .user_agent(concat!("tagwatch/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let source = StackExchangeClient::new(client, config.api.stack_exchange());
    let settings = SharedSettings::new(config.monitor.clone());
    let cache = ResultCache::new();
    let monitor = TagMonitor::cached(source, cache.clone(), Arc::new(TerminalSink), settings);

    for tag in &config.tags {
        if monitor.subscribe(tag).await.is_none() {
            warn!(tag = %tag, "ignoring blank tag");
        }
    }

    if once {
        let report = monitor.check_now().await;
        for event in monitor.dispatcher().inbox().list().iter().rev() {
            println!("{}", format_notification(event));
        }
        info!(
            checked = report.checked,
            failed = report.failed,
            new_questions = report.new_questions,
            "single check complete"
        );
        return ExitCode::SUCCESS;
    }

    tokio::spawn(print_events(monitor.subscribe_events()));
    let handle = monitor.start();
    tokio::spawn(open_on_activation(monitor.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        }
        _ = handle.stopped() => {}
    }
    monitor.stop();

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        total = stats.total,
        hit_ratio = stats.hit_ratio(),
        "cache efficacy"
    );
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn print_events(mut rx: broadcast::Receiver<MonitorEvent>) {
    loop {
        match rx.recv().await {
            Ok(MonitorEvent::NotificationRaised(event)) => {
                println!("{}", format_notification(&event));
            }
            Ok(MonitorEvent::CheckFailed { tag, error }) => {
                eprintln!("check failed for {tag}: {error}");
            }
            Ok(MonitorEvent::SubscriptionsChanged(active)) => {
                let tags: Vec<&str> = active.iter().map(|s| s.tag.as_str()).collect();
                info!(tags = ?tags, "watching");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event listener lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Reads alert numbers from stdin and opens the matching question.
async fn open_on_activation(monitor: TagMonitor) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(id) = line.trim().trim_start_matches('#').parse::<u64>() else {
            continue;
        };
        match monitor.dispatcher().activate(DispatchHandle(id)) {
            Some(url) => {
                if let Err(e) = webbrowser::open(&url) {
                    warn!(error = %e, url = %url, "failed to open browser");
                }
            }
            None => info!(id, "alert expired or unknown"),
        }
    }
}
