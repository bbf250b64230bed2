//! pastewatch - command-line front end for the paste monitoring scan API.
//!
//! Wires the REST client, the shared push channel, the scan synchronizer and
//! the notification bridge together and prints what a dashboard would show.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pastewatch_client::{
    logging, ApiClient, ClientConfig, DashboardStats, NotificationBridge, Notifier, PushClient,
    ScanApi, ScanDirectory, ScanSynchronizer, ScanView, TracingNotifier,
};
use pastewatch_shared::{ScanOptions, ScanResultsData, Severity};

/// pastewatch: follow paste monitoring scans from the terminal.
#[derive(Debug, Parser)]
#[command(name = "pastewatch", version, about, long_about = None)]
struct Cli {
    /// API base URL. Overrides PASTEWATCH_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether the API is reachable.
    Health,
    /// List all scans with dashboard totals.
    Scans,
    /// Submit paste URLs for scanning.
    Scan {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Also search darknet sources.
        #[arg(long)]
        darknet: bool,
        /// Skip clearnet discovery.
        #[arg(long = "no-clearnet")]
        no_clearnet: bool,
        /// Do not crawl the profiles of identified authors.
        #[arg(long = "no-crawl-authors")]
        no_crawl_authors: bool,
        /// Stay attached and follow the scan until it finishes.
        #[arg(long)]
        follow: bool,
    },
    /// Follow an existing scan until it completes or fails.
    Watch { scan_id: String },
    /// Print the results of a completed scan.
    Results {
        scan_id: String,
        /// Only show results of this severity (high, medium, low).
        #[arg(long)]
        severity: Option<Severity>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = match cli.api_url {
        Some(url) => ClientConfig::with_api_url(url)?,
        None => ClientConfig::from_env()?,
    };
    let api = Arc::new(ApiClient::new(config.api_url.clone()));

    match cli.command {
        Command::Health => {
            if api.check_health().await {
                println!("{} is healthy", config.api_url);
            } else {
                bail!("{} is unreachable", config.api_url);
            }
        }
        Command::Scans => {
            let scans = api.list_scans().await.context("listing scans")?;
            let stats = DashboardStats::from_scans(&scans);
            println!(
                "active: {}  completed: {}  results: {}",
                stats.active, stats.completed, stats.total_results
            );
            for scan in scans {
                println!(
                    "{}  {:<9}  {:>3.0}%  {:>4} results  {}",
                    scan.scan_id,
                    scan.status,
                    scan.progress * 100.0,
                    scan.total_results,
                    scan.error.as_deref().unwrap_or("")
                );
            }
        }
        Command::Scan {
            urls,
            darknet,
            no_clearnet,
            no_crawl_authors,
            follow,
        } => {
            let options = ScanOptions {
                enable_clearnet: !no_clearnet,
                enable_darknet: darknet,
                crawl_authors: !no_crawl_authors,
            };
            if follow {
                run_follow(&config, api, FollowTarget::Start { urls, options }).await?;
            } else {
                let request = pastewatch_shared::ScanRequest::new(urls, options);
                let response = api.start_scan(&request).await?;
                println!("{} {}: {}", response.scan_id, response.status, response.message);
            }
        }
        Command::Watch { scan_id } => {
            run_follow(&config, api, FollowTarget::Existing(scan_id)).await?;
        }
        Command::Results { scan_id, severity } => {
            let data = api.get_results(&scan_id).await?;
            print_results(&data, severity);
        }
    }

    Ok(())
}

enum FollowTarget {
    Existing(String),
    Start { urls: Vec<String>, options: ScanOptions },
}

/// Connect the push channel and print view transitions until the scan settles.
async fn run_follow(config: &ClientConfig, api: Arc<ApiClient>, target: FollowTarget) -> Result<()> {
    let push = PushClient::new(config)?;
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let sync = ScanSynchronizer::new(api.clone(), notifier.clone());
    let directory = ScanDirectory::new(api);

    let dir = directory.clone();
    let bridge_sub = NotificationBridge::new(notifier)
        .with_refresh_trigger(move || {
            let _ = dir.spawn_refresh();
        })
        .attach(&push);
    let sync_sub = sync.attach(&push);
    push.connect();

    let outcome = follow_view(&sync, target).await;

    drop(sync_sub);
    drop(bridge_sub);
    push.disconnect();

    let view = outcome?;
    let stats = directory.stats();
    if stats != DashboardStats::default() {
        println!(
            "dashboard: {} active, {} completed, {} results",
            stats.active, stats.completed, stats.total_results
        );
    }
    if let Some(results) = &view.results {
        print_results(results, None);
    }
    Ok(())
}

async fn follow_view(sync: &ScanSynchronizer, target: FollowTarget) -> Result<ScanView> {
    match target {
        FollowTarget::Existing(scan_id) => {
            sync.track(Some(scan_id));
        }
        FollowTarget::Start { urls, options } => {
            let scan_id = sync.start_scan(urls, options).await?;
            println!("started scan {scan_id}");
        }
    }

    let mut views = sync.subscribe_view();
    let mut last_line = String::new();
    loop {
        let view = views.borrow_and_update().clone();
        let line = describe(&view);
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
        if view.is_settled() {
            return Ok(view);
        }
        if view.is_stalled() {
            bail!(
                "giving up on scan: {}",
                view.error.as_deref().unwrap_or("unknown error")
            );
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(view);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(view);
            }
        }
    }
}

fn describe(view: &ScanView) -> String {
    let Some(scan) = &view.current_scan else {
        return if view.is_loading {
            "loading...".to_string()
        } else {
            format!("no data: {}", view.error.as_deref().unwrap_or("waiting"))
        };
    };
    let mut line = format!(
        "{} {} {:.0}%",
        scan.scan_id,
        scan.status,
        scan.progress * 100.0
    );
    if let Some(error) = scan.error.as_deref().or(view.error.as_deref()) {
        line.push_str(&format!(" ({error})"));
    }
    if view.is_loading {
        line.push_str(" …");
    }
    line
}

fn print_results(data: &ScanResultsData, severity: Option<Severity>) {
    println!(
        "{}: {} results, {} high priority, {} target emails, {} with credentials",
        data.metadata.target_domain,
        data.summary.total_results,
        data.summary.high_priority_count,
        data.summary.total_target_emails,
        data.summary.credentials_found
    );
    for result in data
        .sorted_by_relevance()
        .into_iter()
        .filter(|r| severity.map_or(true, |s| r.severity() == s))
    {
        println!(
            "[{:<6}] {:.2}  {}  {}{}",
            result.severity().label(),
            result.relevance_score,
            result.url,
            result.target_emails.join(", "),
            if result.has_credentials { "  [credentials]" } else { "" }
        );
    }
}
