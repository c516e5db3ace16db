//! Command-line shell for the lost & found sync core.

use std::time::Duration;

use anyhow::{anyhow, ensure, Context};
use clap::{Args, Parser, Subcommand};
use lostfound_shared::config::CoreConfig;
use lostfound_shared::model::{Category, FeedFilter};
use lostfound_shared::suggest::{self, SuggestionPhase};
use lostfound_shared::{Event, ItemId, Runtime, RuntimeHandle, ViewModel};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const WAIT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "lostfound-shell", version, about = "Campus lost & found client")]
struct Cli {
    /// Base URL of the lost & found API.
    #[arg(long, env = "LOSTFOUND_API_URL", global = true)]
    api_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed and print a summary whenever it changes.
    Watch {
        #[arg(long, default_value = "all", value_parser = parse_filter)]
        filter: FeedFilter,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print autocomplete suggestions for a query.
    Search {
        query: String,
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
    },
    /// Claim a found item.
    Claim(ClaimArgs),
    /// Delete an item.
    Delete { id: String },
    /// Archive an item.
    Archive { id: String },
    /// Print the analytics summary.
    Analytics,
}

#[derive(Args, Debug)]
struct ClaimArgs {
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
}

fn parse_filter(raw: &str) -> Result<FeedFilter, String> {
    FeedFilter::parse(raw).ok_or_else(|| format!("unknown filter '{raw}' (all, lost, found)"))
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| format!("unknown category '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = CoreConfig::from_env().context("reading LOSTFOUND_* environment")?;
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }
    if let Some(ms) = cli.timeout_ms {
        config.request_timeout_ms = ms;
    }
    if let Command::Watch {
        filter,
        interval_ms,
    } = &cli.command
    {
        config.feed = *filter;
        if let Some(ms) = interval_ms {
            config.poll_interval_ms = *ms;
        }
    }
    config.validate().context("invalid configuration")?;
    if let Command::Search { query, .. } = &cli.command {
        // A too-short query never leaves the idle phase, so nothing would settle.
        ensure!(
            suggest::is_searchable(query, config.min_query_chars),
            "query must be at least {} character(s)",
            config.min_query_chars
        );
    }

    let runtime = Runtime::connect(config).context("building gateway")?;
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());

    let result = execute(cli.command, &handle).await;
    handle.shutdown();
    task.await.context("runtime task panicked")?;
    result
}

async fn execute(command: Command, handle: &RuntimeHandle) -> anyhow::Result<()> {
    match command {
        Command::Watch { .. } => watch_feed(handle).await,
        Command::Search { query, category } => {
            let mut view = handle.view();
            if category.is_some() {
                handle.dispatch(Event::SearchCategoryChanged { category });
            }
            handle.dispatch(Event::SearchInputChanged { text: query });
            let settled = wait(&mut view, |v| {
                v.search.phase == SuggestionPhase::Settled
            })
            .await?;
            for suggestion in &settled.search.suggestions {
                println!("{suggestion}");
            }
            Ok(())
        }
        Command::Claim(args) => {
            let id = ItemId::new(args.id);
            mutate(
                handle,
                Event::ClaimRequested {
                    id: id.clone(),
                    name: args.name,
                    phone: args.phone,
                },
                id,
            )
            .await
        }
        Command::Delete { id } => {
            let id = ItemId::new(id);
            mutate(handle, Event::DeleteRequested { id: id.clone() }, id).await
        }
        Command::Archive { id } => {
            let id = ItemId::new(id);
            mutate(handle, Event::ArchiveRequested { id: id.clone() }, id).await
        }
        Command::Analytics => {
            let mut view = handle.view();
            handle.dispatch(Event::AnalyticsRequested);
            let done = wait(&mut view, |v| v.analytics.is_some() || v.error.is_some()).await?;
            fail_on_error(&done)?;
            println!("{}", serde_json::to_string_pretty(&done.analytics)?);
            Ok(())
        }
    }
}

async fn watch_feed(handle: &RuntimeHandle) -> anyhow::Result<()> {
    let mut view = handle.view();
    handle.dispatch(Event::Started);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = view.changed() => {
                changed.context("runtime exited")?;
                let snapshot = view.borrow_and_update().clone();
                print_summary(&snapshot);
            }
        }
    }
}

fn print_summary(view: &ViewModel) {
    let stats = view.stats;
    println!(
        "{} items ({} lost / {} found), {} markers{}",
        stats.total_items,
        stats.lost_items,
        stats.found_items,
        view.markers.len(),
        view.feed_error
            .as_ref()
            .map(|e| format!(", last refresh failed: {}", e.message))
            .unwrap_or_default()
    );
}

/// Dispatches a lifecycle request and waits until it settles either way.
async fn mutate(handle: &RuntimeHandle, event: Event, id: ItemId) -> anyhow::Result<()> {
    let mut view = handle.view();
    view.mark_unchanged();
    handle.dispatch(event);

    let mut seen_pending = false;
    let settled = tokio::time::timeout(Duration::from_secs(WAIT_SECS), async {
        loop {
            view.changed().await.map_err(|_| anyhow!("runtime exited"))?;
            let current = view.borrow_and_update().clone();
            let pending = current.pending_ids.contains(&id);
            seen_pending |= pending;
            if current.error.is_some() || (seen_pending && !pending) {
                return Ok::<_, anyhow::Error>(current);
            }
        }
    })
    .await
    .context("timed out waiting for the server")??;

    fail_on_error(&settled)?;
    println!("ok: {id}");
    Ok(())
}

async fn wait(
    view: &mut watch::Receiver<ViewModel>,
    ready: impl FnMut(&ViewModel) -> bool,
) -> anyhow::Result<ViewModel> {
    let current = tokio::time::timeout(Duration::from_secs(WAIT_SECS), view.wait_for(ready))
        .await
        .context("timed out waiting for the server")?
        .map_err(|_| anyhow!("runtime exited"))?;
    Ok(current.clone())
}

fn fail_on_error(view: &ViewModel) -> anyhow::Result<()> {
    match &view.error {
        Some(err) => Err(anyhow!("{} ({})", err.message, err.error_code)),
        None => Ok(()),
    }
}
