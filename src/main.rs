use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use editorial::api::ApiClient;
use editorial::app::{FeedController, FeedEvent, FeedPhase};
use editorial::config::Config;
use editorial::feed::{FeedPageRequest, FetchStrategy};

/// Get the config directory path (~/.config/editorial/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("editorial");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "editorial", about = "Feed reader for an Editorial publishing backend")]
struct Args {
    /// Page number to display (1-based)
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Restrict the feed to a category slug
    #[arg(long)]
    category: Option<String>,

    /// Path to an alternate config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List the category catalog and exit
    #[arg(long)]
    list_categories: bool,

    /// Emit the page as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let service_url = config.service_url.clone().context(
        "No service URL configured. Set service_url in config.toml or the EDITORIAL_URL env var.",
    )?;
    let anon_key = config.anon_key.clone().context(
        "No anonymous key configured. Set anon_key in config.toml or the EDITORIAL_ANON_KEY env var.",
    )?;

    let client = ApiClient::new(
        &service_url,
        SecretString::from(anon_key),
        config.access_token.clone().map(SecretString::from),
    )
    .context("Failed to create API client")?;

    if args.list_categories {
        return list_categories(&client).await;
    }

    let strategy = if config.relationship_queries {
        FetchStrategy::Joined
    } else {
        FetchStrategy::Split
    };

    let (event_tx, mut event_rx) = mpsc::channel::<FeedEvent>(32);
    let mut controller = FeedController::new(
        client,
        strategy,
        Duration::from_secs(config.page_cache_ttl_seconds),
        event_tx,
    );

    controller.navigate(FeedPageRequest::new(args.page, args.category.clone()));

    // One-shot run: drain events until the navigation settles. A known slug
    // miss settles synchronously with no events at all.
    while !matches!(controller.phase, FeedPhase::Ready | FeedPhase::Error) {
        match event_rx.recv().await {
            Some(event) => controller.handle_event(event),
            None => break,
        }
    }

    if let Some(message) = &controller.error {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }

    if args.json {
        print_json(&controller)?;
    } else {
        print_page(&controller);
    }

    Ok(())
}

async fn list_categories(client: &ApiClient) -> Result<()> {
    let catalog = editorial::api::categories::fetch_all(client)
        .await
        .context("Failed to fetch category catalog")?;

    if catalog.is_empty() {
        println!("No categories.");
        return Ok(());
    }
    for category in &catalog {
        match &category.description {
            Some(description) => println!("{}  ({})  {}", category.name, category.slug, description),
            None => println!("{}  ({})", category.name, category.slug),
        }
    }
    Ok(())
}

fn print_json(controller: &FeedController) -> Result<()> {
    let payload = serde_json::json!({
        "page": controller.controls,
        "profiles_degraded": controller.profiles_degraded,
        "posts": &*controller.posts,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn print_page(controller: &FeedController) {
    if controller.posts.is_empty() {
        println!("No posts.");
        return;
    }

    for post in controller.posts.iter() {
        println!("{} · {}", post.category_name(), post.published_label());
        println!("{}", post.title);
        if let Some(excerpt) = &post.excerpt {
            println!("{excerpt}");
        }
        println!("By {}", post.byline());
        println!();
    }

    if controller.profiles_degraded {
        println!("(author profiles unavailable)");
        println!();
    }

    let controls = controller.controls;
    let mut footer = format!("Page {} of ~{}", controls.page, controls.estimated_total);
    if controls.previous_enabled {
        footer.push_str(&format!("  [prev: --page {}]", controls.page - 1));
    }
    if controls.next_enabled {
        footer.push_str(&format!("  [next: --page {}]", controls.page + 1));
    }
    println!("{footer}");
}
