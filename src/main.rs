mod app;
mod cache;
mod library;
mod metadata;
mod pagination;
mod providers;
mod query;
mod record;
mod store;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use record::{ImageRecord, Source};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixelvault")]
#[command(version)]
#[command(about = "Browse and download images from Wallhaven, Waifu.im, Waifu.pics and Nekos.moe")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List sources and their suggested tags
    Sources,
    /// Fetch results and print them
    Fetch {
        /// wallhaven, waifu_im, waifu_pics or nekos_moe (default: last used)
        source: Option<Source>,
        /// Tag / category to browse
        #[arg(short, long, default_value = "")]
        tag: String,
        /// Server-side search term
        #[arg(short, long, default_value = "")]
        query: String,
        /// Local filter over the fetched results (e.g. "ratio:16:9 color:blue")
        #[arg(short, long)]
        filter: Option<String>,
        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: u32,
        /// Download thumbnails to learn size and colors before filtering
        #[arg(short, long)]
        measure: bool,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive browsing session
    Browse {
        /// Source to start with (default: last used)
        source: Option<Source>,
    },
    /// Download an image URL into the download directory
    Download {
        /// Source the URL belongs to
        source: Source,
        url: String,
    },
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Manage download history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage the image cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a favorite by source and id
    Remove { source: Source, id: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List downloads, most recent first
    List,
    /// Forget all downloads
    Clear,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Number and size of cached files
    Stats,
    /// Delete cached files
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Print the current configuration
    Show,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pixelvault=debug" } else { "pixelvault=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = app::Config::load()?;

    match cli.command {
        Some(Commands::Sources) => cmd_sources(&config),
        Some(Commands::Fetch {
            source,
            tag,
            query,
            filter,
            pages,
            measure,
            json,
        }) => {
            let source = source.unwrap_or(config.browse.last_source);
            cmd_fetch(config, source, &tag, &query, filter.as_deref(), pages, measure, json)?;
        }
        Some(Commands::Browse { source }) => {
            let source = source.unwrap_or(config.browse.last_source);
            let mut app = app::App::from_config(config)?;
            app::run_browse(&mut app, source)?;
        }
        Some(Commands::Download { source, url }) => cmd_download(&config, source, &url)?,
        Some(Commands::Favorites { action }) => cmd_favorites(&config, action)?,
        Some(Commands::History { action }) => cmd_history(&config, action)?,
        Some(Commands::Cache { action }) => cmd_cache(&config, action)?,
        Some(Commands::Config { action }) => cmd_config(&config, action)?,
        None => {
            let source = config.browse.last_source;
            let mut app = app::App::from_config(config)?;
            app::run_browse(&mut app, source)?;
        }
    }

    Ok(())
}

fn cmd_sources(config: &app::Config) {
    println!("{}", app::format_sources(config.browse.last_source));
    for source in Source::ALL {
        println!();
        println!("{} tags:", source.display_name());
        println!("  {}", source.suggested_tags().join(", "));
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_fetch(
    mut config: app::Config,
    source: Source,
    tag: &str,
    query: &str,
    filter: Option<&str>,
    pages: u32,
    measure: bool,
    json: bool,
) -> Result<()> {
    config.cache.measure_assets = measure;
    let mut app = app::App::from_config(config)?;
    let wait = app.page_wait();

    app.open(source, tag, query);
    app.wait_idle(wait);
    for _ in 1..pages.max(1) {
        if !app.load_more() {
            break;
        }
        app.wait_idle(wait);
    }
    if measure {
        app.wait_assets(wait);
    }
    if let Some(filter) = filter {
        app.filter_locally(filter);
    }

    if json {
        let records: Vec<&ImageRecord> = app.visible();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!("{}", app.listing());
    }

    Ok(())
}

fn cmd_download(config: &app::Config, source: Source, url: &str) -> Result<()> {
    let transport = config.transport();
    let cache = config.image_cache(transport);
    let mut library = library::Library::load(
        library::Library::default_path(),
        config.downloads.history_limit,
    )?;

    let record = ImageRecord::new(source, None, url, None);
    let dir = utils::expand_tilde(&config.downloads.directory);
    let path = cache
        .download(&record, &dir, config.downloads.organize_by_source)
        .with_context(|| format!("Failed to download {}", url))?;

    library.record_download(&record, &path);
    library.save()?;
    println!("✓ Saved {}", path.display());
    Ok(())
}

fn cmd_favorites(config: &app::Config, action: FavoritesAction) -> Result<()> {
    let mut library = library::Library::load(
        library::Library::default_path(),
        config.downloads.history_limit,
    )?;

    match action {
        FavoritesAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(library.favorites())?);
            } else {
                println!("{}", app::format_favorites(library.favorites()));
            }
        }
        FavoritesAction::Remove { source, id } => {
            if library.remove_favorite(source, &id) {
                library.save()?;
                println!("✓ Removed {} {}", source, id);
            } else {
                println!("No {} favorite with id {}", source.display_name(), id);
            }
        }
    }

    Ok(())
}

fn cmd_history(config: &app::Config, action: HistoryAction) -> Result<()> {
    let mut library = library::Library::load(
        library::Library::default_path(),
        config.downloads.history_limit,
    )?;

    match action {
        HistoryAction::List => println!("{}", app::format_history(library.history())),
        HistoryAction::Clear => {
            let removed = library.clear_history();
            library.save()?;
            println!("✓ Cleared {} download(s) from history", removed);
        }
    }

    Ok(())
}

fn cmd_cache(config: &app::Config, action: CacheAction) -> Result<()> {
    let cache = config.image_cache(config.transport());

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("Cache: {}", cache.dir().display());
            println!("  Enabled: {}", if cache.is_enabled() { "yes" } else { "no" });
            println!("  Files:   {}", stats.files);
            println!("  Size:    {}", utils::format_size(stats.bytes));
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("✓ Removed {} cached file(s)", removed);
        }
    }

    Ok(())
}

fn cmd_config(config: &app::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", app::Config::config_path().display()),
        ConfigAction::Show => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}
