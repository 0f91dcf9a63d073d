use crate::cache::ImageCache;
use crate::library::{HistoryEntry, Library};
use crate::metadata;
use crate::pagination::{Completion, FetchOutcome, FetchRequest, PaginationController};
use crate::providers::{HttpTransport, Page, ProviderSettings, Providers, ReqwestTransport};
use crate::query::{self, has_operator, FilterQuery, SearchPlan, ViewFilter};
use crate::record::{AssetMetadata, ImageRecord, Source};
use crate::utils::{expand_tilde, format_size};
use anyhow::{Context, Result};
use dialoguer::Input;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Empty means "use WALLHAVEN_API_KEY if set"
    pub wallhaven_api_key: String,
    /// Wallhaven `sorting` parameter (random, toplist, date_added, ...)
    pub wallhaven_sorting: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Pause between Waifu.im attempts within one page
    pub waifu_im_delay_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            wallhaven_api_key: String::new(),
            wallhaven_sorting: "random".to_string(),
            user_agent: format!("pixelvault/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            waifu_im_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub enabled: bool,
    /// Download thumbnails in the background to learn size and colors
    pub measure_assets: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: ImageCache::default_dir(),
            enabled: true,
            measure_assets: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    pub directory: PathBuf,
    /// Save into `<directory>/<source>/`
    pub organize_by_source: bool,
    pub history_limit: usize,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        let base = dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            directory: base.join("pixelvault"),
            organize_by_source: true,
            history_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseConfig {
    pub last_source: Source,
    pub last_tag: String,
    /// How long a command waits for its page before showing what it has
    pub page_wait_secs: u64,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            last_source: Source::Wallhaven,
            last_tag: String::new(),
            page_wait_secs: 30,
        }
    }
}

/// A configured key wins; otherwise a non-blank environment value
fn resolve_api_key(configured: &str, env: Option<String>) -> Option<String> {
    let configured = configured.trim();
    if !configured.is_empty() {
        return Some(configured.to_string());
    }
    env.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

impl Config {
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("com", "pixelvault", "pixelvault")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, creating it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?;
            let config: Config = toml::from_str(&data)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let data = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, data).with_context(|| format!("Failed to write config at {}", path.display()))?;

        Ok(())
    }

    pub fn wallhaven_api_key(&self) -> Option<String> {
        resolve_api_key(
            &self.providers.wallhaven_api_key,
            std::env::var("WALLHAVEN_API_KEY").ok(),
        )
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            wallhaven_api_key: self.wallhaven_api_key(),
            wallhaven_sorting: self.providers.wallhaven_sorting.clone(),
            waifu_im_delay: Duration::from_millis(self.providers.waifu_im_delay_ms),
        }
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::new(ReqwestTransport::new(
            &self.providers.user_agent,
            Duration::from_secs(self.providers.request_timeout_secs),
        ))
    }

    pub fn image_cache(&self, transport: Arc<dyn HttpTransport>) -> ImageCache {
        ImageCache::new(expand_tilde(&self.cache.directory), self.cache.enabled, transport)
    }
}

/// Everything the session thread reacts to
#[derive(Debug)]
pub enum AppEvent {
    PageLoaded(FetchOutcome),
    AssetReady { id: String, metadata: AssetMetadata },
    AssetFailed { id: String },
}

/// Asset to fetch and measure on the asset worker
#[derive(Debug)]
struct AssetRequest {
    id: String,
    url: String,
    full_resolution: bool,
    /// Listing the record belongs to; skipped once a newer listing starts
    generation: u64,
}

const HELP: &str = "\
Commands:
  source <id>       switch source (no id: list sources)
  tag <t>           filter by tag; 'tag' alone clears it
  tags              suggested tags for the current source
  / <query>         search; operators such as width:>1920 ratio:16:9 color:red filter locally
  more              load the next page
  refresh           reload the current source from page 1
  list              show the current results
  show <n>          details of result n
  fav <n>           toggle result n as favorite
  save <n>          download result n
  favorites         list favorites
  history           list downloads
  quit              leave";

pub struct App {
    pub config: Config,
    controller: PaginationController,
    /// Store indices currently visible
    view: Vec<usize>,
    view_filter: Option<ViewFilter>,
    providers: Providers,
    cache: Arc<ImageCache>,
    library: Library,
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
    asset_tx: Option<Sender<AssetRequest>>,
    /// Generation of the listing on screen, shared with the asset worker
    listing_generation: Arc<AtomicU64>,
    pending_assets: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config, providers: Providers, cache: Arc<ImageCache>, library: Library) -> Self {
        let (tx, rx) = mpsc::channel();
        let listing_generation = Arc::new(AtomicU64::new(0));

        let asset_tx = if config.cache.measure_assets {
            let (asset_tx, asset_rx) = mpsc::channel();
            let worker_tx = tx.clone();
            let worker_cache = Arc::clone(&cache);
            let worker_generation = Arc::clone(&listing_generation);
            thread::spawn(move || asset_worker(asset_rx, worker_tx, worker_cache, worker_generation));
            Some(asset_tx)
        } else {
            None
        };

        let controller = PaginationController::new(config.browse.last_source);

        Self {
            config,
            controller,
            view: Vec::new(),
            view_filter: None,
            providers,
            cache,
            library,
            tx,
            rx,
            asset_tx,
            listing_generation,
            pending_assets: 0,
            should_quit: false,
        }
    }

    /// Wire up the real transport, providers, cache and library
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = config.transport();
        let providers = Providers::standard(Arc::clone(&transport), &config.provider_settings());
        let cache = Arc::new(config.image_cache(transport));
        let library = Library::load(Library::default_path(), config.downloads.history_limit)?;
        Ok(Self::new(config, providers, cache, library))
    }

    pub fn controller(&self) -> &PaginationController {
        &self.controller
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn page_wait(&self) -> Duration {
        Duration::from_secs(self.config.browse.page_wait_secs)
    }

    /// Records passing the current filter, in display order
    pub fn visible(&self) -> Vec<&ImageRecord> {
        let records = self.controller.store().records();
        self.view.iter().filter_map(|&i| records.get(i)).collect()
    }

    pub fn open(&mut self, source: Source, tag: &str, search_query: &str) {
        let request = self.controller.open(source, tag, search_query);
        self.start_listing(request);
    }

    pub fn set_source(&mut self, source: Source) {
        let request = self.controller.source_changed(source);
        self.start_listing(request);
    }

    /// Returns false if the tag was already active
    pub fn set_tag(&mut self, tag: &str) -> bool {
        match self.controller.tag_changed(tag) {
            Some(request) => {
                self.start_listing(request);
                true
            }
            None => false,
        }
    }

    pub fn refresh(&mut self) {
        let request = self.controller.refresh();
        self.start_listing(request);
    }

    /// Returns false while loading or once the listing is exhausted
    pub fn load_more(&mut self) -> bool {
        match self.controller.load_more() {
            Some(request) => {
                self.spawn_fetch(request);
                true
            }
            None => false,
        }
    }

    fn start_listing(&mut self, request: FetchRequest) {
        self.view_filter = None;
        self.update_view();
        self.spawn_fetch(request);
    }

    /// React to a search box change: filter locally or refetch
    pub fn search(&mut self, text: &str) -> SearchPlan {
        let plan = query::plan(text, self.controller.store().records());
        match &plan {
            SearchPlan::Clear => {
                self.view_filter = None;
                // Only a server-side search narrowed the store itself
                if let Some(request) = self.controller.search_changed("") {
                    self.spawn_fetch(request);
                }
            }
            SearchPlan::Local(filter) => {
                self.view_filter = Some(filter.clone());
            }
            SearchPlan::Remote(term) => {
                self.view_filter = None;
                if let Some(request) = self.controller.search_changed(term) {
                    self.spawn_fetch(request);
                }
            }
        }
        debug!(query = text, plan = ?plan, "search");
        self.update_view();
        plan
    }

    /// Filter the fetched records without ever going to the network
    pub fn filter_locally(&mut self, text: &str) {
        let text = text.trim().to_lowercase();
        self.view_filter = if text.is_empty() {
            None
        } else if has_operator(&text) {
            Some(ViewFilter::Advanced(FilterQuery::parse(&text)))
        } else {
            Some(ViewFilter::Text(text))
        };
        self.update_view();
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        // Asset requests queued for an older listing are now stale
        self.listing_generation
            .store(request.context.generation, Ordering::SeqCst);
        let tx = self.tx.clone();
        let client = self.providers.get(request.context.source);
        debug!(
            source = %request.context.source,
            page = request.query.page,
            append = request.append,
            "fetch started"
        );

        thread::spawn(move || {
            let page = match client {
                Some(client) => client.fetch(&request.query),
                None => {
                    warn!(source = %request.context.source, "no client registered");
                    Page::empty()
                }
            };
            let _ = tx.send(AppEvent::PageLoaded(request.outcome(page)));
        });
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::PageLoaded(outcome) => match self.controller.complete(outcome) {
                Completion::Stale => {}
                Completion::Applied { added, dropped } => {
                    debug!(
                        added,
                        dropped,
                        total = self.controller.store().len(),
                        exhausted = self.controller.is_exhausted(),
                        "page applied"
                    );
                    self.update_view();
                    self.request_assets(added);
                }
            },
            AppEvent::AssetReady { id, metadata } => {
                self.pending_assets = self.pending_assets.saturating_sub(1);
                if self.controller.store().get(&id).is_none() {
                    debug!(id = %id, "asset for a record no longer listed");
                } else if self.controller.enrich(&id, &metadata) {
                    debug!(id = %id, "record enriched");
                    self.update_view();
                }
            }
            AppEvent::AssetFailed { id } => {
                self.pending_assets = self.pending_assets.saturating_sub(1);
                debug!(id = %id, "asset unavailable");
            }
        }
    }

    fn update_view(&mut self) {
        let records = self.controller.store().records();
        self.view = match &self.view_filter {
            Some(filter) => filter.apply(records),
            None => (0..records.len()).collect(),
        };
    }

    /// Queue the `added` newest records for measuring, skipping ones the
    /// provider already described fully
    fn request_assets(&mut self, added: usize) {
        let Some(asset_tx) = &self.asset_tx else {
            return;
        };
        let generation = self.controller.context().generation;
        let records = self.controller.store().records();
        let start = records.len().saturating_sub(added);

        let mut queued = 0;
        for record in &records[start..] {
            if record.has_dimensions() && !record.colors.is_empty() {
                continue;
            }
            let request = AssetRequest {
                id: record.id.clone(),
                url: record.thumbnail.clone(),
                full_resolution: record.thumbnail == record.url,
                generation,
            };
            if asset_tx.send(request).is_ok() {
                queued += 1;
            }
        }
        self.pending_assets += queued;
    }

    fn recv_until(&mut self, deadline: Instant) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Process events until the pending page lands. False on timeout.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.controller.is_loading() {
            if !self.recv_until(deadline) {
                warn!(timeout_secs = timeout.as_secs(), "page still loading");
                return false;
            }
        }
        self.drain_events();
        true
    }

    /// Process events until every queued asset was measured. False on timeout.
    pub fn wait_assets(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_assets > 0 {
            if !self.recv_until(deadline) {
                warn!(pending = self.pending_assets, "assets still being measured");
                return false;
            }
        }
        true
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Download the full-size asset and record it in the history
    pub fn download(&mut self, record: &ImageRecord) -> Result<PathBuf> {
        let dir = expand_tilde(&self.config.downloads.directory);
        let path = self
            .cache
            .download(record, &dir, self.config.downloads.organize_by_source)
            .with_context(|| format!("Failed to download {}", record.url))?;

        self.library.record_download(record, &path);
        self.library.save()?;
        info!(id = %record.id, path = %path.display(), "downloaded");
        Ok(path)
    }

    pub fn toggle_favorite(&mut self, record: &ImageRecord) -> Result<bool> {
        let now_favorite = self.library.toggle_favorite(record);
        self.library.save()?;
        Ok(now_favorite)
    }

    /// Visible record by 1-based position
    fn record_at(&self, arg: &str) -> Result<ImageRecord> {
        let n: usize = arg
            .trim()
            .parse()
            .with_context(|| format!("Expected a result number, got '{}'", arg))?;
        let visible = self.visible();
        n.checked_sub(1)
            .and_then(|i| visible.get(i))
            .map(|r| (*r).clone())
            .with_context(|| format!("No result {} (showing {})", n, visible.len()))
    }

    /// Store the current source and tag for the next session
    pub fn remember_session(&mut self) {
        let state = self.controller.state();
        self.config.browse.last_source = state.source;
        self.config.browse.last_tag = state.active_tag.clone();
    }

    pub fn prompt(&self) -> String {
        let state = self.controller.state();
        if state.active_tag.is_empty() {
            state.source.id().to_string()
        } else {
            format!("{}#{}", state.source.id(), state.active_tag)
        }
    }

    pub fn listing(&self) -> String {
        let state = self.controller.state();
        let visible = self.visible();

        let mut out = state.source.display_name().to_string();
        if !state.active_tag.is_empty() {
            out.push_str(&format!(" | tag: {}", state.active_tag));
        }
        if !state.search_query.is_empty() {
            out.push_str(&format!(" | search: {}", state.search_query));
        }
        if let Some(filter) = &self.view_filter {
            out.push_str(&format!(" | filter: {}", filter.query()));
        }
        out.push_str(&format!(
            " | {} of {} shown",
            visible.len(),
            self.controller.store().len()
        ));
        if self.controller.is_loading() {
            out.push_str(" | loading");
        } else if !self.controller.is_exhausted() {
            out.push_str(" | 'more' for next page");
        }

        if visible.is_empty() {
            out.push_str("\n  (no results)");
        }
        for (i, record) in visible.iter().enumerate() {
            let star = if self.library.is_favorite(record.source, &record.id) { "*" } else { " " };
            out.push_str(&format!("\n{:>4}.{}{}", i + 1, star, record.summary()));
        }
        out
    }

    /// Run one line of the browse prompt, returning text to print
    pub fn execute_command(&mut self, line: &str) -> Result<Option<String>> {
        self.drain_events();

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (command, args) = match line.strip_prefix('/') {
            Some(rest) => ("/".to_string(), rest.trim()),
            None => {
                let parts: Vec<&str> = line.splitn(2, ' ').collect();
                (parts[0].to_lowercase(), parts.get(1).map(|s| s.trim()).unwrap_or(""))
            }
        };
        let wait = self.page_wait();

        let reply = match command.as_str() {
            "q" | "quit" | "exit" => {
                self.should_quit = true;
                None
            }

            "h" | "help" | "?" => Some(HELP.to_string()),

            "s" | "source" => {
                if args.is_empty() {
                    Some(format_sources(self.controller.state().source))
                } else {
                    let source: Source = args.parse().map_err(anyhow::Error::msg)?;
                    self.set_source(source);
                    self.wait_idle(wait);
                    Some(self.listing())
                }
            }

            "t" | "tag" => {
                if self.set_tag(args) {
                    self.wait_idle(wait);
                }
                Some(self.listing())
            }

            "tags" => Some(
                self.controller
                    .state()
                    .source
                    .suggested_tags()
                    .join(", "),
            ),

            "/" | "search" => {
                self.search(args);
                self.wait_idle(wait);
                Some(self.listing())
            }

            "m" | "more" => {
                if self.load_more() {
                    self.wait_idle(wait);
                    Some(self.listing())
                } else if self.controller.is_exhausted() {
                    Some("No more results".to_string())
                } else {
                    Some("Still loading".to_string())
                }
            }

            "r" | "refresh" => {
                self.refresh();
                self.wait_idle(wait);
                Some(self.listing())
            }

            "l" | "ls" | "list" => Some(self.listing()),

            "show" | "i" | "info" => {
                let record = self.record_at(args)?;
                Some(describe(&record, self.library.is_favorite(record.source, &record.id)))
            }

            "f" | "fav" => {
                let record = self.record_at(args)?;
                let verb = if self.toggle_favorite(&record)? { "Added" } else { "Removed" };
                Some(format!("{} favorite: {}", verb, record.title))
            }

            "d" | "save" | "download" => {
                let record = self.record_at(args)?;
                let path = self.download(&record)?;
                Some(format!("Saved {}", path.display()))
            }

            "favorites" | "favs" => Some(format_favorites(self.library.favorites())),

            "history" => Some(format_history(self.library.history())),

            _ => Some(format!("Unknown command: {} (try 'help')", command)),
        };

        Ok(reply)
    }
}

/// Long-lived worker: fetch each requested asset through the cache and measure it.
/// Requests from a listing that is no longer current are answered with
/// `AssetFailed` without touching the network.
fn asset_worker(
    rx: Receiver<AssetRequest>,
    tx: Sender<AppEvent>,
    cache: Arc<ImageCache>,
    listing_generation: Arc<AtomicU64>,
) {
    while let Ok(request) = rx.recv() {
        if request.generation != listing_generation.load(Ordering::SeqCst) {
            debug!(id = %request.id, "skipping asset from an old listing");
            if tx.send(AppEvent::AssetFailed { id: request.id }).is_err() {
                break;
            }
            continue;
        }

        let measured = cache
            .fetch(&request.url)
            .map_err(anyhow::Error::from)
            .and_then(|path| {
                let result = metadata::measure(&path, request.full_resolution);
                if !cache.is_enabled() {
                    let _ = fs::remove_file(&path);
                }
                result
            });

        let event = match measured {
            Ok(metadata) => AppEvent::AssetReady {
                id: request.id,
                metadata,
            },
            Err(e) => {
                debug!(url = %request.url, "measuring failed: {:#}", e);
                AppEvent::AssetFailed { id: request.id }
            }
        };

        if tx.send(event).is_err() {
            break;
        }
    }
}

/// Interactive session on stdin/stdout
pub fn run_browse(app: &mut App, source: Source) -> Result<()> {
    let tag = if source == app.config.browse.last_source {
        app.config.browse.last_tag.clone()
    } else {
        String::new()
    };
    app.open(source, &tag, "");
    app.wait_idle(app.page_wait());
    println!("{}", app.listing());
    println!("Type 'help' for commands.");

    while !app.should_quit {
        let line: String = Input::new()
            .with_prompt(app.prompt())
            .allow_empty(true)
            .interact_text()
            .context("Failed to read command")?;

        match app.execute_command(&line) {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {}
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    app.remember_session();
    app.config.save()?;
    Ok(())
}

pub fn format_sources(current: Source) -> String {
    Source::ALL
        .iter()
        .map(|s| {
            let marker = if *s == current { "*" } else { " " };
            format!("{} {:<11} {}", marker, s.id(), s.display_name())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe(record: &ImageRecord, favorite: bool) -> String {
    let mut lines = vec![
        format!("{}{}", record.title, if favorite { " *" } else { "" }),
        format!("  id:        {}", record.id),
        format!("  source:    {}", record.source.display_name()),
    ];
    if record.has_dimensions() {
        lines.push(format!("  size:      {}x{}", record.width, record.height));
    }
    if let Some(ratio) = record.ratio_label() {
        lines.push(format!("  ratio:     {}", ratio));
    }
    if !record.tags.is_empty() {
        lines.push(format!("  tags:      {}", record.tags.join(", ")));
    }
    if !record.colors.is_empty() {
        lines.push(format!("  colors:    {}", record.colors.join(", ")));
    }
    if let Some(category) = &record.category {
        lines.push(format!("  category:  {}", category));
    }
    if let Some(purity) = &record.purity {
        lines.push(format!("  purity:    {}", purity));
    }
    if let Some(date) = &record.date_added {
        lines.push(format!("  added:     {}", date));
    }
    if let Some(views) = record.views {
        lines.push(format!("  views:     {}", views));
    }
    if let Some(favorites) = record.favorites {
        lines.push(format!("  favorites: {}", favorites));
    }
    if let Some(size) = record.file_size {
        lines.push(format!("  file size: {}", format_size(size)));
    }
    if record.nsfw {
        lines.push("  nsfw".to_string());
    }
    lines.push(format!("  url:       {}", record.url));
    if record.thumbnail != record.url {
        lines.push(format!("  thumbnail: {}", record.thumbnail));
    }
    lines.join("\n")
}

pub fn format_favorites(favorites: &[ImageRecord]) -> String {
    if favorites.is_empty() {
        return "No favorites yet".to_string();
    }
    favorites
        .iter()
        .map(|r| format!("  {} {}  {}", r.source.id(), r.id, r.summary()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "No downloads yet".to_string();
    }
    history
        .iter()
        .map(|e| {
            format!(
                "  {}  {}  {}",
                e.downloaded_at.format("%Y-%m-%d %H:%M"),
                e.record.title,
                e.path.display()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
