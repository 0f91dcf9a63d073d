//! Page/source/tag coordinates of the current listing and the guard that keeps
//! results from an outdated listing out of the store.
//!
//! Fetches cannot be cancelled. Instead every request carries the
//! [`FetchContext`] it was started under, and [`PaginationController::complete`]
//! accepts an outcome only while that context is still current.

use crate::providers::{Page, PageQuery};
use crate::record::{AssetMetadata, Source};
use crate::store::ResultStore;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub source: Source,
    /// 1-based
    pub page: u32,
    pub search_query: String,
    pub active_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
}

/// Identity of a listing. `generation` changes on every reset, so two
/// listings with equal coordinates started at different times still differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    pub generation: u64,
    pub source: Source,
    pub search_query: String,
    pub active_tag: String,
}

/// Work order for a fetch worker
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub context: FetchContext,
    pub query: PageQuery,
    /// Appends to the listing (load more) rather than starting it
    pub append: bool,
}

impl FetchRequest {
    pub fn outcome(self, page: Page) -> FetchOutcome {
        FetchOutcome {
            context: self.context,
            page,
        }
    }
}

/// A finished fetch, tagged with the context it was started under
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub context: FetchContext,
    pub page: Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Listing changed while the fetch was in flight; nothing applied
    Stale,
    Applied { added: usize, dropped: usize },
}

#[derive(Debug)]
pub struct PaginationController {
    state: FilterState,
    load_state: LoadState,
    generation: u64,
    exhausted: bool,
    seed: Option<String>,
    store: ResultStore,
}

impl PaginationController {
    pub fn new(source: Source) -> Self {
        Self {
            state: FilterState {
                source,
                page: 1,
                search_query: String::new(),
                active_tag: String::new(),
            },
            load_state: LoadState::Idle,
            generation: 0,
            exhausted: false,
            seed: None,
            store: ResultStore::new(),
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn context(&self) -> FetchContext {
        FetchContext {
            generation: self.generation,
            source: self.state.source,
            search_query: self.state.search_query.clone(),
            active_tag: self.state.active_tag.clone(),
        }
    }

    fn begin(&mut self, append: bool) -> FetchRequest {
        self.load_state = LoadState::Loading;
        FetchRequest {
            context: self.context(),
            query: PageQuery {
                page: self.state.page,
                query: self.state.search_query.clone(),
                tag: self.state.active_tag.clone(),
                seed: self.seed.clone(),
            },
            append,
        }
    }

    /// Start a fresh listing at page 1 under a new generation
    fn reset(&mut self) -> FetchRequest {
        self.generation += 1;
        self.state.page = 1;
        self.exhausted = false;
        self.seed = None;
        self.store.clear();
        self.begin(false)
    }

    /// Start a listing with all coordinates set at once
    pub fn open(&mut self, source: Source, tag: &str, search_query: &str) -> FetchRequest {
        self.state.source = source;
        self.state.active_tag = tag.trim().to_lowercase();
        self.state.search_query = search_query.trim().to_lowercase();
        self.reset()
    }

    /// Switch provider; tag and search are cleared
    pub fn source_changed(&mut self, source: Source) -> FetchRequest {
        debug!(from = %self.state.source, to = %source, "source changed");
        self.open(source, "", "")
    }

    /// `None` if the tag is already active
    pub fn tag_changed(&mut self, tag: &str) -> Option<FetchRequest> {
        let tag = tag.trim().to_lowercase();
        if tag == self.state.active_tag {
            return None;
        }
        self.state.active_tag = tag;
        Some(self.reset())
    }

    /// Server-side search term change; `None` if unchanged
    pub fn search_changed(&mut self, query: &str) -> Option<FetchRequest> {
        let query = query.trim().to_lowercase();
        if query == self.state.search_query {
            return None;
        }
        self.state.search_query = query;
        Some(self.reset())
    }

    /// Next page of the current listing; `None` while loading or once exhausted
    pub fn load_more(&mut self) -> Option<FetchRequest> {
        if self.is_loading() || self.exhausted {
            return None;
        }
        self.state.page += 1;
        Some(self.begin(true))
    }

    /// Reload the current source from scratch, dropping tag and search
    pub fn refresh(&mut self) -> FetchRequest {
        self.source_changed(self.state.source)
    }

    /// Apply a finished fetch if its context is still current
    pub fn complete(&mut self, outcome: FetchOutcome) -> Completion {
        let FetchOutcome { context, page } = outcome;

        if context != self.context() {
            debug!(
                fetched_source = %context.source,
                fetched_generation = context.generation,
                current_source = %self.state.source,
                current_generation = self.generation,
                discarded = page.records.len(),
                "discarding stale page"
            );
            return Completion::Stale;
        }

        self.load_state = LoadState::Idle;
        self.exhausted = page.exhausted;
        if page.seed.is_some() {
            self.seed = page.seed;
        }

        let expected = self.state.source;
        let mut added = 0;
        let mut dropped = 0;
        for record in page.records {
            if record.source != expected {
                warn!(id = %record.id, source = %record.source, expected = %expected, "dropping mis-tagged record");
                dropped += 1;
                continue;
            }
            if self.store.insert(record) {
                added += 1;
            }
        }

        Completion::Applied { added, dropped }
    }

    /// Merge measured asset metadata into a stored record
    pub fn enrich(&mut self, id: &str, meta: &AssetMetadata) -> bool {
        self.store.enrich(id, meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ImageRecord;

    fn page_of(source: Source, ids: std::ops::Range<usize>, exhausted: bool) -> Page {
        Page {
            records: ids
                .map(|i| ImageRecord::new(source, Some(format!("{}-{}", source, i)), "https://x", None))
                .collect(),
            exhausted,
            seed: None,
        }
    }

    #[test]
    fn test_source_change_clears_store_before_fetch_lands() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let req = ctl.refresh();
        ctl.complete(req.outcome(page_of(Source::Wallhaven, 0..20, false)));
        assert_eq!(ctl.store().len(), 20);

        let req = ctl.source_changed(Source::NekosMoe);
        assert!(ctl.store().is_empty());
        assert!(ctl.is_loading());
        assert_eq!(req.query.page, 1);
        assert!(!req.append);
    }

    #[test]
    fn test_load_more_appends() {
        let mut ctl = PaginationController::new(Source::NekosMoe);
        let req = ctl.refresh();
        ctl.complete(req.outcome(page_of(Source::NekosMoe, 0..20, false)));

        let req = ctl.load_more().expect("more pages");
        assert_eq!(req.query.page, 2);
        assert!(req.append);

        // Overlapping ids are not duplicated
        let result = ctl.complete(req.outcome(page_of(Source::NekosMoe, 15..35, false)));
        assert_eq!(result, Completion::Applied { added: 15, dropped: 0 });
        assert_eq!(ctl.store().len(), 35);
        assert_eq!(ctl.store().records()[0].id, "nekos_moe-0");
        assert_eq!(ctl.state().page, 2);
    }

    #[test]
    fn test_stale_source_results_are_discarded() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let for_a = ctl.refresh();
        let for_b = ctl.source_changed(Source::WaifuPics);

        let result = ctl.complete(for_a.outcome(page_of(Source::Wallhaven, 0..24, false)));
        assert_eq!(result, Completion::Stale);
        assert!(ctl.store().is_empty());
        // The listing for B is still pending
        assert!(ctl.is_loading());

        ctl.complete(for_b.outcome(page_of(Source::WaifuPics, 0..5, false)));
        assert_eq!(ctl.store().len(), 5);
        assert!(ctl.store().records().iter().all(|r| r.source == Source::WaifuPics));
        assert!(!ctl.is_loading());
    }

    #[test]
    fn test_stale_after_refresh_of_same_source() {
        let mut ctl = PaginationController::new(Source::WaifuIm);
        let first = ctl.refresh();
        let second = ctl.refresh();
        assert_eq!(first.context.source, second.context.source);
        assert_eq!(
            ctl.complete(first.outcome(page_of(Source::WaifuIm, 0..3, false))),
            Completion::Stale
        );
    }

    #[test]
    fn test_mis_tagged_records_are_dropped() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let req = ctl.refresh();
        let mut page = page_of(Source::Wallhaven, 0..3, false);
        page.records.extend(page_of(Source::NekosMoe, 0..2, false).records);

        let result = ctl.complete(req.outcome(page));
        assert_eq!(result, Completion::Applied { added: 3, dropped: 2 });
    }

    #[test]
    fn test_tag_change_is_noop_when_unchanged() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let req = ctl.tag_changed("Anime").expect("new tag");
        assert_eq!(req.query.tag, "anime");
        ctl.complete(req.outcome(page_of(Source::Wallhaven, 0..4, false)));

        assert!(ctl.tag_changed("anime").is_none());
        assert_eq!(ctl.store().len(), 4);
    }

    #[test]
    fn test_load_more_blocked_while_loading_or_exhausted() {
        let mut ctl = PaginationController::new(Source::NekosMoe);
        let req = ctl.refresh();
        assert!(ctl.load_more().is_none());

        ctl.complete(req.outcome(page_of(Source::NekosMoe, 0..7, true)));
        assert!(ctl.is_exhausted());
        assert!(ctl.load_more().is_none());

        // A new listing is not exhausted
        ctl.tag_changed("catgirl");
        assert!(!ctl.is_exhausted());
    }

    #[test]
    fn test_seed_is_kept_for_later_pages_only() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let req = ctl.refresh();
        assert_eq!(req.query.seed, None);

        let mut page = page_of(Source::Wallhaven, 0..24, false);
        page.seed = Some("Xk3b9a".into());
        ctl.complete(req.outcome(page));

        let req = ctl.load_more().expect("more pages");
        assert_eq!(req.query.seed.as_deref(), Some("Xk3b9a"));
        ctl.complete(req.outcome(page_of(Source::Wallhaven, 24..48, false)));

        let req = ctl.search_changed("mountain").expect("new search");
        assert_eq!(req.query.seed, None);
        assert_eq!(req.query.query, "mountain");
    }

    #[test]
    fn test_open_sets_all_coordinates() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        let req = ctl.open(Source::NekosMoe, " Catgirl ", "Artist");
        assert_eq!(req.context.source, Source::NekosMoe);
        assert_eq!(req.query.tag, "catgirl");
        assert_eq!(req.query.query, "artist");
        assert_eq!(req.query.page, 1);
    }

    #[test]
    fn test_refresh_clears_tag_and_search() {
        let mut ctl = PaginationController::new(Source::Wallhaven);
        ctl.tag_changed("anime");
        ctl.search_changed("frieren");
        let req = ctl.refresh();
        assert_eq!(req.query.tag, "");
        assert_eq!(req.query.query, "");
        assert_eq!(ctl.state().source, Source::Wallhaven);
    }
}
