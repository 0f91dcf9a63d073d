use super::{HttpTransport, Page, PageQuery, ProviderClient, ProviderError, Request};
use crate::record::{ImageRecord, Source};
use crate::utils::title_case;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.waifu.pics";

/// Upper bound on records taken from one bulk response
pub const BULK_LIMIT: usize = 20;
/// Single-image requests made when the bulk endpoint yields nothing
pub const SINGLE_ATTEMPTS: usize = 10;

static SFW_TYPES: &[&str] = &[
    "waifu", "neko", "shinobu", "megumin", "bully", "cuddle", "cry", "hug", "awoo", "kiss", "lick",
    "pat", "smug", "bonk", "yeet", "blush", "smile", "wave", "highfive", "handhold", "nom", "bite",
    "glomp", "slap", "kill", "kick", "happy", "wink", "poke", "dance", "cringe",
];

static NSFW_TYPES: &[&str] = &["waifu", "neko", "trap", "blowjob"];

/// `(endpoint, category)` for a tag; the query stands in when it names a category
fn resolve_endpoint(tag: &str, query: &str) -> (&'static str, &'static str) {
    let mut candidate = tag.trim().to_lowercase();
    if candidate.is_empty() {
        candidate = query.trim().to_lowercase();
    }

    if candidate == "nsfw" {
        return ("nsfw", "waifu");
    }
    if let Some(category) = SFW_TYPES.iter().find(|c| **c == candidate) {
        return ("sfw", *category);
    }
    if let Some(category) = NSFW_TYPES.iter().find(|c| **c == candidate) {
        return ("nsfw", *category);
    }
    ("sfw", "waifu")
}

pub struct WaifuPicsClient {
    transport: Arc<dyn HttpTransport>,
}

impl WaifuPicsClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn record(&self, url: &str, endpoint: &str, category: &str, title: String) -> ImageRecord {
        let mut record = ImageRecord::new(Source::WaifuPics, None, url, None);
        record.title = title;
        record.tags = vec![category.to_string()];
        record.nsfw = endpoint == "nsfw";
        record.category = Some(category.to_string());
        record
    }

    fn fetch_bulk(&self, endpoint: &str, category: &str) -> Result<Vec<ImageRecord>, ProviderError> {
        let request = Request::post(format!("{}/many/{}/{}", API_BASE, endpoint, category), json!({}));
        let value = self.transport.send_json(&request)?;
        let files = value
            .get("files")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let title = title_case(category);
        Ok(files
            .iter()
            .filter_map(Value::as_str)
            .filter(|url| !url.is_empty())
            .take(BULK_LIMIT)
            .map(|url| self.record(url, endpoint, category, title.clone()))
            .collect())
    }

    fn fetch_singles(&self, endpoint: &str, category: &str) -> Vec<ImageRecord> {
        let request = Request::get(format!("{}/{}/{}", API_BASE, endpoint, category));
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for attempt in 0..SINGLE_ATTEMPTS {
            match self.transport.send_json(&request) {
                Ok(value) => match value.get("url").and_then(Value::as_str) {
                    Some(url) if !url.is_empty() => {
                        if seen.insert(url.to_string()) {
                            let title = format!("{} {}", title_case(category), records.len() + 1);
                            records.push(self.record(url, endpoint, category, title));
                        }
                    }
                    _ => debug!(attempt = attempt + 1, "waifu.pics single response without url"),
                },
                Err(e) => warn!(attempt = attempt + 1, "waifu.pics single request failed: {}", e),
            }
        }
        records
    }
}

impl ProviderClient for WaifuPicsClient {
    fn source(&self) -> Source {
        Source::WaifuPics
    }

    /// There is no upstream pagination: every page is a fresh random batch.
    fn fetch_page(&self, query: &PageQuery) -> Result<Page, ProviderError> {
        let (endpoint, category) = resolve_endpoint(&query.tag, &query.query);

        match self.fetch_bulk(endpoint, category) {
            Ok(records) if !records.is_empty() => {
                return Ok(Page {
                    records,
                    exhausted: false,
                    seed: None,
                })
            }
            Ok(_) => info!("waifu.pics bulk endpoint returned no files, falling back"),
            Err(e) => warn!("waifu.pics bulk request failed, falling back: {}", e),
        }

        Ok(Page {
            records: self.fetch_singles(endpoint, category),
            exhausted: false,
            seed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::ScriptedTransport;

    fn client(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, WaifuPicsClient) {
        let transport = Arc::new(transport);
        (transport.clone(), WaifuPicsClient::new(transport))
    }

    #[test]
    fn test_bulk_endpoint() {
        let files: Vec<String> = (0..30).map(|i| format!("https://i.waifu.pics/{}.png", i)).collect();
        let (transport, client) = client(ScriptedTransport::new().respond("/many/sfw/neko", json!({ "files": files })));

        let page = client.fetch_page(&PageQuery::first("", "neko")).unwrap();
        assert_eq!(page.records.len(), BULK_LIMIT);
        for record in &page.records {
            assert_eq!(record.source, Source::WaifuPics);
            assert!(!record.id.is_empty());
            assert_eq!(record.thumbnail, record.url);
            assert_eq!(record.tags, vec!["neko"]);
            assert!(!record.has_dimensions());
            assert!(!record.nsfw);
        }
        assert_eq!(page.records[0].title, "Neko");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_post());
    }

    #[test]
    fn test_empty_bulk_falls_back_to_singles() {
        let transport = ScriptedTransport::new()
            .respond("/many/", json!({"files": []}))
            .respond("api.waifu.pics/sfw/waifu", json!({"url": "https://i.waifu.pics/a.jpg"}))
            .respond("api.waifu.pics/sfw/waifu", json!({"url": "https://i.waifu.pics/b.jpg"}));
        let (transport, client) = client(transport);

        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();
        assert!(!page.records.is_empty());
        // Repeated urls are collapsed
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].title, "Waifu 1");
        assert_eq!(page.records[1].title, "Waifu 2");
        assert_eq!(transport.requests().len(), 1 + SINGLE_ATTEMPTS);
    }

    #[test]
    fn test_single_failures_do_not_stop_fallback() {
        let transport = ScriptedTransport::new()
            .fail("/many/", 500)
            .fail("api.waifu.pics/sfw/waifu", 502)
            .fail("api.waifu.pics/sfw/waifu", 502)
            .respond("api.waifu.pics/sfw/waifu", json!({"url": "https://i.waifu.pics/c.jpg"}));
        let (_, client) = client(transport);

        let page = client.fetch(&PageQuery::first("", ""));
        assert_eq!(page.records.len(), 1);
        assert!(!page.exhausted);
    }

    #[test]
    fn test_everything_failing_is_empty() {
        let (_, client) = client(ScriptedTransport::new());
        let page = client.fetch(&PageQuery::first("", ""));
        assert!(page.records.is_empty());
        assert!(page.exhausted);
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(resolve_endpoint("", ""), ("sfw", "waifu"));
        assert_eq!(resolve_endpoint("Hug", ""), ("sfw", "hug"));
        assert_eq!(resolve_endpoint("nsfw", ""), ("nsfw", "waifu"));
        assert_eq!(resolve_endpoint("trap", ""), ("nsfw", "trap"));
        assert_eq!(resolve_endpoint("landscape", ""), ("sfw", "waifu"));
        assert_eq!(resolve_endpoint("", "megumin"), ("sfw", "megumin"));
    }

    #[test]
    fn test_nsfw_records_are_flagged() {
        let transport =
            ScriptedTransport::new().respond("/many/nsfw/waifu", json!({"files": ["https://i.waifu.pics/n.jpg"]}));
        let (_, client) = client(transport);
        let page = client.fetch_page(&PageQuery::first("", "nsfw")).unwrap();
        assert!(page.records[0].nsfw);
    }
}
