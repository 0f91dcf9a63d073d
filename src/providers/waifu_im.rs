use super::{decode, HttpTransport, Page, PageQuery, ProviderClient, ProviderError, Request};
use crate::record::{ImageRecord, Source};
use crate::utils::{coarse_color_from_hex, title_case};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.waifu.im";

/// The API often returns a single image even with `many=true`, so a page is
/// assembled from several attempts.
pub const MAX_ATTEMPTS: usize = 12;
pub const TARGET_COUNT: usize = 24;

static VALID_TAGS: &[&str] = &[
    "maid",
    "waifu",
    "marin-kitagawa",
    "mori-calliope",
    "raiden-shogun",
    "oppai",
    "selfies",
    "uniform",
    "school",
    "kemonomimi",
    "fox-girl",
    "glasses",
    "student",
    "blonde",
    "elf",
];

static CHARACTER_TAGS: &[&str] = &["marin-kitagawa", "mori-calliope", "raiden-shogun"];

#[derive(Debug, Clone, PartialEq)]
enum TagParam {
    Nsfw,
    /// Exact or nearest valid tag
    Selected(&'static str, bool),
    Included(String),
}

/// Exact match, then the first valid tag containing the input
fn nearest_valid_tag(lower: &str) -> Option<(&'static str, bool)> {
    if let Some(exact) = VALID_TAGS.iter().find(|t| **t == lower) {
        return Some((*exact, true));
    }
    VALID_TAGS
        .iter()
        .find(|t| t.contains(lower))
        .map(|t| (*t, false))
}

fn resolve_tag(tag: &str, query: &str) -> Option<TagParam> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        // The search box is only usable when it names a known tag
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        return nearest_valid_tag(&query).map(|(t, exact)| TagParam::Selected(t, exact));
    }
    if tag == "nsfw" {
        return Some(TagParam::Nsfw);
    }
    Some(match nearest_valid_tag(&tag) {
        Some((t, exact)) => TagParam::Selected(t, exact),
        None => TagParam::Included(tag),
    })
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageId {
    Number(u64),
    Text(String),
}

impl ImageId {
    fn into_string(self) -> String {
        match self {
            ImageId::Number(n) => n.to_string(),
            ImageId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageData {
    image_id: Option<ImageId>,
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    is_nsfw: bool,
    dominant_color: Option<String>,
    uploaded_at: Option<String>,
    byte_size: Option<u64>,
    favorites: Option<u64>,
    #[serde(default)]
    tags: Vec<TagData>,
}

#[derive(Debug, Deserialize)]
struct TagData {
    #[serde(default)]
    name: String,
}

fn normalize(item: ImageData) -> Option<ImageRecord> {
    let url = item.url.filter(|u| !u.is_empty())?;
    let tags: Vec<String> = item
        .tags
        .into_iter()
        .map(|t| t.name)
        .filter(|n| !n.is_empty())
        .collect();

    let title = match CHARACTER_TAGS.iter().find(|c| tags.iter().any(|t| t.as_str() == **c)) {
        Some(character) => title_case(&character.replace('-', " ")),
        None => title_case(tags.first().map(String::as_str).unwrap_or("waifu")),
    };

    let mut record = ImageRecord::new(
        Source::WaifuIm,
        item.image_id.map(ImageId::into_string),
        &url,
        None,
    )
    .with_dimensions(item.width, item.height);
    record.title = title;
    record.tags = tags;
    record.nsfw = item.is_nsfw;
    record.colors = item
        .dominant_color
        .as_deref()
        .and_then(coarse_color_from_hex)
        .map(|c| vec![c.to_string()])
        .unwrap_or_default();
    record.date_added = item.uploaded_at;
    record.file_size = item.byte_size;
    record.favorites = item.favorites;
    Some(record)
}

/// Accepts both the `images` array and a bare single-image object
fn parse_images(url: &str, value: Value) -> Result<Vec<ImageRecord>, ProviderError> {
    let single = value.get("url").is_some() && value.get("images").is_none();
    let items = if single {
        vec![decode::<ImageData>(url, value)?]
    } else {
        decode::<SearchResponse>(url, value)?.images
    };
    Ok(items.into_iter().filter_map(normalize).collect())
}

pub struct WaifuImClient {
    transport: Arc<dyn HttpTransport>,
    delay: Duration,
}

impl WaifuImClient {
    pub fn new(transport: Arc<dyn HttpTransport>, delay: Duration) -> Self {
        Self { transport, delay }
    }

    fn build_request(&self, query: &PageQuery, attempt: usize) -> Request {
        let mut request = Request::get(format!("{}/search", API_BASE))
            .header("Accept", "application/json")
            .query("many", "true")
            .query("gif", "false")
            .query("_", format!("{}-{}", attempt, rand::random::<u32>()));

        match resolve_tag(&query.tag, &query.query) {
            Some(TagParam::Nsfw) => request = request.query("is_nsfw", "true"),
            Some(TagParam::Selected(tag, exact)) => {
                request = request.query("selected_tags", tag);
                if exact {
                    request = request.query("is_nsfw", "false");
                }
            }
            Some(TagParam::Included(tag)) => request = request.query("included_tags", tag),
            None => {}
        }
        request
    }
}

impl ProviderClient for WaifuImClient {
    fn source(&self) -> Source {
        Source::WaifuIm
    }

    fn fetch_page(&self, query: &PageQuery) -> Result<Page, ProviderError> {
        let mut records: Vec<ImageRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for attempt in 0..MAX_ATTEMPTS {
            if records.len() >= TARGET_COUNT {
                break;
            }
            if attempt > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }

            let request = self.build_request(query, attempt);
            let batch = self
                .transport
                .send_json(&request)
                .and_then(|value| parse_images(&request.url, value));

            match batch {
                Ok(batch) => {
                    for record in batch {
                        if seen.insert(record.id.clone()) {
                            records.push(record);
                        }
                    }
                }
                Err(e) => warn!(attempt = attempt + 1, "waifu.im attempt failed: {}", e),
            }
        }

        debug!(count = records.len(), "waifu.im page assembled");
        Ok(Page {
            records,
            exhausted: false,
            seed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::ScriptedTransport;
    use serde_json::json;

    fn image(id: u64, tags: &[&str]) -> Value {
        json!({
            "image_id": id,
            "signature": "58e6f0372364abda",
            "extension": ".jpg",
            "url": format!("https://cdn.waifu.im/{}.jpg", id),
            "preview_url": format!("https://www.waifu.im/preview/{}/", id),
            "width": 2000,
            "height": 3000,
            "is_nsfw": false,
            "dominant_color": "#cc0000",
            "uploaded_at": "2021-11-02T11:16:19.048684+00:00",
            "byte_size": 1054128,
            "favorites": 2,
            "tags": tags.iter().map(|t| json!({"tag_id": 1, "name": t, "is_nsfw": false})).collect::<Vec<_>>()
        })
    }

    fn client(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, WaifuImClient) {
        let transport = Arc::new(transport);
        (transport.clone(), WaifuImClient::new(transport, Duration::ZERO))
    }

    #[test]
    fn test_normalizes_and_dedups_across_attempts() {
        let transport = ScriptedTransport::new()
            .respond("/search", json!({"images": [image(1, &["waifu", "maid"])]}))
            .respond("/search", json!({"images": [image(1, &["waifu"]), image(2, &["marin-kitagawa", "waifu"])]}))
            .respond("/search", json!({"images": []}));
        let (transport, client) = client(transport);

        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();
        assert_eq!(transport.requests().len(), MAX_ATTEMPTS);
        assert_eq!(page.records.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.id, "1");
        assert_eq!(first.source, Source::WaifuIm);
        assert_eq!(first.thumbnail, first.url);
        assert_eq!(first.title, "Waifu");
        assert_eq!(first.tags, vec!["waifu", "maid"]);
        assert_eq!((first.width, first.height), (2000, 3000));
        assert_eq!(first.ratio.as_deref(), Some("2:3"));
        assert_eq!(first.colors, vec!["red"]);
        assert_eq!(first.file_size, Some(1054128));

        assert_eq!(page.records[1].title, "Marin Kitagawa");
    }

    #[test]
    fn test_stops_at_target_count() {
        let batch: Vec<Value> = (0..TARGET_COUNT as u64).map(|i| image(i, &["maid"])).collect();
        let (transport, client) = client(ScriptedTransport::new().respond("/search", json!({ "images": batch })));
        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();
        assert_eq!(page.records.len(), TARGET_COUNT);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_failed_attempts_are_skipped() {
        let transport = ScriptedTransport::new()
            .fail("/search", 500)
            .respond("/search", json!({"images": [image(7, &["elf"])]}));
        let (_, client) = client(transport);
        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn test_single_image_response() {
        let records = parse_images("u", image(42, &[])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "42");
        assert_eq!(records[0].title, "Waifu");
    }

    #[test]
    fn test_missing_id_is_synthesized() {
        let body = json!({"images": [{"url": "https://cdn.waifu.im/x.png", "tags": []}]});
        let records = parse_images("u", body).unwrap();
        assert!(!records[0].id.is_empty());
        assert!(!records[0].has_dimensions());
    }

    #[test]
    fn test_tag_resolution() {
        assert_eq!(resolve_tag("NSFW", ""), Some(TagParam::Nsfw));
        assert_eq!(resolve_tag("maid", ""), Some(TagParam::Selected("maid", true)));
        assert_eq!(resolve_tag("marin", ""), Some(TagParam::Selected("marin-kitagawa", false)));
        assert_eq!(resolve_tag("catgirl", ""), Some(TagParam::Included("catgirl".into())));
        assert_eq!(resolve_tag("", "raiden"), Some(TagParam::Selected("raiden-shogun", false)));
        assert_eq!(resolve_tag("", "sunset beach"), None);
        assert_eq!(resolve_tag("", ""), None);
    }

    #[test]
    fn test_request_parameters() {
        let (_, client) = client(ScriptedTransport::new());
        let a = client.build_request(&PageQuery::first("", "maid"), 0);
        let b = client.build_request(&PageQuery::first("", "maid"), 1);
        assert_eq!(a.param("selected_tags"), Some("maid"));
        assert_eq!(a.param("is_nsfw"), Some("false"));
        assert_eq!(a.param("many"), Some("true"));
        assert_ne!(a.param("_"), b.param("_"));
    }
}
