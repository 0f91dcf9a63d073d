use super::{decode, HttpTransport, Page, PageQuery, ProviderClient, ProviderError, Request};
use crate::record::{ImageRecord, Source};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const API_BASE: &str = "https://nekos.moe/api/v1";
const ASSET_BASE: &str = "https://nekos.moe";

pub const PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageData {
    id: Option<String>,
    artist: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    nsfw: bool,
    created_at: Option<String>,
    likes: Option<u64>,
    favorites: Option<u64>,
}

/// Search body fields for a tag/query pair
fn search_body(query: &PageQuery) -> Value {
    let mut body = Map::new();

    let artist = query.query.trim();
    if !artist.is_empty() {
        body.insert("artist".into(), Value::from(artist));
    }

    let tag = query.tag.trim().to_lowercase();
    match tag.as_str() {
        "" => {}
        "nsfw" => {
            body.insert("nsfw".into(), Value::Bool(true));
        }
        "gif" | "animated" => {
            body.insert("animated".into(), Value::Bool(true));
        }
        _ => {
            body.insert("tags".into(), Value::from(vec![tag.clone()]));
        }
    }
    Value::Object(body)
}

fn normalize(item: ImageData) -> Option<ImageRecord> {
    // Search results carry no direct links; assets are addressed by id
    let id = item.id.filter(|id| !id.is_empty())?;
    let url = format!("{}/image/{}.jpg", ASSET_BASE, id);
    let thumbnail = format!("{}/thumbnail/{}.jpg", ASSET_BASE, id);

    let mut record = ImageRecord::new(Source::NekosMoe, Some(id), &url, Some(&thumbnail));
    record.title = item
        .artist
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| "Unknown Artist".to_string());
    record.tags = item.tags;
    record.nsfw = item.nsfw;
    record.date_added = item.created_at;
    record.favorites = item.favorites.or(item.likes);
    Some(record)
}

pub struct NekosMoeClient {
    transport: Arc<dyn HttpTransport>,
}

impl NekosMoeClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn build_request(&self, query: &PageQuery) -> Request {
        let skip = (query.page.max(1) - 1) * PAGE_SIZE;
        Request::post(format!("{}/images/search", API_BASE), search_body(query))
            .query("limit", PAGE_SIZE)
            .query("skip", skip)
    }
}

impl ProviderClient for NekosMoeClient {
    fn source(&self) -> Source {
        Source::NekosMoe
    }

    fn fetch_page(&self, query: &PageQuery) -> Result<Page, ProviderError> {
        let request = self.build_request(query);
        let value = self.transport.send_json(&request)?;
        let response: SearchResponse = decode(&request.url, value)?;

        let returned = response.images.len();
        let records: Vec<ImageRecord> = response.images.into_iter().filter_map(normalize).collect();

        Ok(Page {
            records,
            exhausted: returned < PAGE_SIZE as usize,
            seed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::ScriptedTransport;
    use serde_json::json;

    fn fixture() -> Value {
        json!({
            "images": [
                {
                    "id": "HJ8MOkRfM",
                    "originalHash": "e3b0c44298fc1c149afbf4c8996fb924",
                    "artist": "ruka",
                    "tags": ["catgirl", "neko_ears", "blue eyes"],
                    "nsfw": false,
                    "likes": 12,
                    "favorites": 4,
                    "createdAt": "2018-03-01T20:12:48.052Z",
                    "uploader": {"id": "u1", "username": "someone"}
                },
                {
                    "id": "rkzQ0QYHf",
                    "tags": [],
                    "nsfw": true
                },
                {
                    "artist": "no id"
                }
            ]
        })
    }

    fn client(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, NekosMoeClient) {
        let transport = Arc::new(transport);
        (transport.clone(), NekosMoeClient::new(transport))
    }

    #[test]
    fn test_normalizes_search_response() {
        let (_, client) = client(ScriptedTransport::new().respond("/images/search", fixture()));
        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();

        assert_eq!(page.records.len(), 2);
        assert!(page.exhausted);

        let first = &page.records[0];
        assert_eq!(first.source, Source::NekosMoe);
        assert_eq!(first.id, "HJ8MOkRfM");
        assert_eq!(first.url, "https://nekos.moe/image/HJ8MOkRfM.jpg");
        assert_eq!(first.thumbnail, "https://nekos.moe/thumbnail/HJ8MOkRfM.jpg");
        assert_eq!(first.title, "ruka");
        assert_eq!(first.tags, vec!["catgirl", "neko_ears", "blue eyes"]);
        assert_eq!(first.favorites, Some(4));
        assert_eq!(first.date_added.as_deref(), Some("2018-03-01T20:12:48.052Z"));
        assert!(!first.has_dimensions());

        let second = &page.records[1];
        assert_eq!(second.title, "Unknown Artist");
        assert!(second.nsfw);
    }

    #[test]
    fn test_full_page_is_not_exhausted() {
        let images: Vec<Value> = (0..PAGE_SIZE).map(|i| json!({"id": format!("id{}", i)})).collect();
        let (_, client) = client(ScriptedTransport::new().respond("/images/search", json!({ "images": images })));
        let page = client.fetch_page(&PageQuery::first("", "")).unwrap();
        assert_eq!(page.records.len(), PAGE_SIZE as usize);
        assert!(!page.exhausted);
    }

    #[test]
    fn test_request_body_and_paging() {
        let (_, client) = client(ScriptedTransport::new());
        let query = PageQuery {
            page: 3,
            query: "ruka".into(),
            tag: "Catgirl".into(),
            seed: None,
        };
        let request = client.build_request(&query);
        assert!(request.is_post());
        assert_eq!(request.param("limit"), Some("20"));
        assert_eq!(request.param("skip"), Some("40"));
        assert_eq!(request.body, Some(json!({"artist": "ruka", "tags": ["catgirl"]})));

        let request = client.build_request(&PageQuery::first("", "gif"));
        assert_eq!(request.param("skip"), Some("0"));
        assert_eq!(request.body, Some(json!({"animated": true})));

        let request = client.build_request(&PageQuery::first("", "nsfw"));
        assert_eq!(request.body, Some(json!({"nsfw": true})));
    }
}
