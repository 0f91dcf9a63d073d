use super::{decode, HttpTransport, Page, PageQuery, ProviderClient, ProviderError, Request};
use crate::record::{ImageRecord, Source};
use crate::utils::{coarse_colors_from_hex, title_case};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const API_BASE: &str = "https://wallhaven.cc/api/v1";

/// Free-form tag input mapped onto Wallhaven's vocabulary
static TAG_SYNONYMS: &[(&str, &str)] = &[
    ("cartoon", "general"),
    ("drawing", "general"),
    ("illustration", "general"),
    ("manga", "anime"),
    ("character", "anime"),
    ("portrait", "people"),
    ("male", "people"),
    ("female", "people"),
    ("person", "people"),
    ("crimson", "red"),
    ("scarlet", "red"),
    ("maroon", "red"),
    ("azure", "blue"),
    ("cyan", "blue"),
    ("teal", "blue"),
    ("navy", "blue"),
    ("emerald", "green"),
    ("lime", "green"),
    ("olive", "green"),
    ("gold", "yellow"),
    ("amber", "yellow"),
    ("violet", "purple"),
    ("magenta", "purple"),
    ("lavender", "purple"),
    ("rose", "pink"),
    ("tan", "brown"),
    ("beige", "brown"),
    ("gray", "black"),
    ("grey", "black"),
    ("cream", "white"),
];

/// Color tags and the palette codes the API accepts
static COLOR_CODES: &[(&str, &str)] = &[
    ("red", "cc0000"),
    ("blue", "0066cc"),
    ("green", "669900"),
    ("yellow", "ffff00"),
    ("orange", "ff9900"),
    ("purple", "663399"),
    ("pink", "ea4c88"),
    ("brown", "996633"),
    ("black", "000000"),
    ("white", "ffffff"),
];

static CATEGORY_PREFIXES: &[(&str, &str)] = &[
    ("anime:", "Anime"),
    ("game:", "Game"),
    ("movie:", "Movie"),
    ("tv series:", "TV"),
];

static NOISE_TAGS: &[&str] = &[
    "wallpaper",
    "wallpapers",
    "digital art",
    "artwork",
    "drawing",
    "render",
];

/// Tag substrings that make a good title, in preference order
static IMPORTANT_CATEGORIES: &[&str] = &[
    "anime", "game", "movie", "tv series", "cartoon", "person", "animal", "landscape", "city",
    "nature", "space",
];

/// How a tag is sent to the search endpoint
#[derive(Debug, Clone, PartialEq)]
enum TagParam {
    Categories(&'static str),
    Purity(&'static str),
    Colors(&'static str),
    Search(String),
}

fn classify_tag(tag: &str, has_api_key: bool) -> Option<TagParam> {
    let lower = tag.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let mapped = TAG_SYNONYMS
        .iter()
        .find(|(from, _)| *from == lower)
        .map(|(_, to)| to.to_string())
        .unwrap_or(lower);

    let param = match mapped.as_str() {
        "general" => TagParam::Categories("100"),
        "anime" => TagParam::Categories("010"),
        "people" => TagParam::Categories("001"),
        "sfw" => TagParam::Purity("100"),
        "sketchy" => TagParam::Purity("110"),
        // NSFW listings require an API key
        "nsfw" if has_api_key => TagParam::Purity("111"),
        "nsfw" => TagParam::Purity("110"),
        other => match COLOR_CODES.iter().find(|(name, _)| *name == other) {
            Some((_, code)) => TagParam::Colors(code),
            None => TagParam::Search(format!("+{}", other)),
        },
    };
    Some(param)
}

/// Drop noise tags and rewrite `prefix:item` tags as `Category: item`
fn process_tags(raw: &[String]) -> Vec<String> {
    raw.iter()
        .filter(|tag| !NOISE_TAGS.contains(&tag.to_lowercase().as_str()))
        .filter_map(|tag| {
            let lower = tag.to_lowercase();
            match CATEGORY_PREFIXES.iter().find(|(prefix, _)| lower.starts_with(prefix)) {
                Some((prefix, category)) => {
                    let item = tag[prefix.len()..].trim();
                    if item.is_empty() {
                        None
                    } else {
                        Some(format!("{}: {}", category, item))
                    }
                }
                None => Some(tag.clone()),
            }
        })
        .collect()
}

fn synthesize_title(tags: &[String], width: Option<u32>, height: Option<u32>) -> Option<String> {
    let first = tags.first()?;
    let primary = IMPORTANT_CATEGORIES
        .iter()
        .flat_map(|category| tags.iter().filter(move |tag| tag.to_lowercase().contains(category)))
        .max_by_key(|tag| tag.len());

    Some(match primary {
        Some(tag) => {
            let resolution = match (width, height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => format!(" [{}×{}]", w, h),
                _ => String::new(),
            };
            format!("{}{}", title_case(tag), resolution)
        }
        None => title_case(first),
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<WallpaperData>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    current_page: Option<u32>,
    last_page: Option<u32>,
    seed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WallpaperData {
    id: Option<String>,
    path: Option<String>,
    #[serde(default)]
    thumbs: Thumbs,
    dimension_x: Option<u32>,
    dimension_y: Option<u32>,
    purity: Option<String>,
    category: Option<String>,
    #[serde(default)]
    colors: Vec<String>,
    created_at: Option<String>,
    views: Option<u64>,
    favorites: Option<u64>,
    file_size: Option<u64>,
    #[serde(default)]
    tags: Vec<TagData>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbs {
    large: Option<String>,
    original: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagData {
    name: String,
}

pub struct WallhavenClient {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    sorting: String,
}

impl WallhavenClient {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>, sorting: &str) -> Self {
        let sorting = if sorting.trim().is_empty() {
            "random".to_string()
        } else {
            sorting.trim().to_string()
        };
        Self {
            transport,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            sorting,
        }
    }

    fn build_request(&self, query: &PageQuery) -> Request {
        let mut request = Request::get(format!("{}/search", API_BASE))
            .query("page", query.page.max(1))
            .query("sorting", &self.sorting);

        if self.sorting == "random" {
            if let Some(seed) = &query.seed {
                request = request.query("seed", seed);
            }
        }

        let mut search = query.query.trim().to_string();
        match classify_tag(&query.tag, self.api_key.is_some()) {
            Some(TagParam::Categories(bits)) => request = request.query("categories", bits),
            Some(TagParam::Purity(bits)) => request = request.query("purity", bits),
            Some(TagParam::Colors(code)) => request = request.query("colors", code),
            Some(TagParam::Search(term)) => {
                if search.is_empty() {
                    search = term;
                } else {
                    search = format!("{} {}", search, term);
                }
            }
            None => {}
        }
        if !search.is_empty() {
            request = request.query("q", search);
        }

        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        request
    }

    fn parse_response(&self, url: &str, value: serde_json::Value) -> Result<Page, ProviderError> {
        let response: SearchResponse = decode(url, value)?;

        let records: Vec<ImageRecord> = response
            .data
            .into_iter()
            .filter_map(normalize)
            .collect();

        let (exhausted, seed) = match response.meta {
            Some(meta) => {
                let exhausted = match (meta.current_page, meta.last_page) {
                    (Some(current), Some(last)) => current >= last,
                    _ => records.is_empty(),
                };
                (exhausted, meta.seed)
            }
            None => (records.is_empty(), None),
        };

        Ok(Page {
            records,
            exhausted,
            seed,
        })
    }
}

fn normalize(item: WallpaperData) -> Option<ImageRecord> {
    let url = item
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| item.thumbs.original.clone().filter(|p| !p.is_empty()))?;
    let thumbnail = item.thumbs.large.as_deref().filter(|t| !t.is_empty());

    let raw_tags: Vec<String> = item.tags.into_iter().map(|t| t.name).collect();
    let tags = process_tags(&raw_tags);

    let mut record = ImageRecord::new(Source::Wallhaven, item.id, &url, thumbnail)
        .with_dimensions(item.dimension_x, item.dimension_y);

    record.title = synthesize_title(&tags, item.dimension_x, item.dimension_y).unwrap_or_else(|| {
        let category = item.category.as_deref().unwrap_or("wallpaper");
        format!("{} {}", title_case(category), record.id)
    });
    record.tags = tags;
    record.nsfw = item.purity.as_deref() == Some("nsfw");
    record.purity = Some(item.purity.unwrap_or_else(|| "sfw".to_string()));
    record.category = item.category;
    record.colors = coarse_colors_from_hex(&item.colors);
    record.date_added = item.created_at;
    record.views = item.views;
    record.favorites = item.favorites;
    record.file_size = item.file_size;
    Some(record)
}

impl ProviderClient for WallhavenClient {
    fn source(&self) -> Source {
        Source::Wallhaven
    }

    fn fetch_page(&self, query: &PageQuery) -> Result<Page, ProviderError> {
        let request = self.build_request(query);
        debug!(tag = %query.tag, q = ?request.param("q"), "wallhaven search");
        let value = self.transport.send_json(&request)?;
        self.parse_response(&request.url, value)
    }
}
