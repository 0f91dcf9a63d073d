use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::gcd;

/// One of the four image providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Wallhaven,
    WaifuIm,
    WaifuPics,
    NekosMoe,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Wallhaven,
        Source::WaifuIm,
        Source::WaifuPics,
        Source::NekosMoe,
    ];

    /// Stable identifier, also the value of `ImageRecord::source` on disk
    pub fn id(&self) -> &'static str {
        match self {
            Source::Wallhaven => "wallhaven",
            Source::WaifuIm => "waifu_im",
            Source::WaifuPics => "waifu_pics",
            Source::NekosMoe => "nekos_moe",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Wallhaven => "Wallhaven",
            Source::WaifuIm => "Waifu.im",
            Source::WaifuPics => "Waifu.pics",
            Source::NekosMoe => "Nekos.moe",
        }
    }

    /// Tags offered for quick filtering in the source's tag list
    pub fn suggested_tags(&self) -> &'static [&'static str] {
        match self {
            Source::Wallhaven => &[
                "general", "anime", "people", "landscape", "nature", "space", "city",
                "abstract", "dark", "sci-fi", "cyberpunk", "fantasy", "gaming", "car",
                "animal", "sfw", "sketchy", "red", "blue", "green", "yellow", "purple",
                "pink", "orange", "brown", "black", "white", "portrait", "sunset", "beach",
                "night", "water", "forest", "winter", "summer", "flowers", "architecture",
                "minimal", "technology", "food", "music",
            ],
            Source::WaifuIm => &[
                "waifu", "maid", "marin-kitagawa", "mori-calliope", "raiden-shogun", "oppai",
                "selfies", "uniform", "school", "glasses", "elf", "kemonomimi", "fox-girl",
                "blonde", "student",
            ],
            Source::WaifuPics => &[
                "waifu", "neko", "shinobu", "megumin", "cuddle", "hug", "kiss", "smile",
                "blush", "happy", "cry", "dance", "highfive", "bite", "slap", "kick",
                "handhold", "wink", "bully", "pat", "kill", "yeet", "bonk",
            ],
            Source::NekosMoe => &[
                "neko", "cat", "catgirl", "ears", "tail", "kemonomimi", "cute", "moe",
                "animated", "green_eyes", "blue_eyes", "red_eyes", "blonde", "brown_hair",
                "black_hair", "white_hair", "pink_hair", "smile", "school_uniform", "dress",
                "headband",
            ],
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['.', '-'], "_");
        match normalized.as_str() {
            "wallhaven" => Ok(Source::Wallhaven),
            "waifu_im" | "waifuim" => Ok(Source::WaifuIm),
            "waifu_pics" | "waifupics" => Ok(Source::WaifuPics),
            "nekos_moe" | "nekosmoe" => Ok(Source::NekosMoe),
            _ => Err(format!(
                "unknown source '{}' (expected one of: wallhaven, waifu_im, waifu_pics, nekos_moe)",
                s
            )),
        }
    }
}

/// Normalized image record shared by every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    /// 0 = unknown until the asset is measured
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub source: Source,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nsfw: bool,
    /// Aspect ratio such as "16:9"
    #[serde(default)]
    pub ratio: Option<String>,
    /// Coarse color names ("red", "blue", ...)
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purity: Option<String>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub favorites: Option<u64>,
    /// Bytes
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Facts learned by measuring a downloaded asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetMetadata {
    pub width: u32,
    pub height: u32,
    pub colors: Vec<String>,
    pub file_size: Option<u64>,
}

impl ImageRecord {
    /// Build a record with the invariants every provider must uphold:
    /// a non-empty id (a fresh UUID when the provider has none) and both
    /// `url` and `thumbnail` filled, one from the other if needed.
    pub fn new(source: Source, id: Option<String>, url: &str, thumbnail: Option<&str>) -> Self {
        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let thumbnail = thumbnail.filter(|t| !t.is_empty()).unwrap_or(url);
        let url = if url.is_empty() { thumbnail } else { url };

        Self {
            id,
            title: String::new(),
            url: url.to_string(),
            thumbnail: thumbnail.to_string(),
            width: 0,
            height: 0,
            source,
            tags: Vec::new(),
            nsfw: false,
            ratio: None,
            colors: Vec::new(),
            category: None,
            purity: None,
            date_added: None,
            views: None,
            favorites: None,
            file_size: None,
        }
    }

    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Set dimensions reported by the provider; unknown (0) values are ignored
    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        if let (Some(w), Some(h)) = (width, height) {
            if w > 0 && h > 0 {
                self.width = w;
                self.height = h;
                if self.ratio.is_none() {
                    self.ratio = ratio_string(w, h);
                }
            }
        }
        self
    }

    /// width / height, `None` while dimensions are unknown
    pub fn aspect(&self) -> Option<f64> {
        if self.has_dimensions() {
            Some(self.width as f64 / self.height as f64)
        } else {
            None
        }
    }

    /// Provider ratio if present, else derived from known dimensions
    pub fn ratio_label(&self) -> Option<String> {
        self.ratio
            .clone()
            .or_else(|| ratio_string(self.width, self.height))
    }

    /// Merge measured metadata. Only unknown fields are filled in, so known
    /// dimensions are never replaced by a weaker value (a thumbnail's size)
    /// and never reset to unknown.
    pub fn enrich(&mut self, meta: &AssetMetadata) -> bool {
        let mut changed = false;

        if !self.has_dimensions() && meta.width > 0 && meta.height > 0 {
            self.width = meta.width;
            self.height = meta.height;
            changed = true;
        }
        if self.ratio.is_none() {
            if let Some(ratio) = ratio_string(self.width, self.height) {
                self.ratio = Some(ratio);
                changed = true;
            }
        }
        if self.colors.is_empty() && !meta.colors.is_empty() {
            self.colors = meta.colors.clone();
            changed = true;
        }
        if self.file_size.is_none() && meta.file_size.is_some() {
            self.file_size = meta.file_size;
            changed = true;
        }

        changed
    }

    /// Short one-line description for listings
    pub fn summary(&self) -> String {
        let size = if self.has_dimensions() {
            format!("{}x{}", self.width, self.height)
        } else {
            "?x?".to_string()
        };
        format!("{} [{}] {}", self.title, size, self.source.display_name())
    }
}

/// Reduced aspect ratio string ("16:9", "8:5"), `None` for unknown dimensions
pub fn ratio_string(width: u32, height: u32) -> Option<String> {
    if width == 0 || height == 0 {
        return None;
    }
    let divisor = gcd(width, height);
    Some(format!("{}:{}", width / divisor, height / divisor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids_round_trip() {
        for source in Source::ALL {
            assert_eq!(source.id().parse::<Source>(), Ok(source));
        }
        assert_eq!("Waifu.im".parse::<Source>(), Ok(Source::WaifuIm));
        assert_eq!("nekos-moe".parse::<Source>(), Ok(Source::NekosMoe));
        assert!("pixiv".parse::<Source>().is_err());
    }

    #[test]
    fn test_source_serializes_as_id() {
        let json = serde_json::to_string(&Source::WaifuPics).unwrap();
        assert_eq!(json, "\"waifu_pics\"");
    }

    #[test]
    fn test_new_synthesizes_id_and_fills_urls() {
        let rec = ImageRecord::new(Source::WaifuPics, None, "https://i.waifu.pics/a.png", None);
        assert!(!rec.id.is_empty());
        assert_eq!(rec.thumbnail, rec.url);

        let rec = ImageRecord::new(Source::NekosMoe, Some("  ".into()), "", Some("https://t/x.jpg"));
        assert!(!rec.id.trim().is_empty());
        assert_eq!(rec.url, "https://t/x.jpg");
    }

    #[test]
    fn test_ratio_string() {
        assert_eq!(ratio_string(1920, 1080).as_deref(), Some("16:9"));
        assert_eq!(ratio_string(2560, 1080).as_deref(), Some("64:27"));
        assert_eq!(ratio_string(1000, 1000).as_deref(), Some("1:1"));
        assert_eq!(ratio_string(0, 1080), None);
    }

    #[test]
    fn test_enrich_fills_unknown_dimensions() {
        let mut rec = ImageRecord::new(Source::WaifuPics, None, "u", None);
        let meta = AssetMetadata {
            width: 800,
            height: 600,
            colors: vec!["blue".into()],
            file_size: Some(1234),
        };
        assert!(rec.enrich(&meta));
        assert_eq!((rec.width, rec.height), (800, 600));
        assert_eq!(rec.ratio.as_deref(), Some("4:3"));
        assert_eq!(rec.colors, vec!["blue"]);
        assert_eq!(rec.file_size, Some(1234));
    }

    #[test]
    fn test_enrich_is_monotonic() {
        let mut rec = ImageRecord::new(Source::Wallhaven, Some("abc".into()), "u", None)
            .with_dimensions(Some(3840), Some(2160));

        // Unknown measurement never resets known dimensions
        rec.enrich(&AssetMetadata::default());
        assert_eq!((rec.width, rec.height), (3840, 2160));

        // A thumbnail measurement never replaces provider dimensions
        rec.enrich(&AssetMetadata {
            width: 300,
            height: 200,
            ..Default::default()
        });
        assert_eq!((rec.width, rec.height), (3840, 2160));
        assert_eq!(rec.ratio.as_deref(), Some("16:9"));
    }

    #[test]
    fn test_with_dimensions_ignores_unknown() {
        let rec = ImageRecord::new(Source::WaifuIm, None, "u", None).with_dimensions(Some(0), Some(10));
        assert!(!rec.has_dimensions());
        assert_eq!(rec.ratio, None);
        assert_eq!(rec.aspect(), None);
    }
}
