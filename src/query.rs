//! Search box handling: tokenizing, operator terms, and the choice between a
//! local filter and a server-side search.
//!
//! Filtering never touches the store. A filter yields the indices of the
//! matching records, so clearing it restores the full listing without a
//! refetch.

use crate::record::ImageRecord;
use crate::utils::parse_size;
use chrono::NaiveDate;

/// Operator prefixes understood by the advanced filter
pub const OPERATORS: &[&str] = &[
    "ratio:",
    "width:",
    "height:",
    "resolution:",
    "color:",
    "source:",
    "category:",
    "tag:",
    "date:",
    "view:",
    "favorite:",
    "size:",
];

/// Queries up to this many characters are always filtered locally
pub const LOCAL_ONLY_MAX_LEN: usize = 2;
/// Queries up to this many characters are filtered locally if enough records match
pub const LOCAL_FIRST_MAX_LEN: usize = 4;
/// Local matches needed to skip the server search for a short query
pub const LOCAL_MATCH_THRESHOLD: usize = 5;

/// Named aspect ratios matched by width/height bands
static RATIO_BANDS: &[(&str, f64, f64)] = &[
    ("16:9", 1.70, 1.80),
    ("4:3", 1.30, 1.40),
    ("1:1", 0.95, 1.05),
    ("21:9", 2.30, 2.40),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    /// Split a leading comparator off a value; no comparator means equality
    pub fn split(value: &str) -> (Comparison, &str) {
        for (prefix, cmp) in [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
            ("=", Comparison::Eq),
        ] {
            if let Some(rest) = value.strip_prefix(prefix) {
                return (cmp, rest.trim());
            }
        }
        (Comparison::Eq, value.trim())
    }

    pub fn holds<T: PartialOrd>(&self, actual: T, target: T) -> bool {
        match self {
            Comparison::Gt => actual > target,
            Comparison::Ge => actual >= target,
            Comparison::Lt => actual < target,
            Comparison::Le => actual <= target,
            Comparison::Eq => actual == target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Ratio(String),
    Width(Comparison, u32),
    Height(Comparison, u32),
    /// Named bucket or `WxH`; `at_least` buckets accept anything larger
    Resolution {
        width: u32,
        height: u32,
        at_least: bool,
    },
    Color(String),
    Source(String),
    Category(String),
    Tag(String),
    Date(Comparison, NaiveDate),
    Views(Comparison, u64),
    Favorites(Comparison, u64),
    Size(Comparison, u64),
    /// Substring of the title or any tag
    Text(String),
    /// Operator whose value is empty or malformed; matches every record
    Ignored,
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn parse_resolution(value: &str) -> Option<Term> {
    let (width, height, at_least) = match value {
        "4k" | "uhd" | "2160p" => (3840, 2160, true),
        "1440p" | "2k" | "qhd" => (2560, 1440, false),
        "1080p" | "fullhd" | "fhd" => (1920, 1080, false),
        "720p" | "hd" => (1280, 720, false),
        other => {
            let (w, h) = other.split_once('x')?;
            (w.trim().parse().ok()?, h.trim().parse().ok()?, false)
        }
    };
    Some(Term::Resolution {
        width,
        height,
        at_least,
    })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}

impl Term {
    /// Classify one token. Expects lowercase input.
    pub fn parse(token: &str) -> Term {
        let Some(op) = OPERATORS.iter().find(|op| token.starts_with(**op)) else {
            return Term::Text(strip_quotes(token).to_string());
        };
        let value = strip_quotes(&token[op.len()..]).trim();
        if value.is_empty() {
            return Term::Ignored;
        }

        let parsed = match *op {
            "ratio:" => Some(Term::Ratio(value.to_string())),
            "color:" => Some(Term::Color(value.to_string())),
            "source:" => Some(Term::Source(value.to_string())),
            "category:" => Some(Term::Category(value.to_string())),
            "tag:" => Some(Term::Tag(value.to_string())),
            "resolution:" => parse_resolution(value),
            "width:" | "height:" => {
                let (cmp, number) = Comparison::split(value);
                number.parse().ok().map(|n| {
                    if *op == "width:" {
                        Term::Width(cmp, n)
                    } else {
                        Term::Height(cmp, n)
                    }
                })
            }
            "date:" => {
                let (cmp, date) = Comparison::split(value);
                parse_date(date).map(|d| Term::Date(cmp, d))
            }
            "view:" => {
                let (cmp, number) = Comparison::split(value);
                number.parse().ok().map(|n| Term::Views(cmp, n))
            }
            "favorite:" => {
                let (cmp, number) = Comparison::split(value);
                number.parse().ok().map(|n| Term::Favorites(cmp, n))
            }
            "size:" => {
                let (cmp, size) = Comparison::split(value);
                parse_size(size).map(|n| Term::Size(cmp, n))
            }
            _ => None,
        };
        parsed.unwrap_or(Term::Ignored)
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        match self {
            Term::Ratio(value) => {
                let band = RATIO_BANDS.iter().find(|(name, _, _)| *name == value.as_str());
                if let (Some((_, low, high)), Some(aspect)) = (band, record.aspect()) {
                    return (*low..=*high).contains(&aspect);
                }
                record
                    .ratio_label()
                    .map(|ratio| ratio.to_lowercase().contains(value.as_str()))
                    .unwrap_or(false)
            }
            Term::Width(cmp, target) => record.width > 0 && cmp.holds(record.width, *target),
            Term::Height(cmp, target) => record.height > 0 && cmp.holds(record.height, *target),
            Term::Resolution {
                width,
                height,
                at_least,
            } => {
                if !record.has_dimensions() {
                    return false;
                }
                if *at_least {
                    record.width >= *width && record.height >= *height
                } else {
                    record.width.abs_diff(*width) <= 1 && record.height.abs_diff(*height) <= 1
                }
            }
            Term::Color(value) => record
                .colors
                .iter()
                .any(|c| c.to_lowercase().contains(value.as_str())),
            Term::Source(value) => {
                record.source.id().contains(value.as_str())
                    || record.source.display_name().to_lowercase().contains(value.as_str())
            }
            Term::Category(value) => record
                .category
                .as_deref()
                .map(|c| c.to_lowercase().contains(value.as_str()))
                .unwrap_or(false),
            Term::Tag(value) => record
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(value.as_str())),
            Term::Date(cmp, target) => record
                .date_added
                .as_deref()
                .and_then(parse_date)
                .map(|date| cmp.holds(date, *target))
                .unwrap_or(false),
            Term::Views(cmp, target) => record.views.map(|v| cmp.holds(v, *target)).unwrap_or(false),
            Term::Favorites(cmp, target) => record
                .favorites
                .map(|v| cmp.holds(v, *target))
                .unwrap_or(false),
            Term::Size(cmp, target) => record
                .file_size
                .map(|v| cmp.holds(v, *target))
                .unwrap_or(false),
            Term::Text(text) => {
                record.title.to_lowercase().contains(text.as_str())
                    || record.tags.iter().any(|t| t.to_lowercase().contains(text.as_str()))
            }
            Term::Ignored => true,
        }
    }
}

/// Split on whitespace, keeping quoted substrings together. Quote characters
/// stay in the token.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in query.chars() {
        match c {
            '"' | '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.trim().is_empty() {
                    tokens.push(current.trim().to_string());
                }
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    tokens
}

pub fn has_operator(query: &str) -> bool {
    let query = query.to_lowercase();
    OPERATORS.iter().any(|op| query.contains(op))
}

/// Conjunction of parsed terms
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    raw: String,
    terms: Vec<Term>,
}

impl FilterQuery {
    pub fn parse(query: &str) -> Self {
        let raw = query.trim().to_lowercase();
        let terms = tokenize(&raw).iter().map(|t| Term::parse(t)).collect();
        Self { raw, terms }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        self.terms.iter().all(|term| term.matches(record))
    }
}

/// Simple search-box match: the whole query, then any of its words, against
/// title, tags, category, ratio, source and colors in that order.
pub fn matches_text(query: &str, record: &ImageRecord) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    let words: Vec<&str> = query.split_whitespace().collect();

    let title = record.title.to_lowercase();
    if title.contains(&query) || words.iter().any(|w| title.contains(w)) {
        return true;
    }

    let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();
    if tags.join(" ").contains(&query) || tags.iter().any(|t| words.iter().any(|w| t.contains(w))) {
        return true;
    }

    if let Some(category) = &record.category {
        if category.to_lowercase().contains(&query) {
            return true;
        }
    }
    if let Some(ratio) = record.ratio_label() {
        if ratio.contains(&query) {
            return true;
        }
    }
    if record.source.id().contains(&query)
        || record.source.display_name().to_lowercase().contains(&query)
    {
        return true;
    }
    record.colors.iter().any(|c| c.to_lowercase().contains(&query))
}

/// A filter evaluated against the records already fetched
#[derive(Debug, Clone, PartialEq)]
pub enum ViewFilter {
    Advanced(FilterQuery),
    Text(String),
}

impl ViewFilter {
    pub fn matches(&self, record: &ImageRecord) -> bool {
        match self {
            ViewFilter::Advanced(query) => query.matches(record),
            ViewFilter::Text(text) => matches_text(text, record),
        }
    }

    /// Indices of matching records, in store order
    pub fn apply(&self, records: &[ImageRecord]) -> Vec<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.matches(r))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn query(&self) -> &str {
        match self {
            ViewFilter::Advanced(query) => query.raw(),
            ViewFilter::Text(text) => text,
        }
    }
}

/// What a search box change should do
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPlan {
    /// Empty query: drop any filter
    Clear,
    /// Filter the fetched records without a request
    Local(ViewFilter),
    /// Refetch from page 1 with this server-side search term
    Remote(String),
}

/// Decide between a local filter and a server search for `query`
pub fn plan(query: &str, records: &[ImageRecord]) -> SearchPlan {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return SearchPlan::Clear;
    }

    if has_operator(&query) && !records.is_empty() {
        return SearchPlan::Local(ViewFilter::Advanced(FilterQuery::parse(&query)));
    }

    let len = query.chars().count();
    if len <= LOCAL_ONLY_MAX_LEN {
        return SearchPlan::Local(ViewFilter::Text(query));
    }
    if len <= LOCAL_FIRST_MAX_LEN {
        let local = records.iter().filter(|r| matches_text(&query, r)).count();
        if local >= LOCAL_MATCH_THRESHOLD {
            return SearchPlan::Local(ViewFilter::Text(query));
        }
    }
    SearchPlan::Remote(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;

    fn rec(id: &str, width: u32, height: u32) -> ImageRecord {
        let mut r = ImageRecord::new(Source::Wallhaven, Some(id.into()), "https://x", None);
        r.width = width;
        r.height = height;
        r
    }

    fn with_tags(mut r: ImageRecord, title: &str, tags: &[&str]) -> ImageRecord {
        r.title = title.to_string();
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    fn ids(filter: &ViewFilter, records: &[ImageRecord]) -> Vec<String> {
        filter
            .apply(records)
            .into_iter()
            .map(|i| records[i].id.clone())
            .collect()
    }

    #[test]
    fn test_tokenize_respects_quotes() {
        assert_eq!(tokenize("  a  b "), vec!["a", "b"]);
        assert_eq!(
            tokenize("tag:\"blue sky\" width:>1920"),
            vec!["tag:\"blue sky\"", "width:>1920"]
        );
        assert_eq!(tokenize("'open quote"), vec!["'open quote"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_comparison_split() {
        assert_eq!(Comparison::split(">=10"), (Comparison::Ge, "10"));
        assert_eq!(Comparison::split("<5"), (Comparison::Lt, "5"));
        assert_eq!(Comparison::split("=7"), (Comparison::Eq, "7"));
        assert_eq!(Comparison::split("7"), (Comparison::Eq, "7"));
    }

    #[test]
    fn test_term_parse() {
        assert_eq!(Term::parse("width:>1920"), Term::Width(Comparison::Gt, 1920));
        assert_eq!(Term::parse("height:1080"), Term::Height(Comparison::Eq, 1080));
        assert_eq!(Term::parse("tag:'neko'"), Term::Tag("neko".into()));
        assert_eq!(Term::parse("size:>5mb"), Term::Size(Comparison::Gt, 5 * 1024 * 1024));
        assert_eq!(
            Term::parse("date:>2023-01-01"),
            Term::Date(Comparison::Gt, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
        );
        assert_eq!(
            Term::parse("resolution:2560x1080"),
            Term::Resolution {
                width: 2560,
                height: 1080,
                at_least: false
            }
        );
        assert_eq!(Term::parse("\"sunset\""), Term::Text("sunset".into()));
        assert_eq!(Term::parse("width:>abc"), Term::Ignored);
        assert_eq!(Term::parse("width:"), Term::Ignored);
        assert_eq!(Term::parse("resolution:8k"), Term::Ignored);
    }

    #[test]
    fn test_width_comparison() {
        let records = vec![rec("a", 1920, 1080), rec("b", 1921, 1080), rec("c", 3840, 2160)];
        let filter = ViewFilter::Advanced(FilterQuery::parse("width:>1920"));
        assert_eq!(ids(&filter, &records), vec!["b", "c"]);
    }

    #[test]
    fn test_ratio_derived_from_dimensions() {
        let record = rec("a", 1920, 1080);
        assert!(record.ratio.is_none());
        assert!(FilterQuery::parse("ratio:16:9").matches(&record));
        assert!(!FilterQuery::parse("ratio:4:3").matches(&record));
        // Close enough to 16:9 even though it doesn't reduce to it
        assert!(FilterQuery::parse("ratio:16:9").matches(&rec("b", 1366, 768)));
        assert!(FilterQuery::parse("ratio:21:9").matches(&rec("c", 2560, 1080)));
        assert!(FilterQuery::parse("ratio:8:5").matches(&rec("d", 1920, 1200)));
        assert!(!FilterQuery::parse("ratio:16:9").matches(&rec("e", 0, 0)));
    }

    #[test]
    fn test_resolution_buckets() {
        let uhd = rec("a", 3840, 2160);
        let fhd = rec("b", 1920, 1080);
        let q = FilterQuery::parse("resolution:4k");
        assert!(q.matches(&uhd));
        assert!(!q.matches(&fhd));
        assert!(FilterQuery::parse("resolution:1080p").matches(&fhd));
        assert!(FilterQuery::parse("resolution:fullhd").matches(&rec("c", 1921, 1081)));
        assert!(!FilterQuery::parse("resolution:1080p").matches(&rec("d", 1920, 1200)));
        assert!(!FilterQuery::parse("resolution:4k").matches(&rec("e", 0, 0)));
    }

    #[test]
    fn test_tag_substring() {
        let record = with_tags(rec("a", 0, 0), "Cat", &["catgirl", "neko_ears"]);
        assert!(FilterQuery::parse("tag:neko").matches(&record));
        assert!(FilterQuery::parse("TAG:Neko").matches(&record));
        assert!(!FilterQuery::parse("tag:fox").matches(&record));
    }

    #[test]
    fn test_terms_are_anded() {
        let mut a = with_tags(rec("a", 3840, 2160), "Mountain Lake", &["nature"]);
        a.colors = vec!["blue".into()];
        a.category = Some("general".into());
        let mut b = with_tags(rec("b", 3840, 2160), "City Night", &["city"]);
        b.colors = vec!["black".into()];

        let records = vec![a, b];
        let filter = ViewFilter::Advanced(FilterQuery::parse("resolution:4k color:blue"));
        assert_eq!(ids(&filter, &records), vec!["a"]);

        let filter = ViewFilter::Advanced(FilterQuery::parse("source:wallhaven night"));
        assert_eq!(ids(&filter, &records), vec!["b"]);

        let filter = ViewFilter::Advanced(FilterQuery::parse("category:general"));
        assert_eq!(ids(&filter, &records), vec!["a"]);
    }

    #[test]
    fn test_counts_dates_and_sizes() {
        let mut r = rec("a", 100, 100);
        r.views = Some(1500);
        r.favorites = Some(12);
        r.file_size = Some(6 * 1024 * 1024);
        r.date_added = Some("2023-09-14 18:02:11".into());

        assert!(FilterQuery::parse("view:>1000").matches(&r));
        assert!(!FilterQuery::parse("favorite:>=100").matches(&r));
        assert!(FilterQuery::parse("size:>5mb").matches(&r));
        assert!(!FilterQuery::parse("size:<500kb").matches(&r));
        assert!(FilterQuery::parse("date:>2023-01-01").matches(&r));
        assert!(FilterQuery::parse("date:2023-09-14").matches(&r));
        assert!(!FilterQuery::parse("date:<2020-01-01").matches(&r));

        // Records without the field fail the term
        assert!(!FilterQuery::parse("view:>0").matches(&rec("b", 1, 1)));
    }

    #[test]
    fn test_malformed_operator_is_ignored() {
        let records = vec![rec("a", 10, 10), rec("b", 20, 20)];
        let filter = ViewFilter::Advanced(FilterQuery::parse("width:>"));
        assert_eq!(filter.apply(&records), vec![0, 1]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records = vec![
            with_tags(rec("a", 1920, 1080), "Frieren", &["anime"]),
            with_tags(rec("b", 3840, 2160), "Lake", &["nature"]),
            with_tags(rec("c", 2560, 1440), "Fern", &["anime"]),
        ];
        let filter = ViewFilter::Advanced(FilterQuery::parse("tag:anime width:>=1920"));

        let once = filter.apply(&records);
        assert_eq!(once, filter.apply(&records));

        let subset: Vec<ImageRecord> = once.iter().map(|&i| records[i].clone()).collect();
        assert_eq!(filter.apply(&subset).len(), subset.len());
    }

    #[test]
    fn test_matches_text_fallback_order() {
        let mut r = with_tags(rec("a", 1920, 1080), "Sunset Over Water", &["beach", "orange sky"]);
        r.category = Some("general".into());
        r.colors = vec!["orange".into()];

        assert!(matches_text("sun", &r));
        assert!(matches_text("blue water", &r));
        assert!(matches_text("sky", &r));
        assert!(matches_text("gener", &r));
        assert!(matches_text("16:9", &r));
        assert!(matches_text("wallh", &r));
        assert!(matches_text("orang", &r));
        assert!(!matches_text("forest", &r));
    }

    #[test]
    fn test_plan_by_length_and_operators() {
        let records: Vec<ImageRecord> = (0..6)
            .map(|i| with_tags(rec(&format!("r{}", i), 1, 1), "Neko Girl", &[]))
            .collect();

        assert_eq!(plan("   ", &records), SearchPlan::Clear);
        assert!(matches!(
            plan("width:>1920", &records),
            SearchPlan::Local(ViewFilter::Advanced(_))
        ));
        // Operators with nothing loaded go to the server like any long query
        assert_eq!(plan("width:>1920", &[]), SearchPlan::Remote("width:>1920".into()));
        assert_eq!(plan("ne", &records), SearchPlan::Local(ViewFilter::Text("ne".into())));
        assert_eq!(plan("NEKO", &records), SearchPlan::Local(ViewFilter::Text("neko".into())));
        assert_eq!(plan("fox", &records), SearchPlan::Remote("fox".into()));
        assert_eq!(plan("neko girl", &records), SearchPlan::Remote("neko girl".into()));
    }

    #[test]
    fn test_plan_medium_query_needs_enough_local_matches() {
        let records: Vec<ImageRecord> = (0..4)
            .map(|i| with_tags(rec(&format!("r{}", i), 1, 1), "Neko", &[]))
            .collect();
        assert_eq!(plan("neko", &records), SearchPlan::Remote("neko".into()));
    }
}
