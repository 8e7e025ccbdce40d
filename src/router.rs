//! Intent routing: decide whether an utterance needs a tool before the model.
//!
//! Three independent predicates are evaluated in fixed priority order,
//! **search > weather > file**, and the first positive one wins. Each
//! predicate has a matching extractor that turns the utterance into the
//! tool argument.
//!
//! | Intent | Trigger | Argument |
//! |--------|---------|----------|
//! | search | keyword, or interrogative shape | utterance minus a leading instruction word |
//! | weather | weather keyword **and** `<place>天气` / `<place> weather` | normalized place name |
//! | file | file keyword **and** `<name>.<ext>` | path starting one char before the drive colon |
//!
//! Disabled tools are never routed to.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::AssistantError;
use crate::models::{ToolKind, ToolRequest};

const SEARCH_KEYWORDS: &[&str] = &[
    "搜索", "查询", "查找", "最新", "新闻", "资讯", "信息", "知识", "了解", "什么是", "是谁",
    "哪里", "何时", "为什么", "告诉我", "是啥", "search", "latest", "news",
];

const SEARCH_PREFIXES: &[&str] = &[
    "搜索", "查询", "查找", "告诉我", "了解", "什么是", "是谁", "哪里", "何时", "为什么", "怎么样",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "天气", "温度", "气象", "预报", "晴", "雨", "风", "多云", "湿度", "气候", "weather",
    "temperature", "weather forecast", "sunny", "rain", "wind", "cloudy", "humidity",
];

const FILE_KEYWORDS: &[&str] = &[
    "文件", "读取", "打开", "内容", "路径", "目录", ".txt", ".doc", ".pdf", ".docx",
];

static QUESTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[\p{Han}a-zA-Z0-9\s]*[?？]$",
        r"^(什么是|谁是|为什么|如何|怎样|哪里|何时)[\p{Han}a-zA-Z0-9\s]+$",
        r"(?i)^(what is|who is|why|how|where|when)\s[\p{Han}a-zA-Z0-9\s]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("question pattern compiles"))
    .collect()
});

static LOCATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{Han}{2,8}(?:市|县|区|镇|村|乡)?|[A-Za-z]+)\s*(?:天气|气候|weather|forecast)")
        .expect("location pattern compiles")
});

static FILE_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\w\s/\\().+?\-]+?\.(?:txt|docx|pdf|md|doc))")
        .expect("file mention pattern compiles")
});

// Same as FILE_MENTION but also spans a drive colon.
static FILE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\w\s/\\().+?:\-]+?\.(?:txt|docx|pdf|md|doc))")
        .expect("file path pattern compiles")
});

/// Which tools the router may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolToggles {
    pub search: bool,
    pub weather: bool,
    pub file: bool,
}

impl Default for ToolToggles {
    fn default() -> Self {
        Self {
            search: true,
            weather: true,
            file: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntentRouter {
    search_keywords: Vec<String>,
    default_location: String,
    toggles: ToolToggles,
}

impl IntentRouter {
    pub fn new(default_location: &str, extra_keywords: &[String], toggles: ToolToggles) -> Self {
        let mut search_keywords: Vec<String> =
            SEARCH_KEYWORDS.iter().map(|k| k.to_string()).collect();
        search_keywords.extend(extra_keywords.iter().map(|k| k.to_lowercase()));
        Self {
            search_keywords,
            default_location: default_location.to_string(),
            toggles,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let toggles = ToolToggles {
            search: config.tools.search.enabled,
            weather: config.tools.weather.enabled,
            file: config.tools.file.enabled,
        };
        Self::new(
            &config.router.default_location,
            &config.router.extra_search_keywords,
            toggles,
        )
    }

    /// Routes an utterance. `Ok(None)` means the model answers directly.
    pub fn classify(&self, utterance: &str) -> Result<Option<ToolRequest>, AssistantError> {
        let request = if self.toggles.search && self.wants_search(utterance) {
            Some(ToolRequest {
                kind: ToolKind::Search,
                argument: search_query(utterance),
            })
        } else if self.toggles.weather && wants_weather(utterance) {
            Some(ToolRequest {
                kind: ToolKind::Weather,
                argument: weather_location(utterance, &self.default_location),
            })
        } else if self.toggles.file && wants_file(utterance) {
            Some(ToolRequest {
                kind: ToolKind::File,
                argument: file_path(utterance)?,
            })
        } else {
            None
        };

        match &request {
            Some(req) => {
                tracing::debug!(tool = %req.kind, argument = %req.argument, "utterance routed")
            }
            None => tracing::debug!("utterance routed to model"),
        }
        Ok(request)
    }

    pub fn wants_search(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        if self
            .search_keywords
            .iter()
            .any(|k| lowered.contains(k.as_str()))
        {
            return true;
        }
        QUESTION_PATTERNS.iter().any(|re| re.is_match(text))
    }
}

/// Weather keyword present and a `<place> 天气`-style phrase found.
pub fn wants_weather(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if !WEATHER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return false;
    }
    LOCATION_PATTERN.is_match(text)
}

/// File keyword present and something shaped like `name.ext` found.
pub fn wants_file(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if !FILE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return false;
    }
    FILE_MENTION.is_match(text)
}

/// Strips the first matching instruction prefix. Falls back to the whole
/// utterance when nothing is left.
pub fn search_query(text: &str) -> String {
    for prefix in SEARCH_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            let rest = rest.trim();
            if rest.is_empty() {
                break;
            }
            return rest.to_string();
        }
    }
    text.trim().to_string()
}

/// Extracts and normalizes the place name of a weather question.
pub fn weather_location(text: &str, default_location: &str) -> String {
    let captured = LOCATION_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    let Some(raw) = captured else {
        return default_location.to_string();
    };

    let mut location = raw;
    location = location.strip_prefix("查询").unwrap_or(location);
    location = location.strip_suffix('的').unwrap_or(location);
    for day in ["今天", "今日"] {
        location = location.strip_prefix(day).unwrap_or(location);
    }
    for day in ["今天", "今日"] {
        location = location.strip_suffix(day).unwrap_or(location);
    }

    if location.is_empty() {
        return default_location.to_string();
    }
    let is_latin_name = location.chars().all(|c| c.is_ascii_alphabetic());
    if is_latin_name || location.ends_with('市') {
        location.to_string()
    } else {
        format!("{}市", location)
    }
}

/// Extracts the file path of a file-read request.
///
/// The path runs from one character before the first colon of the matched
/// span (a drive letter such as `C:`). Without a colon the request is
/// rejected, unless the span contains an absolute Unix path.
pub fn file_path(text: &str) -> Result<String, AssistantError> {
    let span = FILE_PATH
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AssistantError::Routing("no file path found in the request".to_string()))?;

    match span.find(':') {
        Some(0) => Err(AssistantError::Routing(format!(
            "malformed file path '{}': missing drive letter before ':'",
            span.trim()
        ))),
        Some(colon) => {
            let start = span[..colon]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            Ok(span[start..].to_string())
        }
        None => absolute_unix_path(span).ok_or_else(|| {
            AssistantError::Routing(format!(
                "malformed file path '{}': expected a full path such as C:\\docs\\{}",
                span.trim(),
                span.split_whitespace().last().unwrap_or("file.txt")
            ))
        }),
    }
}

fn absolute_unix_path(span: &str) -> Option<String> {
    let mut prev: Option<char> = None;
    for (i, c) in span.char_indices() {
        if c == '/' && prev.map_or(true, char::is_whitespace) {
            return Some(span[i..].to_string());
        }
        prev = Some(c);
    }
    None
}

/// CLI entry: print the routing decision for an utterance.
pub fn run_route(config: &Config, utterance: &str) -> Result<()> {
    let router = IntentRouter::from_config(config);
    match router.classify(utterance)? {
        Some(request) => {
            println!("tool: {}", request.kind);
            println!("argument: {}", request.argument);
        }
        None => println!("tool: none"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        IntentRouter::new("北京市", &[], ToolToggles::default())
    }

    fn route(text: &str) -> Option<ToolRequest> {
        router().classify(text).unwrap()
    }

    #[test]
    fn test_weather_question_routes_to_weather_with_city() {
        let req = route("杭州市天气怎么样").unwrap();
        assert_eq!(req.kind, ToolKind::Weather);
        assert_eq!(req.argument, "杭州市");
    }

    #[test]
    fn test_weather_location_normalization() {
        assert_eq!(weather_location("查询上海今天天气", "北京市"), "上海市");
        assert_eq!(weather_location("深圳的天气", "北京市"), "深圳市");
        assert_eq!(weather_location("London weather", "北京市"), "London");
        assert_eq!(weather_location("今天天气", "北京市"), "北京市");
        assert_eq!(weather_location("下雨吗", "北京市"), "北京市");
    }

    #[test]
    fn test_weather_needs_location_phrase() {
        assert!(!wants_weather("明天会下雨吗"));
        assert!(wants_weather("广州天气"));
    }

    #[test]
    fn test_file_without_drive_letter_is_routing_error() {
        let err = router().classify("读取 report.txt 的内容").unwrap_err();
        assert!(matches!(err, AssistantError::Routing(_)));
    }

    #[test]
    fn test_file_with_drive_letter() {
        let req = route("读取C:\\docs\\报告.docx 的内容").unwrap();
        assert_eq!(req.kind, ToolKind::File);
        assert_eq!(req.argument, "C:\\docs\\报告.docx");
    }

    #[test]
    fn test_file_with_absolute_unix_path() {
        let req = route("打开 /tmp/notes/plan.md 文件").unwrap();
        assert_eq!(req.kind, ToolKind::File);
        assert_eq!(req.argument, "/tmp/notes/plan.md");
    }

    #[test]
    fn test_colon_at_start_is_rejected() {
        let err = file_path(":report.pdf").unwrap_err();
        assert!(matches!(err, AssistantError::Routing(_)));
    }

    #[test]
    fn test_search_keyword_and_prefix_strip() {
        let req = route("搜索 Rust 异步编程").unwrap();
        assert_eq!(req.kind, ToolKind::Search);
        assert_eq!(req.argument, "Rust 异步编程");

        let req = route("什么是量子计算").unwrap();
        assert_eq!(req.kind, ToolKind::Search);
        assert_eq!(req.argument, "量子计算");
    }

    #[test]
    fn test_question_mark_triggers_search() {
        let req = route("Rust 和 Go 哪个好？").unwrap();
        assert_eq!(req.kind, ToolKind::Search);
        assert_eq!(req.argument, "Rust 和 Go 哪个好？");
    }

    #[test]
    fn test_english_interrogative_triggers_search() {
        assert_eq!(route("What is ownership").unwrap().kind, ToolKind::Search);
        assert_eq!(route("latest Rust release").unwrap().kind, ToolKind::Search);
    }

    #[test]
    fn test_search_outranks_weather_and_file() {
        let req = route("搜索北京天气").unwrap();
        assert_eq!(req.kind, ToolKind::Search);

        let req = route("查询D:\\a.txt 文件信息").unwrap();
        assert_eq!(req.kind, ToolKind::Search);
    }

    #[test]
    fn test_weather_outranks_file() {
        let req = route("读取上海天气 C:\\weather.txt 文件").unwrap();
        assert_eq!(req.kind, ToolKind::Weather);
    }

    #[test]
    fn test_plain_chat_goes_to_model() {
        assert!(route("你好，帮我写一首诗").is_none());
        assert!(route("thanks").is_none());
    }

    #[test]
    fn test_disabled_tools_are_skipped() {
        let toggles = ToolToggles {
            search: false,
            weather: true,
            file: false,
        };
        let router = IntentRouter::new("北京市", &[], toggles);
        assert!(router.classify("搜索新闻").unwrap().is_none());
        assert!(router.classify("读取 report.txt 的内容").unwrap().is_none());
        assert_eq!(
            router.classify("成都天气").unwrap().unwrap().kind,
            ToolKind::Weather
        );
    }

    #[test]
    fn test_extra_search_keywords() {
        let router = IntentRouter::new("北京市", &["Lookup".to_string()], ToolToggles::default());
        assert!(router.wants_search("please lookup tokio"));
    }

    #[test]
    fn test_exactly_one_tool_for_ambiguous_inputs() {
        let inputs = [
            "杭州市天气怎么样",
            "搜索北京天气",
            "读取上海天气 C:\\weather.txt 文件",
            "告诉我 D:\\notes.md 的内容",
        ];
        for input in inputs {
            let router = router();
            let hits = [
                router.wants_search(input),
                wants_weather(input),
                wants_file(input),
            ];
            let routed = router.classify(input).unwrap();
            let first = hits.iter().position(|h| *h);
            let expected = first.map(|i| [ToolKind::Search, ToolKind::Weather, ToolKind::File][i]);
            assert_eq!(routed.map(|r| r.kind), expected, "input: {}", input);
        }
    }
}
