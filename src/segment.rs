//! Word segmentation and term filtering.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Segmenter`] | splits text into tokens whose concatenation is the input |
//! | [`JiebaSegmenter`] | dictionary + HMM segmentation for mixed Chinese/Latin text |
//! | [`Analyzer`] | segmenter + stopwords; produces index terms |
//!
//! Chunking uses the raw segmenter output so chunks reproduce the document
//! exactly. Indexing and querying share one [`Analyzer`] so both sides see the
//! same vocabulary.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Splits text into an ordered token sequence covering the whole input.
pub trait Segmenter: Send + Sync {
    fn cut<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// [`Segmenter`] backed by the jieba dictionary.
pub struct JiebaSegmenter {
    jieba: jieba_rs::Jieba,
}

impl JiebaSegmenter {
    /// Loads the bundled dictionary. This takes a noticeable moment, so build
    /// one instance and share it behind an `Arc`.
    pub fn new() -> Self {
        Self {
            jieba: jieba_rs::Jieba::new(),
        }
    }
}

impl Default for JiebaSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter for JiebaSegmenter {
    fn cut<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.jieba.cut(text, true)
    }
}

const BUILTIN_STOPWORDS: &[&str] = &[
    "的", "了", "和", "是", "就", "都", "而", "及", "与", "这", "在", "一个", "有", "我", "他",
    "她", "它", "我们", "他们", "那", "这些", "那些", "为", "为了", "因为", "所以", "但",
    "虽然", "如果", "然后", "当", "只", "仅", "也", "还", "又", "或", "或者", "并且", "而且",
    "甚至", "例如", "比如", "如", "像", "什么", "怎么", "如何", "为什么", "哪里", "谁", "何时",
    "多少", "非常", "很", "太", "更", "最", "比较", "些", "个", "种", "项", "条", "点", "方面",
    "问题", "答案",
];

/// The built-in Chinese stopword set.
pub fn builtin_stopwords() -> HashSet<String> {
    BUILTIN_STOPWORDS.iter().map(|s| s.to_string()).collect()
}

/// Reads one stopword per line. Blank lines are skipped.
pub fn load_stopwords(path: &Path) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read stopwords file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Turns text into index terms: lowercase, segment, drop stopwords and
/// single-character tokens.
#[derive(Clone)]
pub struct Analyzer {
    segmenter: Arc<dyn Segmenter>,
    stopwords: Arc<HashSet<String>>,
}

impl Analyzer {
    pub fn new(segmenter: Arc<dyn Segmenter>, stopwords: HashSet<String>) -> Self {
        Self {
            segmenter,
            stopwords: Arc::new(stopwords),
        }
    }

    pub fn segmenter(&self) -> &Arc<dyn Segmenter> {
        &self.segmenter
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.segmenter
            .cut(&lowered)
            .into_iter()
            .filter(|tok| tok.chars().count() > 1 && !self.stopwords.contains(*tok))
            .map(str::to_string)
            .collect()
    }
}
