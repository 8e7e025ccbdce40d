//! In-memory knowledge base and retrieval.
//!
//! Documents are segmented, packed into bounded chunks, and appended to an
//! ordered store. Every change rebuilds a fresh [`Retriever`], an immutable
//! snapshot of the chunks plus their TF-IDF index. Request workers hold an
//! `Arc<Retriever>` so ingestion on the foreground never races a search.
//!
//! # Ranking
//!
//! Scores are cosine similarities between the query vector and each chunk
//! row. Results are sorted descending with a stable sort, so equal scores
//! keep store order. With [`Diversity::Document`] only the best chunk of
//! each source is kept, mirroring document-level grouping in search engines.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::{Config, Diversity, KnowledgeConfig};
use crate::extract::read_document;
use crate::index::TfIdfIndex;
use crate::models::KnowledgeChunk;
use crate::segment::{builtin_stopwords, load_stopwords, Analyzer, JiebaSegmenter, Segmenter};

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: KnowledgeChunk,
    pub score: f64,
}

/// Immutable chunks-plus-index snapshot, safe to share with worker threads.
pub struct Retriever {
    chunks: Vec<KnowledgeChunk>,
    index: TfIdfIndex,
    analyzer: Analyzer,
}

impl Retriever {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn retrieve(&self, query: &str, top_k: usize, diversity: Diversity) -> Vec<RetrievedChunk> {
        let terms = self.analyzer.terms(query);
        let scores = self.index.scores(&terms);

        let mut order: Vec<usize> = (0..self.chunks.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut seen_sources: HashSet<&str> = HashSet::new();
        let mut results = Vec::with_capacity(top_k);
        for i in order {
            if results.len() >= top_k {
                break;
            }
            let chunk = &self.chunks[i];
            if diversity == Diversity::Document && !seen_sources.insert(chunk.source.as_str()) {
                continue;
            }
            results.push(RetrievedChunk {
                chunk: chunk.clone(),
                score: scores[i],
            });
        }
        results
    }
}

/// Chunk and source counts for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSummary {
    pub chunks: usize,
    /// `(source, chunk count)` sorted by source name.
    pub sources: Vec<(String, usize)>,
}

/// Ordered chunk store with its derived index.
pub struct KnowledgeBase {
    analyzer: Analyzer,
    chunk_size: usize,
    chunks: Vec<KnowledgeChunk>,
    retriever: Option<Arc<Retriever>>,
}

impl KnowledgeBase {
    pub fn new(analyzer: Analyzer, chunk_size: usize) -> Self {
        Self {
            analyzer,
            chunk_size,
            chunks: Vec::new(),
            retriever: None,
        }
    }

    /// Builds an empty knowledge base with the configured chunk size and
    /// stopwords.
    pub fn from_config(config: &KnowledgeConfig, segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        let stopwords = match &config.stopwords_path {
            Some(path) => load_stopwords(path)?,
            None => builtin_stopwords(),
        };
        Ok(Self::new(
            Analyzer::new(segmenter, stopwords),
            config.chunk_size,
        ))
    }

    /// Segments, chunks and appends a document, then rebuilds the index.
    /// Returns the number of chunks added.
    pub fn add_document(&mut self, source_name: &str, raw_text: &str) -> usize {
        let source = basename(source_name);
        let pieces = chunk_text(&**self.analyzer.segmenter(), raw_text, self.chunk_size);
        let added = pieces.len();
        self.chunks
            .extend(pieces.into_iter().map(|content| KnowledgeChunk {
                source: source.clone(),
                content,
            }));
        tracing::info!(source = %source, chunks = added, "document added to knowledge base");
        self.rebuild();
        added
    }

    /// Reads a file (text, PDF or DOCX) and adds it under its basename.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let text = read_document(path)
            .with_context(|| format!("Failed to load knowledge document: {}", path.display()))?;
        Ok(self.add_document(&path.to_string_lossy(), &text))
    }

    /// Loads a single file, or every file under a directory matching
    /// `include_globs`. Returns the total number of chunks added.
    pub fn load_path(&mut self, path: &Path, include_globs: &[String]) -> Result<usize> {
        if !path.is_dir() {
            return self.load_file(path);
        }

        let include = build_globset(include_globs)?;
        let mut total = 0;
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            if !include.is_match(relative) {
                continue;
            }
            total += self.load_file(entry.path())?;
        }
        Ok(total)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.retriever = None;
        tracing::info!("knowledge base cleared");
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    /// Current index snapshot, absent while the store is empty.
    pub fn retriever(&self) -> Option<Arc<Retriever>> {
        self.retriever.clone()
    }

    pub fn retrieve(&self, query: &str, top_k: usize, diversity: Diversity) -> Vec<RetrievedChunk> {
        match &self.retriever {
            Some(retriever) => retriever.retrieve(query, top_k, diversity),
            None => Vec::new(),
        }
    }

    pub fn summary(&self) -> KnowledgeSummary {
        let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
        for chunk in &self.chunks {
            *per_source.entry(chunk.source.as_str()).or_insert(0) += 1;
        }
        KnowledgeSummary {
            chunks: self.chunks.len(),
            sources: per_source
                .into_iter()
                .map(|(s, n)| (s.to_string(), n))
                .collect(),
        }
    }

    fn rebuild(&mut self) {
        let rows: Vec<Vec<String>> = self
            .chunks
            .iter()
            .map(|c| self.analyzer.terms(&c.content))
            .collect();
        self.retriever = TfIdfIndex::build(&rows).map(|index| {
            tracing::debug!(
                rows = index.len(),
                vocabulary = index.vocabulary_len(),
                "knowledge index rebuilt"
            );
            Arc::new(Retriever {
                chunks: self.chunks.clone(),
                index,
                analyzer: self.analyzer.clone(),
            })
        });
    }
}

/// Concatenates retrieved chunks into the grounding context block.
pub fn format_context(results: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for r in results {
        out.push_str(&format!(
            "source: {}\ncontent: {}\n\n",
            r.chunk.source, r.chunk.content
        ));
    }
    out.trim_end().to_string()
}

fn basename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() {
        "document".to_string()
    } else {
        base
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// CLI entry: load documents and print the ranked chunks for a query.
pub fn run_retrieve(
    config: &Config,
    query: &str,
    paths: &[std::path::PathBuf],
    top_k: Option<usize>,
) -> Result<()> {
    let segmenter: Arc<dyn Segmenter> = Arc::new(JiebaSegmenter::new());
    let mut kb = KnowledgeBase::from_config(&config.knowledge, segmenter)?;
    for path in paths {
        kb.load_path(path, &config.knowledge.include_globs)?;
    }

    let top_k = top_k.unwrap_or(config.knowledge.top_k);
    let results = kb.retrieve(query, top_k, config.knowledge.diversity);
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, r.score, r.chunk.source);
        let preview: String = r.chunk.content.chars().take(200).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}
