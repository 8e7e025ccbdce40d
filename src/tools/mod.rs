//! Tool adapters and their registry.
//!
//! A tool adapter wraps one external capability behind a uniform, blocking
//! call: `invoke(argument) -> ToolResult`. Adapters never return `Err` and
//! never panic; a disabled adapter, a missing credential, a missing file or a
//! transport failure all come back as `ToolResult { success: false, .. }` with
//! a human-readable reason the orchestrator can fold into the prompt.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌─────────┐ ┌──────────┐ ┌──────────┐  │
//! │  │  file   │ │ weather  │ │  search  │  │
//! │  │ (disk)  │ │ (HTTP)   │ │ (HTTP)   │  │
//! │  └─────────┘ └──────────┘ └──────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        request worker → ToolResult
//! ```
//!
//! Calls block, so they only ever run on the request worker thread.
//!
//! # Usage
//!
//! ```rust
//! use context_assistant::config::Config;
//! use context_assistant::tools::ToolRegistry;
//!
//! let tools = ToolRegistry::from_config(&Config::minimal());
//! assert_eq!(tools.len(), 3);
//! ```

pub mod file;
pub mod search;
pub mod weather;

use anyhow::Result;

use crate::config::Config;
use crate::models::{ToolKind, ToolRequest, ToolResult};

pub use file::FileReader;
pub use search::WebSearch;
pub use weather::WeatherLookup;

// ═══════════════════════════════════════════════════════════════════════
// Adapter Trait
// ═══════════════════════════════════════════════════════════════════════

/// One external capability the router can dispatch to.
///
/// # Example
///
/// ```rust
/// use context_assistant::models::{ToolKind, ToolResult};
/// use context_assistant::tools::ToolAdapter;
///
/// struct EchoFile;
///
/// impl ToolAdapter for EchoFile {
///     fn kind(&self) -> ToolKind { ToolKind::File }
///     fn description(&self) -> &str { "echoes the path back" }
///     fn is_enabled(&self) -> bool { true }
///     fn invoke(&self, argument: &str) -> ToolResult {
///         ToolResult::ok(ToolKind::File, argument)
///     }
/// }
/// ```
pub trait ToolAdapter: Send + Sync {
    /// Which routed intent this adapter serves.
    fn kind(&self) -> ToolKind;

    /// One-line description for listings.
    fn description(&self) -> &str;

    /// Disabled adapters answer immediately with a failure and do no I/O.
    fn is_enabled(&self) -> bool;

    /// Runs the tool. Blocking. Never panics, never returns `Err`.
    fn invoke(&self, argument: &str) -> ToolResult;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Adapters keyed by [`ToolKind`]. Registering a kind twice replaces the
/// earlier adapter, which is how tests swap in fakes.
pub struct ToolRegistry {
    adapters: Vec<Box<dyn ToolAdapter>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry with the file, weather and search adapters built
    /// from configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(FileReader::new(config.tools.file.clone())));
        registry.register(Box::new(WeatherLookup::new(config.tools.weather.clone())));
        registry.register(Box::new(WebSearch::new(config.tools.search.clone())));
        registry
    }

    /// Register an adapter, replacing any adapter of the same kind.
    pub fn register(&mut self, adapter: Box<dyn ToolAdapter>) {
        self.adapters.retain(|a| a.kind() != adapter.kind());
        self.adapters.push(adapter);
    }

    /// Find the adapter for a kind.
    pub fn find(&self, kind: ToolKind) -> Option<&dyn ToolAdapter> {
        self.adapters
            .iter()
            .find(|a| a.kind() == kind)
            .map(|a| a.as_ref())
    }

    pub fn adapters(&self) -> &[Box<dyn ToolAdapter>] {
        &self.adapters
    }

    /// One line per adapter: kind, state and description.
    pub fn summary(&self) -> Vec<String> {
        self.adapters()
            .iter()
            .map(|a| {
                let state = if a.is_enabled() { "on" } else { "off" };
                format!("{:<8}[{}] {}", a.kind().as_str(), state, a.description())
            })
            .collect()
    }

    /// Dispatch a routed request. An unregistered kind is reported as a
    /// failed result, like any other tool failure.
    pub fn invoke(&self, request: &ToolRequest) -> ToolResult {
        let result = match self.find(request.kind) {
            Some(adapter) => adapter.invoke(&request.argument),
            None => ToolResult::failed(
                request.kind,
                format!("no {} tool is registered", request.kind),
            ),
        };
        tracing::info!(
            tool = %request.kind,
            success = result.success,
            "tool invoked"
        );
        result
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI entry: invoke one adapter directly and print its result.
pub async fn run_tool(config: &Config, kind: ToolKind, argument: &str) -> Result<()> {
    let registry = ToolRegistry::from_config(config);
    let request = ToolRequest {
        kind,
        argument: argument.to_string(),
    };
    let result = tokio::task::spawn_blocking(move || registry.invoke(&request)).await?;

    let status = if result.success { "ok" } else { "failed" };
    println!("[{} {}] {}", result.kind, status, result.result_text);
    if !result.success {
        anyhow::bail!("{} tool failed", result.kind);
    }
    Ok(())
}
