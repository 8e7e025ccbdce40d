//! Local file reading.

use std::path::{Path, PathBuf};

use crate::config::FileToolConfig;
use crate::extract::read_document;
use crate::models::{ToolKind, ToolResult};
use crate::tools::ToolAdapter;

pub struct FileReader {
    config: FileToolConfig,
}

impl FileReader {
    pub fn new(config: FileToolConfig) -> Self {
        Self { config }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        if self.config.allowed_dirs.is_empty() {
            return true;
        }
        let Ok(target) = path.canonicalize() else {
            return false;
        };
        self.config.allowed_dirs.iter().any(|dir| {
            dir.canonicalize()
                .map(|d| target.starts_with(d))
                .unwrap_or(false)
        })
    }
}

impl ToolAdapter for FileReader {
    fn kind(&self) -> ToolKind {
        ToolKind::File
    }

    fn description(&self) -> &str {
        "Read a local text, Markdown, PDF or DOCX file"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn invoke(&self, argument: &str) -> ToolResult {
        if !self.config.enabled {
            return ToolResult::failed(ToolKind::File, "file reading is disabled");
        }

        let path = PathBuf::from(argument.trim());
        if !path.exists() {
            return ToolResult::failed(
                ToolKind::File,
                format!("file not found: {}", path.display()),
            );
        }
        if !self.is_allowed(&path) {
            return ToolResult::failed(
                ToolKind::File,
                format!("file is outside the allowed directories: {}", path.display()),
            );
        }

        match read_document(&path) {
            Ok(text) => ToolResult::ok(
                ToolKind::File,
                format!("file content:\n{}", truncate_chars(&text, self.config.max_chars)),
            ),
            Err(e) => ToolResult::failed(ToolKind::File, format!("failed to read file: {}", e)),
        }
    }
}

/// Keeps the first `max_chars` characters, marking a cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
