//! Saved conversations on disk.
//!
//! Each save writes one JSON array of turns to
//! `chat_<title>_<YYYYMMDD_HHMMSS>.json`, where the title comes from the first
//! user turn. Loading returns the turns; the caller decides whether to adopt
//! them, so a failed load never disturbs the live history.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::AssistantError;
use crate::memory::ConversationHistory;
use crate::models::{ConversationTurn, Role};

const TITLE_CHARS: usize = 15;
const MAX_FILENAME_CHARS: usize = 100;
const FORBIDDEN: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Title derived from the first user turn.
pub fn session_title(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "empty".to_string();
    }
    let Some(first) = turns.iter().find(|t| t.role == Role::User) else {
        return "untitled".to_string();
    };

    let cleaned: String = first
        .content
        .chars()
        .filter(|c| !FORBIDDEN.contains(c))
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return "untitled".to_string();
    }
    if cleaned.chars().count() > TITLE_CHARS {
        let head: String = cleaned.chars().take(TITLE_CHARS).collect();
        format!("{}...", head)
    } else {
        cleaned.to_string()
    }
}

/// File name for a save at `timestamp` (`YYYYMMDD_HHMMSS`).
pub fn session_filename(turns: &[ConversationTurn], timestamp: &str) -> String {
    let name = format!("chat_{}_{}.json", session_title(turns), timestamp);
    if name.chars().count() > MAX_FILENAME_CHARS {
        format!("chat_{}.json", timestamp)
    } else {
        name
    }
}

pub fn save(history: &ConversationHistory, dir: &Path) -> Result<PathBuf, AssistantError> {
    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = dir.join(session_filename(history.turns(), &timestamp));
    std::fs::write(&path, history.serialize()?)?;
    tracing::info!(path = %path.display(), turns = history.len(), "session saved");
    Ok(path)
}

pub fn load(path: &Path) -> Result<Vec<ConversationTurn>, AssistantError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AssistantError::Persistence(format!("{}: {}", path.display(), e)))?;
    let turns = ConversationHistory::deserialize(&data)?;
    tracing::info!(path = %path.display(), turns = turns.len(), "session loaded");
    Ok(turns)
}

pub fn delete(path: &Path) -> Result<(), AssistantError> {
    std::fs::remove_file(path)
        .map_err(|e| AssistantError::Persistence(format!("{}: {}", path.display(), e)))
}

/// Saved sessions in `dir`, newest first. A missing directory is empty.
pub fn list(dir: &Path) -> Result<Vec<PathBuf>, AssistantError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !(name.starts_with("chat_") && name.ends_with(".json")) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        entries.push((modified, entry.path()));
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(entries.into_iter().map(|(_, p)| p).collect())
}

/// Resolves a bare file name against the sessions directory.
pub fn resolve(dir: &Path, name: &Path) -> PathBuf {
    if name.components().count() == 1 && !name.exists() {
        dir.join(name)
    } else {
        name.to_path_buf()
    }
}

pub fn run_list(config: &Config) -> Result<()> {
    let sessions = list(&config.memory.sessions_dir)?;
    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    for path in sessions {
        if let Some(name) = path.file_name() {
            println!("{}", name.to_string_lossy());
        }
    }
    Ok(())
}

pub fn run_show(config: &Config, name: &Path) -> Result<()> {
    let path = resolve(&config.memory.sessions_dir, name);
    for turn in load(&path)? {
        println!("[{}] {}", turn.role.as_str(), turn.content);
    }
    Ok(())
}

pub fn run_delete(config: &Config, name: &Path) -> Result<()> {
    let path = resolve(&config.memory.sessions_dir, name);
    delete(&path)?;
    println!("Deleted {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_sanitizes_and_truncates() {
        let turns = vec![ConversationTurn::user("请问: C:\\data/报告*.txt 的\n内容是什么呢，谢谢")];
        let title = session_title(&turns);
        assert!(!title.contains(':') && !title.contains('\\') && !title.contains('/'));
        assert!(!title.contains('\n'));
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_CHARS + 3);
    }

    #[test]
    fn test_title_fallbacks() {
        assert_eq!(session_title(&[]), "empty");
        let mut assistant_only = ConversationTurn::user("x");
        assistant_only.role = Role::Assistant;
        assert_eq!(session_title(&[assistant_only]), "untitled");
        assert_eq!(session_title(&[ConversationTurn::user("你好")]), "你好");
    }

    #[test]
    fn test_filename_format_and_overflow() {
        let turns = vec![ConversationTurn::user("hello")];
        assert_eq!(
            session_filename(&turns, "20260101_120000"),
            "chat_hello_20260101_120000.json"
        );
        let long_ts = "9".repeat(90);
        assert_eq!(
            session_filename(&turns, &long_ts),
            format!("chat_{}.json", long_ts)
        );
    }

    #[test]
    fn test_save_list_load_delete() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut history = ConversationHistory::new(5);
        history.append(ConversationTurn::user("第一个问题"));

        let path = save(&history, dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("chat_第一个问题_"));
        assert_eq!(list(dir.path()).unwrap(), vec![path.clone()]);
        assert_eq!(load(&path).unwrap(), history.turns());

        delete(&path).unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
        assert!(matches!(load(&path), Err(AssistantError::Persistence(_))));
    }

    #[test]
    fn test_list_ignores_other_files_and_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.json"), "[]").unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
        assert!(list(&dir.path().join("nope")).unwrap().is_empty());
    }
}
