//! Interactive and one-shot front ends.
//!
//! `ctxa chat` runs a line-oriented REPL over one [`Session`]; `ctxa ask`
//! submits a single question and exits non-zero when the response is an
//! error envelope. Both stream deltas to stdout as they arrive and write
//! tool and context notices to stderr.
//!
//! REPL commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/help` | List commands |
//! | `/clear` | Forget the conversation |
//! | `/save` | Save the conversation to the sessions directory |
//! | `/load <file>` | Replace the conversation with a saved one |
//! | `/sessions` | List saved conversations |
//! | `/kb add <path>` | Add a file or directory to the knowledge base |
//! | `/kb clear` | Empty the knowledge base |
//! | `/kb list` | Show loaded sources and chunk counts |
//! | `/image <path>` / `/image clear` | Attach an image for the multimodal model |
//! | `/model [name]` | Show or switch the model |
//! | `/temp <value>` | Set the sampling temperature |
//! | `/quit` | Exit |

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::orchestrator::{Orchestrator, Update};
use crate::segment::{JiebaSegmenter, Segmenter};
use crate::session::Session;
use crate::sessions;
use crate::validate::Submission;

/// Per-run choices from the command line.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub knowledge: Vec<PathBuf>,
    /// Saved conversation to resume.
    pub session: Option<PathBuf>,
}

/// Reads an image file and returns it base64-encoded.
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(BASE64.encode(bytes))
}

fn new_session(config: &Config, options: &ChatOptions) -> Result<Session> {
    let segmenter: Arc<dyn Segmenter> = Arc::new(JiebaSegmenter::new());
    let mut session = Session::from_config(config, segmenter)?;
    if let Some(saved) = &options.session {
        let path = sessions::resolve(&config.memory.sessions_dir, saved);
        let turns = session.load(&path)?;
        eprintln!("[session] {}: {} turns", path.display(), turns);
    }
    for path in &options.knowledge {
        let added = session
            .knowledge
            .load_path(path, &config.knowledge.include_globs)?;
        eprintln!("[kb] {}: {} chunks", path.display(), added);
    }
    Ok(session)
}

/// Prints one update as it arrives.
fn render(update: &Update) {
    match update {
        Update::Phase(phase) => tracing::trace!(phase = %phase, "phase"),
        Update::Tool(result) => {
            let status = if result.success { "ok" } else { "failed" };
            eprintln!("[{} {}]", result.kind.label(), status);
        }
        Update::Context(context) => {
            let sources = context
                .lines()
                .filter_map(|l| l.strip_prefix("source: "))
                .collect::<Vec<_>>()
                .join(", ");
            eprintln!("[context: {}]", sources);
        }
        Update::Delta(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        Update::Done(_) => println!(),
        Update::Failed { envelope, .. } => {
            println!();
            eprintln!("error: {}", envelope.content);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// One-shot
// ═══════════════════════════════════════════════════════════════════════

pub async fn run_ask(
    config: &Config,
    question: &str,
    options: ChatOptions,
    image: Option<&Path>,
    save: bool,
    json: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config);
    let mut session = new_session(config, &options)?;

    let submission = Submission {
        question: question.to_string(),
        model: options.model.unwrap_or_else(|| config.model.default.clone()),
        temperature: options.temperature.unwrap_or(config.model.temperature),
        image: image.map(encode_image).transpose()?,
    };

    let envelope = orchestrator
        .run(&mut session, submission, |update| {
            if !json {
                render(update)
            }
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    if save {
        let path = session.save(&config.memory.sessions_dir)?;
        eprintln!("Saved {}", path.display());
    }
    if !envelope.is_success() {
        anyhow::bail!("{}", envelope.content);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// REPL
// ═══════════════════════════════════════════════════════════════════════

struct ReplState {
    model: String,
    temperature: f64,
    image: Option<String>,
}

enum Flow {
    Continue,
    Quit,
}

pub async fn run_chat(config: &Config, options: ChatOptions) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config);
    let mut session = new_session(config, &options)?;
    let mut state = ReplState {
        model: options.model.unwrap_or_else(|| config.model.default.clone()),
        temperature: options.temperature.unwrap_or(config.model.temperature),
        image: None,
    };

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        eprintln!("model: {}  (type /help for commands)", state.model);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(config, &orchestrator, &mut session, &mut state, command) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => eprintln!("error: {:#}", e),
            }
            continue;
        }

        let submission = Submission {
            question: line.to_string(),
            model: state.model.clone(),
            temperature: state.temperature,
            image: state.image.clone(),
        };
        match orchestrator.run(&mut session, submission, render).await {
            Ok(envelope) => {
                if envelope.is_success() {
                    state.image = None;
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn handle_command(
    config: &Config,
    orchestrator: &Orchestrator,
    session: &mut Session,
    state: &mut ReplState,
    command: &str,
) -> Result<Flow> {
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => {
            eprintln!("/clear /save /load <file> /sessions /kb add|clear|list /image <path>|clear /model [name] /temp <value> /quit");
            eprintln!("tools:");
            for line in orchestrator.tools().summary() {
                eprintln!("  {}", line);
            }
        }
        "clear" => {
            session.clear_history()?;
            eprintln!("Conversation cleared.");
        }
        "save" => {
            let path = session.save(&config.memory.sessions_dir)?;
            eprintln!("Saved {}", path.display());
        }
        "load" => {
            if arg.is_empty() {
                anyhow::bail!("usage: /load <file>");
            }
            let path = sessions::resolve(&config.memory.sessions_dir, Path::new(arg));
            let turns = session.load(&path)?;
            eprintln!("Loaded {} turns from {}", turns, path.display());
        }
        "sessions" => {
            for path in sessions::list(&config.memory.sessions_dir)? {
                if let Some(name) = path.file_name() {
                    eprintln!("{}", name.to_string_lossy());
                }
            }
        }
        "kb" => handle_kb(config, session, arg)?,
        "image" => match arg {
            "" => anyhow::bail!("usage: /image <path> | /image clear"),
            "clear" => {
                state.image = None;
                eprintln!("Image cleared.");
            }
            path => {
                state.image = Some(encode_image(Path::new(path))?);
                eprintln!(
                    "Image attached; it is sent with the next question to {}.",
                    orchestrator.policy().multimodal
                );
            }
        },
        "model" => {
            if arg.is_empty() {
                for model in &orchestrator.policy().models {
                    let marker = if *model == state.model { "*" } else { " " };
                    eprintln!("{} {}", marker, model);
                }
            } else if orchestrator.policy().models.iter().any(|m| m == arg) {
                state.model = arg.to_string();
                eprintln!("model: {}", state.model);
            } else {
                anyhow::bail!("unknown model: {}", arg);
            }
        }
        "temp" => {
            let value: f64 = arg
                .parse()
                .with_context(|| format!("invalid temperature: {}", arg))?;
            if !(0.0..=2.0).contains(&value) {
                anyhow::bail!("temperature must be in [0, 2]");
            }
            state.temperature = value;
        }
        other => anyhow::bail!("unknown command: /{}", other),
    }
    Ok(Flow::Continue)
}

fn handle_kb(config: &Config, session: &mut Session, arg: &str) -> Result<()> {
    let mut parts = arg.splitn(2, char::is_whitespace);
    match (parts.next().unwrap_or_default(), parts.next().map(str::trim)) {
        ("add", Some(path)) if !path.is_empty() => {
            let added = session
                .knowledge
                .load_path(Path::new(path), &config.knowledge.include_globs)?;
            eprintln!("Added {} chunks from {}", added, path);
        }
        ("clear", _) => {
            session.knowledge.clear();
            eprintln!("Knowledge base cleared.");
        }
        ("list", _) | ("", _) => {
            let summary = session.knowledge.summary();
            if summary.chunks == 0 {
                eprintln!("Knowledge base is empty.");
            }
            for (source, chunks) in summary.sources {
                eprintln!("{} ({} chunks)", source, chunks);
            }
        }
        _ => anyhow::bail!("usage: /kb add <path> | /kb clear | /kb list"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::shared_segmenter;

    fn fixture() -> (Config, Orchestrator, Session, ReplState) {
        let config = Config::minimal();
        let orchestrator = Orchestrator::from_config(&config);
        let session = Session::from_config(&config, shared_segmenter()).unwrap();
        let state = ReplState {
            model: config.model.default.clone(),
            temperature: 0.7,
            image: None,
        };
        (config, orchestrator, session, state)
    }

    #[test]
    fn test_model_switch_rejects_unknown() {
        let (config, orch, mut session, mut state) = fixture();
        let target = config.model.multimodal.clone();
        handle_command(&config, &orch, &mut session, &mut state, &format!("model {}", target))
            .unwrap();
        assert_eq!(state.model, target);
        assert!(handle_command(&config, &orch, &mut session, &mut state, "model nope").is_err());
        assert_eq!(state.model, target);
    }

    #[test]
    fn test_help_lists_every_tool() {
        let (config, orch, mut session, mut state) = fixture();
        let flow = handle_command(&config, &orch, &mut session, &mut state, "help").unwrap();
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(orch.tools().summary().len(), 3);
    }

    #[test]
    fn test_kb_add_and_clear() {
        let (config, orch, mut session, mut state) = fixture();
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "Rust ownership rules").unwrap();

        handle_command(
            &config,
            &orch,
            &mut session,
            &mut state,
            &format!("kb add {}", file.display()),
        )
        .unwrap();
        assert!(!session.knowledge.is_empty());

        handle_command(&config, &orch, &mut session, &mut state, "kb clear").unwrap();
        assert!(session.knowledge.is_empty());
    }

    #[test]
    fn test_image_attach_and_temperature() {
        let (config, orch, mut session, mut state) = fixture();
        let dir = tempfile::TempDir::new().unwrap();
        let img = dir.path().join("a.jpg");
        std::fs::write(&img, b"ABC").unwrap();

        handle_command(
            &config,
            &orch,
            &mut session,
            &mut state,
            &format!("image {}", img.display()),
        )
        .unwrap();
        assert_eq!(state.image.as_deref(), Some("QUJD"));

        assert!(handle_command(&config, &orch, &mut session, &mut state, "temp 3").is_err());
        handle_command(&config, &orch, &mut session, &mut state, "temp 1.5").unwrap();
        assert_eq!(state.temperature, 1.5);
    }

    #[test]
    fn test_quit_and_unknown() {
        let (config, orch, mut session, mut state) = fixture();
        assert!(matches!(
            handle_command(&config, &orch, &mut session, &mut state, "quit"),
            Ok(Flow::Quit)
        ));
        assert!(handle_command(&config, &orch, &mut session, &mut state, "bogus").is_err());
    }
}
