//! # Context Assistant CLI (`ctxa`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxa chat` | Interactive conversation with slash commands |
//! | `ctxa ask "<question>"` | Answer one question and exit |
//! | `ctxa route "<text>"` | Print the routing decision for an utterance |
//! | `ctxa retrieve "<query>" --knowledge <path>...` | Rank knowledge chunks for a query |
//! | `ctxa tool <kind> "<argument>"` | Invoke one tool adapter directly |
//! | `ctxa sessions list\|show\|delete` | Manage saved conversations |
//!
//! ## Examples
//!
//! ```bash
//! ctxa chat --knowledge ./docs --config ./config/assistant.toml
//! ctxa ask "读取 C:\\notes\\todo.txt 的内容" --save
//! ctxa tool weather "杭州市"
//! ctxa sessions show chat_你好_20260101_120000.json
//! ```

use clap::{Parser, Subcommand};
use context_assistant::chat::{self, ChatOptions};
use context_assistant::config::{self, DEFAULT_CONFIG_PATH};
use context_assistant::models::ToolKind;
use context_assistant::{knowledge, logging, router, sessions, tools};
use std::path::PathBuf;

/// Context Assistant: a tool-routing, knowledge-grounded chat assistant.
///
/// All commands accept `--config`. Without it, `./config/assistant.toml` is
/// used when present and built-in defaults otherwise.
#[derive(Parser)]
#[command(name = "ctxa", version, about = "Tool-routing, knowledge-grounded chat assistant")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation.
    Chat {
        /// Model to use instead of `[model].default`.
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature in [0, 2].
        #[arg(long)]
        temperature: Option<f64>,

        /// Files or directories to load into the knowledge base.
        #[arg(long, short = 'k')]
        knowledge: Vec<PathBuf>,

        /// Saved conversation to resume.
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Answer a single question.
    ///
    /// Exits non-zero when the response is an error.
    Ask {
        question: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long, short = 'k')]
        knowledge: Vec<PathBuf>,

        #[arg(long)]
        session: Option<PathBuf>,

        /// Image to send with the question (multimodal model only).
        #[arg(long)]
        image: Option<PathBuf>,

        /// Save the conversation to the sessions directory afterwards.
        #[arg(long)]
        save: bool,

        /// Print the response envelope as JSON instead of streaming text.
        #[arg(long)]
        json: bool,
    },

    /// Show which tool an utterance routes to, without calling it.
    Route { utterance: String },

    /// Rank knowledge chunks for a query.
    Retrieve {
        query: String,

        /// Files or directories to index.
        #[arg(long, short = 'k', required = true)]
        knowledge: Vec<PathBuf>,

        /// Number of chunks to return (defaults to `[knowledge].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Invoke one tool adapter directly.
    Tool {
        /// `search`, `weather` or `file`.
        kind: ToolKind,
        argument: String,
    },

    /// Manage saved conversations.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List saved conversations, newest first.
    List,
    /// Print a saved conversation.
    Show { name: PathBuf },
    /// Delete a saved conversation.
    Delete { name: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Chat {
            model,
            temperature,
            knowledge,
            session,
        } => {
            let options = ChatOptions {
                model,
                temperature,
                knowledge,
                session,
            };
            chat::run_chat(&cfg, options).await?;
        }
        Commands::Ask {
            question,
            model,
            temperature,
            knowledge,
            session,
            image,
            save,
            json,
        } => {
            let options = ChatOptions {
                model,
                temperature,
                knowledge,
                session,
            };
            chat::run_ask(&cfg, &question, options, image.as_deref(), save, json).await?;
        }
        Commands::Route { utterance } => {
            router::run_route(&cfg, &utterance)?;
        }
        Commands::Retrieve {
            query,
            knowledge,
            top_k,
        } => {
            knowledge::run_retrieve(&cfg, &query, &knowledge, top_k)?;
        }
        Commands::Tool { kind, argument } => {
            tools::run_tool(&cfg, kind, &argument).await?;
        }
        Commands::Sessions { action } => match action {
            SessionsAction::List => sessions::run_list(&cfg)?,
            SessionsAction::Show { name } => sessions::run_show(&cfg, &name)?,
            SessionsAction::Delete { name } => sessions::run_delete(&cfg, &name)?,
        },
    }

    Ok(())
}
