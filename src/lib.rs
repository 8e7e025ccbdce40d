//! # Context Assistant
//!
//! A conversational assistant that routes each question to an optional
//! external tool, grounds the answer in a local knowledge base and streams
//! the model's reply.
//!
//! ## Architecture
//!
//! ```text
//!  question ──▶ ┌──────────┐   ┌───────────────┐
//!               │  Router  │──▶│ Tools         │  search / weather / file
//!               └────┬─────┘   └──────┬────────┘
//!                    │                │ result folded into prompt
//!                    ▼                ▼
//!               ┌──────────────────────────┐   ┌──────────────┐
//!               │      Orchestrator        │◀──│ Knowledge    │  TF-IDF over
//!               │  (one request in flight) │   │ base (RAG)   │  jieba terms
//!               └────┬────────────────┬────┘   └──────────────┘
//!                    │ deltas         │ commit
//!                    ▼                ▼
//!               ┌──────────┐   ┌──────────────┐
//!               │ Backend  │   │ Conversation │──▶ JSON session files
//!               │ (SSE)    │   │ history      │
//!               └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctxa chat --knowledge ./docs           # interactive, with a knowledge base
//! ctxa ask "杭州市天气怎么样"              # one question, streamed
//! ctxa route "搜索 Rust 最新版本"          # show the routing decision only
//! ctxa retrieve "所有权" -k ./docs        # rank knowledge chunks
//! ctxa sessions list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`router`] | Intent classification and argument extraction |
//! | [`tools`] | Search, weather and file adapters |
//! | [`segment`] | Word segmentation and stopwords |
//! | [`chunk`] | Text chunking |
//! | [`index`] | TF-IDF vectors and cosine similarity |
//! | [`knowledge`] | Knowledge base and retrieval |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`memory`] | Bounded conversation history |
//! | [`sessions`] | Saved conversations |
//! | [`validate`] | Input and output schema checks |
//! | [`backend`] | Streaming chat-completion client |
//! | [`session`] | Foreground session state |
//! | [`orchestrator`] | Request pipeline |
//! | [`chat`] | REPL and one-shot front ends |
//! | [`logging`] | Tracing subscriber setup |

pub mod backend;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod knowledge;
pub mod logging;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod router;
pub mod segment;
pub mod session;
pub mod sessions;
pub mod tools;
pub mod validate;
