// ABOUTME: Root library module exposing all public modules
// ABOUTME: Chat transport, trigger recognition, cooldown, Helix client, Discord notifier and clip workflow

pub mod commands;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod helix;
pub mod irc;
pub mod notifier;
pub mod orchestrator;
pub mod transport;

pub use commands::{CommandRecognizer, TriggerEvent};
pub use config::Config;
pub use orchestrator::{ClipBot, ClipOrchestrator, ClipResult};
pub use transport::{ChatSender, ChatSession, ConnectionState};
