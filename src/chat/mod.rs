//! Conversation turns: chat backend seam, speech synthesis seam, and the
//! dispatcher that turns transcripts into spoken answers.

pub mod client;
pub mod dispatcher;
pub mod speech;

pub use client::{Answer, ChatClient, MockChatClient, MockResponse};
pub use dispatcher::{STALL_SPEECH, TurnDispatcher, TurnDispatcherConfig};
pub use speech::{MockSynthesizer, Synthesizer};
