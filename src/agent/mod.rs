//! Adaptive agent layer: deterministic prompt composition plus the live
//! chat boundary that consumes it

pub mod chat;
pub mod composer;

pub use chat::{AdaptedReply, LiveAgent};
pub use composer::PromptComposer;
