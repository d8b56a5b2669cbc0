//! policy-copilot: validator and streaming AI assistant for API gateway
//! policy documents.
//!
//! Two engines carry the weight: the attribute validator (`validate`,
//! `position`) and the streamed-reply consumer (`stream`). Everything
//! else wires them to an editor, an endpoint and a place to keep state.

pub mod chat;
pub mod config;
pub mod editor;
pub mod llm;
pub mod position;
pub mod store;
pub mod stream;
pub mod suggest;
pub mod validate;
