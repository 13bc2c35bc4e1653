//! Conversation types shared by the provider, the stream decoder and the session.
//!
//! These are kept deliberately close to the chat completions wire format: a
//! message is a role plus plain text, and a tool is a name, a description and
//! a JSON schema. The two tools this crate knows about live in [`crate::tools`].
pub mod message;
pub mod role;
pub mod tool;
