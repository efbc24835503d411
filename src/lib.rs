#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::uninlined_format_args
)]

//! Conversational session store for the AIMMS virtual patient backend, plus
//! the media tooling checks that run beside it.

pub mod config;
pub mod media;
pub mod sessions;

pub use config::Config;
pub use sessions::{InMemorySessionStore, Session, SessionError, SessionId, SessionStore};
