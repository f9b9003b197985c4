//! Parley API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Exposes the conversation, the server-side draft (text, attachments,
//! dictation), chat settings and a live event stream to a local front end.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
