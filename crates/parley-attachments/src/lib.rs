//! Parley attachments crate - file classification, locator store, and the
//! composition buffer's attachment list.
//!
//! A `LocatorStore` owns the bytes behind every attachment handle. Each locator
//! belongs to exactly one party at a time: the `AttachmentManager` while the
//! file sits in the draft, then the sent message once ownership moves out via
//! `take_pending`. Whoever owns a locator releases it.

pub mod classify;
pub mod error;
pub mod manager;
pub mod store;

pub use classify::classify;
pub use error::AttachmentError;
pub use manager::{AttachmentManager, FileInput};
pub use store::LocatorStore;
