//! `cogs-store` — namespaced, TTL-aware key-value persistence over a
//! string-blob medium.
//!
//! # Overview
//!
//! The medium (a browser cookie jar in the real host) only understands
//! whole-string writes of `name=value` pairs with lifetime attributes.
//! [`CookieStore`] layers three things on top:
//!
//! - **Serialization** — any [`serde_json::Value`] round-trips through
//!   canonical JSON plus percent-encoding, so structured values survive the
//!   medium's delimiter rules.
//! - **Ownership** — each store instance keeps an ordered registry of the
//!   keys it has written, persisted under `"<owner>-List"`. Ownership
//!   questions (`has`, `keys`, `reset`) never scan the whole medium.
//! - **Expiry** — positive TTLs become `expires=` attributes; a negative
//!   TTL erases an entry immediately.
//!
//! Reads never fail: a stored value that no longer parses as JSON comes
//! back as its raw decoded text.

pub mod error;
pub mod jar;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::CookieStore;
pub use types::{ModifyOp, WriteOptions};
