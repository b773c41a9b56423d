//! Per-session conversation history for the Voxa voice relay.
//!
//! A session is an ordered list of [`Turn`](voxa_types::Turn)s keyed by an
//! opaque caller-supplied string. Sessions are created lazily, serialized per
//! key through a FIFO gate, and evicted after a configurable idle period.
//!
//! The language model never sees the full history: [`build_prompt`] renders
//! only the most recent window of turns.
//!
//! ```rust,ignore
//! use voxa_conversation::{build_prompt, ConversationStore, InMemoryStore, StoreSettings};
//!
//! let store = InMemoryStore::new(StoreSettings::default());
//! let _permit = store.acquire("sess_1").await;
//! store.append_turn("sess_1", Role::User, "hello");
//! let prompt = build_prompt(&store.window("sess_1", 10), None);
//! ```

mod store;
mod window;

pub use store::{ConversationStore, InMemoryStore, SessionPermit, StoreSettings};
pub use window::{build_prompt, DEFAULT_WINDOW_TURNS};
