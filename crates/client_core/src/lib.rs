//! Client side of the story tree editor: the local tree, its layout, the
//! per-node regenerate lock and synchronisation with the story server.

pub mod error;
pub mod generation;
pub mod layout;
pub mod markdown;
pub mod session;
pub mod sync;
pub mod transport;
pub mod tree_store;
pub mod view;

pub use error::{Invariant, TreeError};
pub use generation::{GenerationLock, LockState, ManualTicks, TickSource, TokioTicks};
pub use layout::{compute_layout, Layout, LayoutConfig};
pub use session::{SessionInput, StorySession, UserAction};
pub use sync::{ChannelSink, RegenOutcome, RequestSink, SyncClient};
pub use tree_store::TreeStore;
pub use view::{NodeView, Scene, SceneCache, ViewBinder};

#[cfg(test)]
mod test_support;
