//! Client-facing data model and collaborator seams for the Colloquy
//! message-history pane. Import from here, not from the engine crate's
//! internals.

mod assets;
mod channel;
mod notice;
mod types;
mod update;

pub use assets::{AssetFetcher, AssetOwner, BlobCache, FetchError};
pub use channel::{ChannelError, ChatChannel, ChatUpdateSource};
pub use notice::ChatNotice;
pub use types::*;
pub use update::ChatUpdate;
