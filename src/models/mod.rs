//! Core data models for the video-sharing backend.
//!
//! Each entity is a document: it serializes to camelCase JSON, is addressed
//! by an [`ObjectId`], and references other documents only by ID. The
//! structs here are the persisted shapes; client-facing projections are
//! produced per-handler (or via [`user::UserPublic`]).

pub mod comment;
pub mod id;
pub mod like;
pub mod playlist;
pub mod session;
pub mod subscription;
pub mod tweet;
pub mod user;
pub mod video;

pub use comment::Comment;
pub use id::ObjectId;
pub use like::{Like, LikeTarget, TargetKind};
pub use playlist::Playlist;
pub use session::Session;
pub use subscription::Subscription;
pub use tweet::Tweet;
pub use user::{User, UserPublic};
pub use video::Video;
