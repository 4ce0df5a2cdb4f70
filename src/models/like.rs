//! Represents a like, polymorphic over the kind of thing being liked.

use super::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a like points at.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Video,
    Comment,
    Tweet,
}

impl TargetKind {
    /// Collection holding documents of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            TargetKind::Video => "videos",
            TargetKind::Comment => "comments",
            TargetKind::Tweet => "tweets",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            TargetKind::Video => "video",
            TargetKind::Comment => "comment",
            TargetKind::Tweet => "tweet",
        }
    }
}

/// The target of a like: exactly one kind plus the referenced document.
///
/// Enforced at construction; a like can never point at two kinds at once.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikeTarget {
    pub kind: TargetKind,
    pub target_id: ObjectId,
}

/// A like document in the `likes` collection.
///
/// At most one like may exist per `(liked_by, target)` pair; the storage
/// layer enforces this through [`Like::unique_key`].
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: ObjectId,

    pub liked_by: ObjectId,

    #[serde(flatten)]
    pub target: LikeTarget,

    pub created_at: DateTime<Utc>,
}

impl Like {
    pub fn unique_key(liked_by: ObjectId, target: LikeTarget) -> String {
        format!("{}:{}:{}", liked_by, target.kind.noun(), target.target_id)
    }
}
