//! Move detection and spoken announcements.
//!
//! Snapshots are compared per piece label: a piece whose position differs
//! from the last committed snapshot produces one [`MoveAnnouncement`].
//! Pieces without an earlier sighting are not announced, and neither are
//! pieces reported without a square.

pub mod pipeline;
pub mod runner;

use crate::protocol::DetectionSnapshot;
use std::fmt;

pub use pipeline::AnnouncementPipeline;
pub use runner::Announcer;

/// A piece that changed squares between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAnnouncement {
    pub piece: String,
    pub from: String,
    pub to: String,
}

impl fmt::Display for MoveAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} moved from {} to {}", self.piece, self.from, self.to)
    }
}

/// Receives text to be spoken.
pub trait UtteranceSink: Send + Sync {
    fn submit(&self, text: String);
}

/// Moves between `previous` and `current`, in `current`'s order.
///
/// Each piece in `current` is matched against the first piece with the same
/// label in `previous`.
pub fn diff_moves(previous: &DetectionSnapshot, current: &DetectionSnapshot) -> Vec<MoveAnnouncement> {
    current
        .iter()
        .filter_map(|piece| {
            let from = previous.find(&piece.piece)?.square()?;
            let to = piece.square()?;
            (from != to).then(|| MoveAnnouncement {
                piece: piece.piece.clone(),
                from: from.to_string(),
                to: to.to_string(),
            })
        })
        .collect()
}
