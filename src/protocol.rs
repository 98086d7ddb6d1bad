//! JSON wire contract with the detection service.
//!
//! Outbound messages are raw frame payloads (base64 JPEG, no header) and need no
//! schema. Inbound messages are JSON objects carrying the current snapshot under
//! `detected_pieces`; any other fields are ignored. Entries need only a
//! `piece` label.

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};

/// One piece reported by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPiece {
    /// Piece label, e.g. `white-knight`.
    pub piece: String,
    /// Board square, file letter followed by rank digit. Services that only
    /// classify pieces leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl DetectedPiece {
    pub fn new(piece: impl Into<String>, position: impl Into<String>, confidence: f32) -> Self {
        Self {
            piece: piece.into(),
            position: Some(position.into()),
            confidence,
        }
    }

    pub fn square(&self) -> Option<&str> {
        self.position.as_deref()
    }
}

/// Every piece detected at one point in time, in service order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSnapshot(Vec<DetectedPiece>);

impl DetectionSnapshot {
    pub fn new(pieces: Vec<DetectedPiece>) -> Self {
        Self(pieces)
    }

    pub fn pieces(&self) -> &[DetectedPiece] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DetectedPiece> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First piece carrying the given label.
    pub fn find(&self, piece: &str) -> Option<&DetectedPiece> {
        self.0.iter().find(|p| p.piece == piece)
    }
}

impl FromIterator<DetectedPiece> for DetectionSnapshot {
    fn from_iter<I: IntoIterator<Item = DetectedPiece>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DetectionSnapshot {
    type Item = &'a DetectedPiece;
    type IntoIter = std::slice::Iter<'a, DetectedPiece>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Message sent by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMessage {
    pub detected_pieces: DetectionSnapshot,
}

impl DetectionMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Decode an inbound payload into a snapshot.
///
/// # Errors
/// Returns `VisionError::MalformedMessage` when the payload is not JSON or lacks
/// a well-formed `detected_pieces` list.
pub fn parse_detections(payload: &str) -> Result<DetectionSnapshot> {
    DetectionMessage::from_json(payload)
        .map(|message| message.detected_pieces)
        .map_err(|e| VisionError::MalformedMessage {
            message: format!("{} (payload: {})", e, preview(payload)),
        })
}

fn preview(payload: &str) -> String {
    const LIMIT: usize = 80;
    match payload.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &payload[..idx]),
        None => payload.to_string(),
    }
}
