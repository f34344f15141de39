use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// The four photographed phases of a golf swing, in swing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingPosition {
    Address,
    Top,
    Impact,
    FollowThrough,
}

impl SwingPosition {
    pub const ALL: [SwingPosition; 4] = [
        SwingPosition::Address,
        SwingPosition::Top,
        SwingPosition::Impact,
        SwingPosition::FollowThrough,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwingPosition::Address => "address",
            SwingPosition::Top => "top",
            SwingPosition::Impact => "impact",
            SwingPosition::FollowThrough => "follow_through",
        }
    }
}

impl fmt::Display for SwingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwingPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "address" => Ok(SwingPosition::Address),
            "top" => Ok(SwingPosition::Top),
            "impact" => Ok(SwingPosition::Impact),
            "follow_through" => Ok(SwingPosition::FollowThrough),
            other => Err(format!("unknown swing position: {}", other)),
        }
    }
}

/// Base64 image data keyed by position.
pub type SwingImages = BTreeMap<SwingPosition, String>;

/// User-supplied context about the shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationContext {
    pub club: Option<String>,
    pub shot_outcome: Option<String>,
    pub focus_area: Option<String>,
    pub notes: Option<String>,
}

impl AnnotationContext {
    pub fn is_empty(&self) -> bool {
        self.club.is_none()
            && self.shot_outcome.is_none()
            && self.focus_area.is_none()
            && self.notes.is_none()
    }
}

/// A stored swing analysis. Rows are never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SwingRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub images: Json<SwingImages>,
    pub analysis: String,
    pub summary: Option<String>,
    pub rating: Option<i64>,
    pub positions_analyzed: String,
    pub club: Option<String>,
    pub shot_outcome: Option<String>,
    pub focus_area: Option<String>,
    pub notes: Option<String>,
}

impl SwingRecord {
    /// Stored positions, canonical swing order. Unknown names are skipped.
    pub fn positions(&self) -> Vec<SwingPosition> {
        self.positions_analyzed
            .split(',')
            .filter_map(|p| p.parse().ok())
            .collect()
    }
}

/// Insert payload for a new swing row.
#[derive(Debug, Clone)]
pub struct NewSwing {
    pub images: SwingImages,
    pub positions: Vec<SwingPosition>,
    pub analysis: String,
    pub summary: Option<String>,
    pub rating: Option<i64>,
    pub annotations: AnnotationContext,
}

impl NewSwing {
    pub fn positions_analyzed(&self) -> String {
        self.positions
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Lightweight projection used by history listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingHistoryItem {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub rating: Option<i64>,
    pub positions_analyzed: String,
    pub thumbnail: Option<String>,
    pub club: Option<String>,
    pub shot_outcome: Option<String>,
}

/// Previous swing summarised for the analysis prompt.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HistoryContext {
    pub created_at: DateTime<Utc>,
    pub rating: Option<i64>,
    pub club: Option<String>,
    pub shot_outcome: Option<String>,
    pub summary: Option<String>,
}
