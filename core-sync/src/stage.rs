//! # Sync Run State Machine
//!
//! Tracks one document sync through its pipeline stages with validated
//! transitions.
//!
//! ## State Machine
//!
//! ```text
//! ReadSource → ExtractMedia → UploadMediaStage1 → ConvertStage1
//!   → PublishIntermediate → FetchCanonical → UploadMediaStage2
//!   → ConvertStage2 → PublishFinal → PersistState → Done
//! ```
//!
//! Every stage may instead end in `Failed`. Stages are strictly sequential:
//! each one consumes the previous stage's output, so no stage can be skipped.
//! Both directions walk the same stages; only the collaborators behind each
//! stage differ.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Which way content flows through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Markdown vault → structured store → HTML store
    Forward,
    /// HTML store → structured store → Markdown vault
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "reverse" => Ok(Direction::Reverse),
            _ => Err(SyncError::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Pipeline stage of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    ReadSource,
    ExtractMedia,
    UploadMediaStage1,
    ConvertStage1,
    PublishIntermediate,
    FetchCanonical,
    UploadMediaStage2,
    ConvertStage2,
    PublishFinal,
    PersistState,
    Done,
    Failed,
}

impl SyncStage {
    /// The only stage that may follow this one on success.
    pub fn next(&self) -> Option<SyncStage> {
        use SyncStage::*;
        match self {
            ReadSource => Some(ExtractMedia),
            ExtractMedia => Some(UploadMediaStage1),
            UploadMediaStage1 => Some(ConvertStage1),
            ConvertStage1 => Some(PublishIntermediate),
            PublishIntermediate => Some(FetchCanonical),
            FetchCanonical => Some(UploadMediaStage2),
            UploadMediaStage2 => Some(ConvertStage2),
            ConvertStage2 => Some(PublishFinal),
            PublishFinal => Some(PersistState),
            PersistState => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStage::Done | SyncStage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::ReadSource => "read_source",
            SyncStage::ExtractMedia => "extract_media",
            SyncStage::UploadMediaStage1 => "upload_media_stage1",
            SyncStage::ConvertStage1 => "convert_stage1",
            SyncStage::PublishIntermediate => "publish_intermediate",
            SyncStage::FetchCanonical => "fetch_canonical",
            SyncStage::UploadMediaStage2 => "upload_media_stage2",
            SyncStage::ConvertStage2 => "convert_stage2",
            SyncStage::PublishFinal => "publish_final",
            SyncStage::PersistState => "persist_state",
            SyncStage::Done => "done",
            SyncStage::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sync Run
// ============================================================================

/// One pass of the pipeline for a (route, document) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub route: String,
    pub relative_path: String,
    pub direction: Direction,
    stage: SyncStage,
    /// Stage that was running when the run failed.
    failed_at: Option<SyncStage>,
}

impl SyncRun {
    /// Creates a run positioned at `ReadSource`.
    pub fn new(
        route: impl Into<String>,
        relative_path: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            id: SyncRunId::new(),
            route: route.into(),
            relative_path: relative_path.into(),
            direction,
            stage: SyncStage::ReadSource,
            failed_at: None,
        }
    }

    pub fn stage(&self) -> SyncStage {
        self.stage
    }

    pub fn failed_at(&self) -> Option<SyncStage> {
        self.failed_at
    }

    /// Moves to `to`, which must be the successor of the current stage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStageTransition` for any other target.
    pub fn advance(&mut self, to: SyncStage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(SyncError::InvalidStageTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        self.stage = to;
        Ok(())
    }

    /// Marks the run failed, remembering the stage it stopped in.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStageTransition` if the run already finished.
    pub fn fail(&mut self) -> Result<()> {
        if self.stage.is_terminal() {
            return Err(SyncError::InvalidStageTransition {
                from: self.stage.to_string(),
                to: SyncStage::Failed.to_string(),
            });
        }
        self.failed_at = Some(self.stage);
        self.stage = SyncStage::Failed;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
