//! Lifecycle record and phase log types.
//!
//! A [`LifecycleRecord`] is one document per unit of work. Its `phases` log
//! is append-only and ordered by when the tracker observed each report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::RequestId;

/// Overall status of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl RecordStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<PhaseStatus> for RecordStatus {
    fn from(status: PhaseStatus) -> Self {
        match status {
            PhaseStatus::InProgress => RecordStatus::InProgress,
            PhaseStatus::Completed => RecordStatus::Completed,
            PhaseStatus::Failed => RecordStatus::Failed,
        }
    }
}

/// One entry in a record's phase log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: String,
    pub status: PhaseStatus,
    /// The collaborator that performed the phase.
    pub system_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl PhaseEntry {
    fn open(report: &PhaseReport, at: DateTime<Utc>) -> Self {
        Self {
            phase: report.phase.clone(),
            status: report.status,
            system_id: report.system_id.clone(),
            started_at: at,
            ended_at: report.status.is_terminal().then_some(at),
        }
    }

    /// Whether the phase has not reported a terminal status yet.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Wall-clock duration, once the phase has ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}

/// A phase transition reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub id: RequestId,
    pub phase: String,
    pub system_id: String,
    pub status: PhaseStatus,
    /// A terminal status on a final phase also ends the record.
    #[serde(default)]
    pub is_final: bool,
    /// When the transition happened. Defaults to the tracker's clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl PhaseReport {
    pub fn new(
        id: RequestId,
        phase: impl Into<String>,
        system_id: impl Into<String>,
        status: PhaseStatus,
    ) -> Self {
        Self {
            id,
            phase: phase.into(),
            system_id: system_id.into(),
            status,
            is_final: false,
            at: None,
        }
    }

    /// Mark this report as the final phase of the unit of work.
    pub fn with_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Use a caller-observed transition time.
    pub fn with_time(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// The tracked history of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub id: RequestId,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub phases: Vec<PhaseEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Result of applying a report to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record changed and must be persisted.
    Changed,
    /// The report repeated what the record already says.
    Unchanged,
}

/// Why a report was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub reason: String,
}

impl LifecycleRecord {
    /// A freshly created record with no phases.
    pub fn new(
        id: RequestId,
        metadata: BTreeMap<String, serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: RecordStatus::Created,
            current_phase: None,
            phases: Vec::new(),
            created_at: at,
            updated_at: at,
            metadata,
        }
    }

    /// The most recent entry for `phase`.
    pub fn phase(&self, phase: &str) -> Option<&PhaseEntry> {
        self.phases.iter().rev().find(|entry| entry.phase == phase)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a phase report in place.
    ///
    /// On rejection the record is left untouched.
    pub fn apply(
        &mut self,
        report: &PhaseReport,
        at: DateTime<Utc>,
    ) -> Result<Applied, TransitionRejected> {
        let existing = self
            .phases
            .iter()
            .rposition(|entry| entry.phase == report.phase);

        if self.status.is_terminal() {
            return match existing.map(|idx| self.phases[idx].status) {
                Some(status) if status == report.status => Ok(Applied::Unchanged),
                _ => Err(TransitionRejected {
                    reason: format!(
                        "record is already {:?}; phase '{}' cannot move to {:?}",
                        self.status, report.phase, report.status
                    ),
                }),
            };
        }

        match existing {
            Some(idx) => {
                let entry = &mut self.phases[idx];
                if entry.status == report.status {
                    let promotes = report.is_final && report.status.is_terminal();
                    if !promotes {
                        return Ok(Applied::Unchanged);
                    }
                } else if !entry.is_open() {
                    return Err(TransitionRejected {
                        reason: format!(
                            "phase '{}' already ended as {:?}; refusing {:?}",
                            report.phase, entry.status, report.status
                        ),
                    });
                } else {
                    entry.status = report.status;
                    entry.ended_at = Some(at.max(entry.started_at));
                }
            }
            None => self.phases.push(PhaseEntry::open(report, at)),
        }

        self.current_phase = Some(report.phase.clone());
        self.status = if report.is_final && report.status.is_terminal() {
            report.status.into()
        } else {
            RecordStatus::InProgress
        };
        self.touch(at);
        Ok(Applied::Changed)
    }

    /// Advance `updated_at`, never moving it backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}
