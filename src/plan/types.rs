use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    Study,
    Break,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Study => "Study",
            PhaseKind::Break => "Break",
        }
    }
}

/// One contiguous study or break interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub kind: PhaseKind,
    pub duration_minutes: u32,
    pub index: usize,
    /// Shortened trailing phase that used up leftover time.
    pub partial: bool,
}

impl Phase {
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }
}

/// Ordered, immutable phase schedule for one session.
///
/// Only [`generate_plan`](super::generate_plan) builds these, so a plan in
/// hand is always non-empty with contiguous indices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    total_minutes: u32,
    phases: Vec<Phase>,
}

impl SessionPlan {
    pub(super) fn new(total_minutes: u32, phases: Vec<Phase>) -> Self {
        Self {
            total_minutes,
            phases,
        }
    }

    /// Requested total, which may differ from [`planned_minutes`](Self::planned_minutes)
    /// only by rounding.
    pub fn total_minutes(&self) -> u32 {
        self.total_minutes
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn get(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn planned_minutes(&self) -> u32 {
        self.phases.iter().map(|p| p.duration_minutes).sum()
    }

    pub fn minutes_of(&self, kind: PhaseKind) -> u32 {
        self.phases
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.duration_minutes)
            .sum()
    }

    pub fn study_minutes(&self) -> u32 {
        self.minutes_of(PhaseKind::Study)
    }

    pub fn break_minutes(&self) -> u32 {
        self.minutes_of(PhaseKind::Break)
    }
}
