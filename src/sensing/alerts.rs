use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum AlertSeverity {
    Moderate,
    Severe,
    Critical,
}

impl AlertSeverity {
    pub fn message(&self) -> &'static str {
        match self {
            AlertSeverity::Moderate => "Are you still there? Please come back to your desk.",
            AlertSeverity::Severe => "You have been away for a while. Time to get back to studying!",
            AlertSeverity::Critical => "Still away! Return now or press \"I'm here\".",
        }
    }
}

/// One absence band: fires when `start <= absence < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertBand {
    pub start_secs: u64,
    /// `None` means open-ended.
    pub end_secs: Option<u64>,
    /// Repeatable bands fire on every qualifying sample.
    pub repeatable: bool,
    pub severity: AlertSeverity,
}

impl AlertBand {
    pub fn contains(&self, absence_secs: u64) -> bool {
        absence_secs >= self.start_secs && self.end_secs.map_or(true, |end| absence_secs < end)
    }
}

/// Bands are non-overlapping and ordered by `start_secs`.
pub const DEFAULT_ALERT_BANDS: [AlertBand; 3] = [
    AlertBand {
        start_secs: 5,
        end_secs: Some(8),
        repeatable: false,
        severity: AlertSeverity::Moderate,
    },
    AlertBand {
        start_secs: 10,
        end_secs: Some(13),
        repeatable: false,
        severity: AlertSeverity::Severe,
    },
    AlertBand {
        start_secs: 15,
        end_secs: None,
        repeatable: true,
        severity: AlertSeverity::Critical,
    },
];

/// Evaluates the band table once per sample for one absence streak.
#[derive(Debug, Clone)]
pub struct AlertTracker {
    bands: Vec<AlertBand>,
    fired: Vec<bool>,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_BANDS.to_vec())
    }
}

impl AlertTracker {
    pub fn new(bands: Vec<AlertBand>) -> Self {
        let fired = vec![false; bands.len()];
        Self { bands, fired }
    }

    /// Severity to raise for this sample, if any.
    pub fn evaluate(&mut self, absence_secs: u64) -> Option<AlertSeverity> {
        let (index, band) = self
            .bands
            .iter()
            .enumerate()
            .find(|(_, band)| band.contains(absence_secs))?;

        if band.repeatable {
            return Some(band.severity);
        }
        if self.fired[index] {
            return None;
        }
        self.fired[index] = true;
        Some(band.severity)
    }

    /// Presence came back; once-only bands may fire again next streak.
    pub fn reset(&mut self) {
        self.fired.iter_mut().for_each(|fired| *fired = false);
    }
}
