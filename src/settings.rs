use serde::{Deserialize, Serialize};

use crate::error::{WorkloadError, WorkloadResult};

pub const DEFAULT_BASE_HOURS: f64 = 20.0;
pub const DEFAULT_OVERLOAD_THRESHOLD: f64 = 80.0;
pub const DEFAULT_AVAILABLE_THRESHOLD: f64 = 50.0;

/// Hours in a week. No single allocation, and no teacher's total, may exceed it.
pub const MAX_WEEKLY_HOURS: f64 = 168.0;

/// Band boundaries in load percent. Construction enforces
/// `available < overload`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct Thresholds {
    available: f64,
    overload: f64,
}

#[derive(Deserialize)]
struct RawThresholds {
    available: f64,
    overload: f64,
}

impl TryFrom<RawThresholds> for Thresholds {
    type Error = WorkloadError;

    fn try_from(raw: RawThresholds) -> WorkloadResult<Self> {
        Thresholds::new(raw.available, raw.overload)
    }
}

impl Thresholds {
    pub fn new(available: f64, overload: f64) -> WorkloadResult<Self> {
        if !available.is_finite() || !overload.is_finite() {
            return Err(WorkloadError::InvalidConfiguration(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        if available >= overload {
            return Err(WorkloadError::InvalidConfiguration(format!(
                "available threshold ({available}) must be below overload threshold ({overload})"
            )));
        }
        Ok(Self { available, overload })
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn overload(&self) -> f64 {
        self.overload
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            available: DEFAULT_AVAILABLE_THRESHOLD,
            overload: DEFAULT_OVERLOAD_THRESHOLD,
        }
    }
}

/// Organization-wide workload configuration, passed into every engine call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSettings")]
pub struct WorkloadSettings {
    base_hours: f64,
    thresholds: Thresholds,
}

#[derive(Deserialize)]
struct RawSettings {
    base_hours: f64,
    thresholds: Thresholds,
}

impl TryFrom<RawSettings> for WorkloadSettings {
    type Error = WorkloadError;

    fn try_from(raw: RawSettings) -> WorkloadResult<Self> {
        WorkloadSettings::new(raw.base_hours, raw.thresholds)
    }
}

impl WorkloadSettings {
    pub fn new(base_hours: f64, thresholds: Thresholds) -> WorkloadResult<Self> {
        validate_base_hours(base_hours)?;
        Ok(Self {
            base_hours,
            thresholds,
        })
    }

    pub fn base_hours(&self) -> f64 {
        self.base_hours
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Returns a copy with the given fields replaced, re-validated as a whole.
    pub fn with_overrides(
        &self,
        base_hours: Option<f64>,
        available: Option<f64>,
        overload: Option<f64>,
    ) -> WorkloadResult<Self> {
        let thresholds = Thresholds::new(
            available.unwrap_or(self.thresholds.available),
            overload.unwrap_or(self.thresholds.overload),
        )?;
        Self::new(base_hours.unwrap_or(self.base_hours), thresholds)
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            base_hours: DEFAULT_BASE_HOURS,
            thresholds: Thresholds::default(),
        }
    }
}

pub fn validate_base_hours(base_hours: f64) -> WorkloadResult<()> {
    if base_hours.is_finite() && base_hours > 0.0 {
        Ok(())
    } else {
        Err(WorkloadError::InvalidConfiguration(format!(
            "base hours must be positive, got {base_hours}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_school_policy() {
        let settings = WorkloadSettings::default();
        assert_eq!(settings.base_hours(), 20.0);
        assert_eq!(settings.thresholds().available(), 50.0);
        assert_eq!(settings.thresholds().overload(), 80.0);
    }

    #[test]
    fn rejects_non_positive_base_hours() {
        for bad in [0.0, -4.0, f64::NAN, f64::INFINITY] {
            let result = WorkloadSettings::new(bad, Thresholds::default());
            assert!(matches!(result, Err(WorkloadError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn rejects_inverted_thresholds() {
        assert!(Thresholds::new(80.0, 50.0).is_err());
        assert!(Thresholds::new(60.0, 60.0).is_err());
        assert!(Thresholds::new(40.0, 90.0).is_ok());
    }

    #[test]
    fn overrides_are_validated_together() {
        let settings = WorkloadSettings::default();
        let updated = settings.with_overrides(Some(25.0), None, Some(90.0)).unwrap();
        assert_eq!(updated.base_hours(), 25.0);
        assert_eq!(updated.thresholds().overload(), 90.0);
        assert_eq!(updated.thresholds().available(), 50.0);

        assert!(settings.with_overrides(None, Some(85.0), None).is_err());
        assert!(settings.with_overrides(Some(0.0), None, None).is_err());
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let ok: WorkloadSettings = serde_json::from_str(
            r#"{"base_hours": 18.0, "thresholds": {"available": 40.0, "overload": 75.0}}"#,
        )
        .unwrap();
        assert_eq!(ok.base_hours(), 18.0);

        let bad = serde_json::from_str::<WorkloadSettings>(
            r#"{"base_hours": 0.0, "thresholds": {"available": 40.0, "overload": 75.0}}"#,
        );
        assert!(bad.is_err());
    }
}
