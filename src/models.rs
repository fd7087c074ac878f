use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkloadError, WorkloadResult};
use crate::settings::MAX_WEEKLY_HOURS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    Kindergarten,
    #[serde(alias = "primary-low")]
    PrimaryLow,
    #[serde(alias = "primary-high")]
    PrimaryHigh,
    #[serde(alias = "secondary-low")]
    SecondaryLow,
    #[serde(alias = "secondary-high")]
    SecondaryHigh,
}

impl GradeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeLevel::Kindergarten => "kindergarten",
            GradeLevel::PrimaryLow => "primary_low",
            GradeLevel::PrimaryHigh => "primary_high",
            GradeLevel::SecondaryLow => "secondary_low",
            GradeLevel::SecondaryHigh => "secondary_high",
        }
    }
}

impl FromStr for GradeLevel {
    type Err = WorkloadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "kindergarten" => Ok(GradeLevel::Kindergarten),
            "primary_low" => Ok(GradeLevel::PrimaryLow),
            "primary_high" => Ok(GradeLevel::PrimaryHigh),
            "secondary_low" => Ok(GradeLevel::SecondaryLow),
            "secondary_high" => Ok(GradeLevel::SecondaryHigh),
            _ => Err(WorkloadError::UnknownGradeLevel(value.to_string())),
        }
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherStatus {
    #[default]
    Active,
    Inactive,
}

impl TeacherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeacherStatus::Active => "active",
            TeacherStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for TeacherStatus {
    type Err = WorkloadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TeacherStatus::Active),
            "inactive" => Ok(TeacherStatus::Inactive),
            _ => Err(WorkloadError::UnknownStatus(value.to_string())),
        }
    }
}

/// A directory entry. There is no stored workload percentage; it is derived
/// from the hours and the current base hours on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub grade_level: GradeLevel,
    pub teaching_hours: f64,
    pub substitute_hours: f64,
    pub other_hours: f64,
    pub status: TeacherStatus,
    pub email: Option<String>,
}

impl Teacher {
    pub fn total_hours(&self) -> f64 {
        self.teaching_hours + self.substitute_hours + self.other_hours
    }

    pub fn is_active(&self) -> bool {
        self.status == TeacherStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakdown {
    pub teaching_pct: f64,
    pub substitute_pct: f64,
    pub other_pct: f64,
    pub total_pct: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Overload,
    Normal,
    Available,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Band::Overload => "overload",
            Band::Normal => "normal",
            Band::Available => "available",
        };
        f.write_str(label)
    }
}

/// Owned per-teacher result row handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherLoad {
    pub teacher_id: String,
    pub teacher_name: String,
    pub breakdown: Breakdown,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSummary {
    pub teacher_count: usize,
    pub mean_load: i64,
    pub normal_count: usize,
    pub overloaded: Vec<TeacherLoad>,
    pub available: Vec<TeacherLoad>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl SubstitutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubstitutionStatus::Pending => "pending",
            SubstitutionStatus::Approved => "approved",
            SubstitutionStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for SubstitutionStatus {
    type Err = WorkloadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SubstitutionStatus::Pending),
            "approved" => Ok(SubstitutionStatus::Approved),
            "rejected" => Ok(SubstitutionStatus::Rejected),
            _ => Err(WorkloadError::UnknownSubstitutionStatus(value.to_string())),
        }
    }
}

impl fmt::Display for SubstitutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A substitution request. Hours are credited to the substitute only when
/// the request moves from pending to approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstitutionRecord {
    pub id: Uuid,
    pub absent_teacher_id: String,
    pub substitute_teacher_id: String,
    pub taught_on: NaiveDate,
    pub period: String,
    pub subject: String,
    pub hours: f64,
    pub status: SubstitutionStatus,
    pub requested_by: String,
    pub reason: Option<String>,
}

impl SubstitutionRecord {
    pub fn validate(&self) -> WorkloadResult<()> {
        if !self.hours.is_finite() || self.hours <= 0.0 || self.hours > MAX_WEEKLY_HOURS {
            return Err(WorkloadError::InvalidRequest(format!(
                "hours must be in (0, {MAX_WEEKLY_HOURS}], got {}",
                self.hours
            )));
        }
        if self.absent_teacher_id == self.substitute_teacher_id {
            return Err(WorkloadError::InvalidRequest(
                "a teacher cannot substitute for themselves".to_string(),
            ));
        }
        if self.requested_by.trim().is_empty() {
            return Err(WorkloadError::InvalidRequest(
                "requester must be named".to_string(),
            ));
        }
        Ok(())
    }

    /// Moves a pending request to `decision`. Decided requests are final.
    pub fn decide(&self, decision: SubstitutionStatus) -> WorkloadResult<SubstitutionStatus> {
        match (self.status, decision) {
            (SubstitutionStatus::Pending, SubstitutionStatus::Approved | SubstitutionStatus::Rejected) => {
                Ok(decision)
            }
            (SubstitutionStatus::Pending, SubstitutionStatus::Pending) => Err(
                WorkloadError::InvalidRequest("a decision must approve or reject".to_string()),
            ),
            (current, _) => Err(WorkloadError::AlreadyDecided {
                id: self.id.to_string(),
                status: current.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    GradeLevel,
    WorkloadBalance,
    PeriodSwap,
    SubjectMatch,
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::GradeLevel => "grade_level",
            RuleType::WorkloadBalance => "workload_balance",
            RuleType::PeriodSwap => "period_swap",
            RuleType::SubjectMatch => "subject_match",
            RuleType::Custom => "custom",
        }
    }
}

impl FromStr for RuleType {
    type Err = WorkloadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "grade_level" => Ok(RuleType::GradeLevel),
            "workload_balance" => Ok(RuleType::WorkloadBalance),
            "period_swap" => Ok(RuleType::PeriodSwap),
            "subject_match" => Ok(RuleType::SubjectMatch),
            "custom" => Ok(RuleType::Custom),
            _ => Err(WorkloadError::UnknownRuleType(value.to_string())),
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored substitution rule. Lower `priority` numbers apply first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub rule_type: RuleType,
    pub priority: i32,
    pub weight: i32,
    pub active: bool,
    pub max_workload: Option<f64>,
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub teacher_id: String,
    pub teacher_name: String,
    pub subject: String,
    pub grade_level: GradeLevel,
    pub breakdown: Breakdown,
    pub band: Band,
    pub subject_match: bool,
    pub grade_match: bool,
    pub last_substituted_on: Option<NaiveDate>,
}
