use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::WorkloadResult;
use crate::models::{Band, Candidate, Rule, RuleType, Teacher};
use crate::settings::WorkloadSettings;
use crate::workload::teacher_load;

/// Cap from a workload-balance rule: candidates above `max_load + tolerance`
/// are not offered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadCap {
    pub max_load: f64,
    pub tolerance: f64,
}

impl Default for LoadCap {
    fn default() -> Self {
        Self {
            max_load: 75.0,
            tolerance: 10.0,
        }
    }
}

impl LoadCap {
    /// Cap from the highest-priority active workload-balance rule. Missing
    /// limits fall back to the defaults of 75% plus 10 points.
    pub fn from_rules(rules: &[Rule]) -> Option<Self> {
        let rule = rules
            .iter()
            .filter(|rule| rule.active && rule.rule_type == RuleType::WorkloadBalance)
            .min_by_key(|rule| rule.priority)?;
        let defaults = LoadCap::default();
        Some(LoadCap {
            max_load: rule.max_workload.unwrap_or(defaults.max_load),
            tolerance: rule.tolerance.unwrap_or(defaults.tolerance),
        })
    }

    fn ceiling(&self) -> f64 {
        self.max_load + self.tolerance
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request<'a> {
    /// Subject to cover; defaults to the absent teacher's subject.
    pub subject: Option<&'a str>,
    pub cap: Option<LoadCap>,
}

/// Ranks directory teachers who could cover for `absent`.
///
/// Order: subject match, grade-level match, lower load, longest since last
/// substitution (never substituted first), then directory order.
pub fn recommend(
    absent: &Teacher,
    directory: &[Teacher],
    request: &Request<'_>,
    last_substituted: &HashMap<String, NaiveDate>,
    settings: &WorkloadSettings,
) -> WorkloadResult<Vec<Candidate>> {
    let subject = request.subject.unwrap_or(absent.subject.as_str());
    let mut candidates = Vec::new();

    for teacher in directory {
        if teacher.id == absent.id || !teacher.is_active() {
            continue;
        }

        let load = teacher_load(teacher, settings)?;
        if load.band == Band::Overload {
            continue;
        }
        if let Some(cap) = request.cap {
            if load.breakdown.total_pct as f64 > cap.ceiling() {
                continue;
            }
        }

        candidates.push(Candidate {
            teacher_id: load.teacher_id,
            teacher_name: load.teacher_name,
            subject: teacher.subject.clone(),
            grade_level: teacher.grade_level,
            breakdown: load.breakdown,
            band: load.band,
            subject_match: teacher.subject.trim().eq_ignore_ascii_case(subject.trim()),
            grade_match: teacher.grade_level == absent.grade_level,
            last_substituted_on: last_substituted.get(&teacher.id).copied(),
        });
    }

    candidates.sort_by(compare_candidates);
    Ok(candidates)
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.subject_match
        .cmp(&a.subject_match)
        .then(b.grade_match.cmp(&a.grade_match))
        .then(a.breakdown.total_pct.cmp(&b.breakdown.total_pct))
        // `None < Some(_)`, so teachers never used as substitutes lead.
        .then(a.last_substituted_on.cmp(&b.last_substituted_on))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeLevel, TeacherStatus};
    use crate::workload::tests::teacher;

    fn with(id: &str, subject: &str, grade: GradeLevel, teaching: f64) -> Teacher {
        Teacher {
            subject: subject.to_string(),
            grade_level: grade,
            ..teacher(id, teaching, 0.0, 0.0)
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.teacher_id.as_str()).collect()
    }

    #[test]
    fn prefers_subject_then_grade_then_load() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let directory = vec![
            absent.clone(),
            with("T002", "Thai", GradeLevel::SecondaryLow, 4.0),
            with("T003", "Science", GradeLevel::PrimaryHigh, 6.0),
            with("T004", "Science", GradeLevel::SecondaryLow, 14.0),
            with("T005", "Science", GradeLevel::SecondaryLow, 8.0),
        ];

        let ranked = recommend(
            &absent,
            &directory,
            &Request::default(),
            &HashMap::new(),
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T005", "T004", "T003", "T002"]);
        assert!(ranked[0].subject_match && ranked[0].grade_match);
        assert!(!ranked[3].subject_match);
    }

    #[test]
    fn excludes_absent_inactive_and_overloaded() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let mut inactive = with("T002", "Science", GradeLevel::SecondaryLow, 2.0);
        inactive.status = TeacherStatus::Inactive;
        let directory = vec![
            absent.clone(),
            inactive,
            with("T003", "Science", GradeLevel::SecondaryLow, 17.0), // 85%
            with("T004", "Music", GradeLevel::PrimaryLow, 10.0),
        ];

        let ranked = recommend(
            &absent,
            &directory,
            &Request::default(),
            &HashMap::new(),
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T004"]);
    }

    #[test]
    fn load_cap_trims_busy_candidates() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let directory = vec![
            with("T002", "Science", GradeLevel::SecondaryLow, 15.0), // 75%
            with("T003", "Science", GradeLevel::SecondaryLow, 11.0), // 55%
        ];
        let request = Request {
            subject: None,
            cap: Some(LoadCap {
                max_load: 60.0,
                tolerance: 5.0,
            }),
        };

        let ranked = recommend(
            &absent,
            &directory,
            &request,
            &HashMap::new(),
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T003"]);
    }

    fn balance_rule(id: &str, priority: i32, active: bool, max: Option<f64>) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("balance {id}"),
            rule_type: RuleType::WorkloadBalance,
            priority,
            weight: 5,
            active,
            max_workload: max,
            tolerance: Some(5.0),
        }
    }

    #[test]
    fn cap_comes_from_active_balance_rule() {
        let grade_rule = Rule {
            id: "rule-1".to_string(),
            name: "same grade".to_string(),
            rule_type: RuleType::GradeLevel,
            priority: 1,
            weight: 8,
            active: true,
            max_workload: Some(10.0),
            tolerance: None,
        };
        let rules = vec![
            grade_rule,
            balance_rule("rule-2", 3, true, Some(70.0)),
            balance_rule("rule-4", 2, false, Some(40.0)),
            balance_rule("rule-5", 4, true, Some(60.0)),
        ];

        assert_eq!(
            LoadCap::from_rules(&rules),
            Some(LoadCap {
                max_load: 70.0,
                tolerance: 5.0
            })
        );
    }

    #[test]
    fn cap_defaults_fill_missing_limits() {
        let mut rule = balance_rule("rule-2", 3, true, None);
        rule.tolerance = None;
        assert_eq!(LoadCap::from_rules(&[rule]), Some(LoadCap::default()));
    }

    #[test]
    fn no_cap_when_balance_rules_are_disabled() {
        let rules = vec![balance_rule("rule-2", 3, false, Some(70.0))];
        assert_eq!(LoadCap::from_rules(&rules), None);
        assert_eq!(LoadCap::from_rules(&[]), None);
    }

    #[test]
    fn stored_rule_cap_filters_candidates() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let directory = vec![
            with("T002", "Science", GradeLevel::SecondaryLow, 16.0), // 80%
            with("T003", "Science", GradeLevel::SecondaryLow, 15.0), // 75%
        ];
        let request = Request {
            subject: None,
            cap: LoadCap::from_rules(&[balance_rule("rule-2", 3, true, Some(70.0))]),
        };

        let ranked = recommend(
            &absent,
            &directory,
            &request,
            &HashMap::new(),
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T003"]);
    }

    #[test]
    fn least_recently_used_breaks_load_ties() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let directory = vec![
            with("T002", "Science", GradeLevel::SecondaryLow, 10.0),
            with("T003", "Science", GradeLevel::SecondaryLow, 10.0),
            with("T004", "Science", GradeLevel::SecondaryLow, 10.0),
            with("T005", "Science", GradeLevel::SecondaryLow, 10.0),
        ];
        let mut history = HashMap::new();
        history.insert("T002".to_string(), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        history.insert("T003".to_string(), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());

        let ranked = recommend(
            &absent,
            &directory,
            &Request::default(),
            &history,
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T004", "T005", "T003", "T002"]);
        assert_eq!(ranked[3].last_substituted_on, NaiveDate::from_ymd_opt(2026, 3, 10));
    }

    #[test]
    fn explicit_subject_overrides_absent_subject() {
        let absent = with("T001", "Science", GradeLevel::SecondaryLow, 12.0);
        let directory = vec![
            with("T002", "Science", GradeLevel::SecondaryLow, 4.0),
            with("T003", "music", GradeLevel::SecondaryLow, 8.0),
        ];
        let request = Request {
            subject: Some("Music"),
            cap: None,
        };

        let ranked = recommend(
            &absent,
            &directory,
            &request,
            &HashMap::new(),
            &WorkloadSettings::default(),
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec!["T003", "T002"]);
    }
}
