use crate::error::{WorkloadError, WorkloadResult};
use crate::models::{Band, Breakdown, Teacher, TeacherLoad, WorkloadSummary};
use crate::settings::{validate_base_hours, Thresholds, WorkloadSettings, MAX_WEEKLY_HOURS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryOrder {
    /// Keep directory order.
    #[default]
    Input,
    /// Highest load first, ties in directory order.
    LoadDescending,
}

/// Per-category percentages are rounded to one decimal. The total is
/// computed from the summed hours and rounded once to an integer, so it can
/// differ from the sum of the rounded categories by less than one point.
pub fn compute_breakdown(teacher: &Teacher, base_hours: f64) -> WorkloadResult<Breakdown> {
    validate_base_hours(base_hours)?;
    validate_hours(teacher)?;

    let percent = |hours: f64| 100.0 * hours / base_hours;

    Ok(Breakdown {
        teaching_pct: round1(percent(teacher.teaching_hours)),
        substitute_pct: round1(percent(teacher.substitute_hours)),
        other_pct: round1(percent(teacher.other_hours)),
        total_pct: percent(teacher.total_hours()).round() as i64,
    })
}

/// `> overload` is Overload and `< available` is Available; both boundary
/// values themselves are Normal.
pub fn classify(total_pct: f64, thresholds: &Thresholds) -> Band {
    if total_pct > thresholds.overload() {
        Band::Overload
    } else if total_pct < thresholds.available() {
        Band::Available
    } else {
        Band::Normal
    }
}

pub fn teacher_load(teacher: &Teacher, settings: &WorkloadSettings) -> WorkloadResult<TeacherLoad> {
    let breakdown = compute_breakdown(teacher, settings.base_hours())?;
    Ok(TeacherLoad {
        teacher_id: teacher.id.clone(),
        teacher_name: teacher.name.clone(),
        band: classify(breakdown.total_pct as f64, &settings.thresholds()),
        breakdown,
    })
}

pub fn summarize(
    teachers: &[Teacher],
    settings: &WorkloadSettings,
    order: SummaryOrder,
) -> WorkloadResult<WorkloadSummary> {
    if teachers.is_empty() {
        return Err(WorkloadError::EmptyInput);
    }

    let mut loads = teachers
        .iter()
        .map(|teacher| teacher_load(teacher, settings))
        .collect::<WorkloadResult<Vec<_>>>()?;

    let total: f64 = loads.iter().map(|load| load.breakdown.total_pct as f64).sum();
    let mean_load = (total / loads.len() as f64).round() as i64;

    if order == SummaryOrder::LoadDescending {
        sort_by_load_descending(&mut loads);
    }

    let teacher_count = loads.len();
    let normal_count = loads.iter().filter(|load| load.band == Band::Normal).count();
    let (overloaded, rest): (Vec<_>, Vec<_>) = loads
        .into_iter()
        .partition(|load| load.band == Band::Overload);
    let available = rest
        .into_iter()
        .filter(|load| load.band == Band::Available)
        .collect();

    Ok(WorkloadSummary {
        teacher_count,
        mean_load,
        normal_count,
        overloaded,
        available,
    })
}

pub fn rank_by_load(
    teachers: &[Teacher],
    settings: &WorkloadSettings,
) -> WorkloadResult<Vec<TeacherLoad>> {
    let mut loads = teachers
        .iter()
        .map(|teacher| teacher_load(teacher, settings))
        .collect::<WorkloadResult<Vec<_>>>()?;
    sort_by_load_descending(&mut loads);
    Ok(loads)
}

// `sort_by` is stable, which keeps tied teachers in directory order.
fn sort_by_load_descending(loads: &mut [TeacherLoad]) {
    loads.sort_by(|a, b| b.breakdown.total_pct.cmp(&a.breakdown.total_pct));
}

/// Each allocation must be finite, non-negative and at most
/// `MAX_WEEKLY_HOURS`, and so must their sum.
pub fn validate_hours(teacher: &Teacher) -> WorkloadResult<()> {
    let fields = [
        ("teaching_hours", teacher.teaching_hours),
        ("substitute_hours", teacher.substitute_hours),
        ("other_hours", teacher.other_hours),
        ("total_hours", teacher.total_hours()),
    ];
    for (field, value) in fields {
        if !value.is_finite() || !(0.0..=MAX_WEEKLY_HOURS).contains(&value) {
            return Err(WorkloadError::InvalidHours {
                teacher_id: teacher.id.clone(),
                field,
                value,
            });
        }
    }
    Ok(())
}

/// Half away from zero, one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
