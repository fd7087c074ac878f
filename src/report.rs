use std::fmt::Write;

use crate::error::WorkloadResult;
use crate::models::{Teacher, TeacherLoad};
use crate::settings::WorkloadSettings;
use crate::workload::{self, SummaryOrder};

pub fn build_report(
    teachers: &[Teacher],
    settings: &WorkloadSettings,
    generated_on: chrono::NaiveDate,
) -> WorkloadResult<String> {
    let ranked = workload::rank_by_load(teachers, settings)?;
    let thresholds = settings.thresholds();

    let mut output = String::new();

    let _ = writeln!(output, "# Teacher Workload Report");
    let _ = writeln!(
        output,
        "Generated {} (base {} hours/week, overload above {}%, available below {}%)",
        generated_on,
        settings.base_hours(),
        thresholds.overload(),
        thresholds.available()
    );
    let _ = writeln!(output);

    if teachers.is_empty() {
        let _ = writeln!(output, "No teachers in the directory.");
        return Ok(output);
    }

    let summary = workload::summarize(teachers, settings, SummaryOrder::LoadDescending)?;

    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Teachers: {}", summary.teacher_count);
    let _ = writeln!(output, "- Average load: {}%", summary.mean_load);
    let _ = writeln!(
        output,
        "- Overloaded: {}, normal: {}, available: {}",
        summary.overloaded.len(),
        summary.normal_count,
        summary.available.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Load by Teacher");
    let _ = writeln!(output, "| Teacher | Teaching % | Substitute % | Other % | Total % | Band |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for load in ranked.iter() {
        let _ = writeln!(
            output,
            "| {} ({}) | {:.1} | {:.1} | {:.1} | {} | {} |",
            load.teacher_name,
            load.teacher_id,
            load.breakdown.teaching_pct,
            load.breakdown.substitute_pct,
            load.breakdown.other_pct,
            load.breakdown.total_pct,
            load.band
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overloaded Teachers");
    write_band(
        &mut output,
        &summary.overloaded,
        "No teacher above the overload threshold.",
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Available Teachers");
    write_band(
        &mut output,
        &summary.available,
        "No teacher below the available threshold.",
    );

    Ok(output)
}

fn write_band(output: &mut String, loads: &[TeacherLoad], empty_message: &str) {
    if loads.is_empty() {
        let _ = writeln!(output, "{empty_message}");
        return;
    }
    for load in loads {
        let _ = writeln!(
            output,
            "- {} ({}): {}%",
            load.teacher_name, load.teacher_id, load.breakdown.total_pct
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::tests::teacher;
    use chrono::NaiveDate;

    fn report_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn report_lists_bands_and_ranking() {
        let teachers = vec![
            teacher("T001", 12.0, 2.0, 1.0),
            teacher("T002", 10.0, 8.0, 0.0),
            teacher("T003", 6.0, 0.0, 2.0),
        ];
        let report = build_report(&teachers, &WorkloadSettings::default(), report_date()).unwrap();

        assert!(report.contains("base 20 hours/week"));
        assert!(report.contains("- Average load: 68%"));
        assert!(report.contains("- Overloaded: 1, normal: 1, available: 1"));
        assert!(report.contains("| Teacher T001 (T001) | 60.0 | 10.0 | 5.0 | 75 | normal |"));
        assert!(report.contains("- Teacher T002 (T002): 90%"));
        assert!(report.contains("- Teacher T003 (T003): 40%"));

        let first_row = report.find("| Teacher T002").unwrap();
        let second_row = report.find("| Teacher T001").unwrap();
        assert!(first_row < second_row);
    }

    #[test]
    fn report_notes_empty_bands() {
        let teachers = vec![teacher("T001", 12.0, 2.0, 1.0)];
        let report = build_report(&teachers, &WorkloadSettings::default(), report_date()).unwrap();
        assert!(report.contains("No teacher above the overload threshold."));
        assert!(report.contains("No teacher below the available threshold."));
    }

    #[test]
    fn report_handles_empty_directory() {
        let report = build_report(&[], &WorkloadSettings::default(), report_date()).unwrap();
        assert!(report.contains("No teachers in the directory."));
    }
}
