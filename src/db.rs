use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{GradeLevel, Rule, SubstitutionRecord, SubstitutionStatus, Teacher, TeacherStatus};
use crate::workload;
use crate::settings::{Thresholds, WorkloadSettings};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teachers = vec![
        ("T001", "Kosol Punoi", "Science", GradeLevel::SecondaryLow, 12.0, 2.0, 1.0),
        ("T002", "Suchada Boonlert", "Thai", GradeLevel::PrimaryHigh, 8.0, 0.0, 2.0),
        ("T003", "Chaowalit Totob", "Physical Education", GradeLevel::SecondaryLow, 10.0, 4.0, 0.0),
        ("T004", "Pitak Sumon", "Music", GradeLevel::PrimaryLow, 9.0, 1.0, 1.0),
        ("T005", "Muthita Srikram", "Social Studies", GradeLevel::SecondaryHigh, 14.0, 2.0, 1.0),
        ("T006", "Suphorada Lamomsai", "Computer", GradeLevel::PrimaryHigh, 6.0, 1.0, 1.0),
    ];

    for (id, name, subject, grade_level, teaching, substitute, other) in teachers {
        upsert_teacher(
            pool,
            &Teacher {
                id: id.to_string(),
                name: name.to_string(),
                subject: subject.to_string(),
                grade_level,
                teaching_hours: teaching,
                substitute_hours: substitute,
                other_hours: other,
                status: TeacherStatus::Active,
                email: Some(format!("{}@school.ac.th", id.to_lowercase())),
            },
        )
        .await?;
    }

    save_settings(pool, &WorkloadSettings::default()).await?;
    info!("seeded demo directory");
    Ok(())
}

pub async fn load_settings(pool: &PgPool) -> anyhow::Result<WorkloadSettings> {
    let row = sqlx::query(
        "SELECT base_hours, available_threshold, overload_threshold \
         FROM substitute_workload.workload_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        debug!("no stored workload settings, using defaults");
        return Ok(WorkloadSettings::default());
    };

    let thresholds = Thresholds::new(row.get("available_threshold"), row.get("overload_threshold"))
        .context("stored thresholds are invalid")?;
    let settings = WorkloadSettings::new(row.get("base_hours"), thresholds)
        .context("stored base hours are invalid")?;
    Ok(settings)
}

pub async fn save_settings(pool: &PgPool, settings: &WorkloadSettings) -> anyhow::Result<()> {
    let thresholds = settings.thresholds();
    sqlx::query(
        r#"
        INSERT INTO substitute_workload.workload_settings
        (id, base_hours, available_threshold, overload_threshold)
        VALUES (1, $1, $2, $3)
        ON CONFLICT (id) DO UPDATE
        SET base_hours = EXCLUDED.base_hours,
            available_threshold = EXCLUDED.available_threshold,
            overload_threshold = EXCLUDED.overload_threshold,
            updated_at = now()
        "#,
    )
    .bind(settings.base_hours())
    .bind(thresholds.available())
    .bind(thresholds.overload())
    .execute(pool)
    .await?;
    info!(
        base_hours = settings.base_hours(),
        available = thresholds.available(),
        overload = thresholds.overload(),
        "saved workload settings"
    );
    Ok(())
}

pub async fn fetch_teachers(pool: &PgPool) -> anyhow::Result<Vec<Teacher>> {
    let rows = sqlx::query(
        "SELECT id, full_name, subject, grade_level, teaching_hours, substitute_hours, \
         other_hours, status, email \
         FROM substitute_workload.teachers ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut teachers = Vec::with_capacity(rows.len());
    for row in rows {
        teachers.push(teacher_from_row(&row)?);
    }
    debug!(count = teachers.len(), "fetched teacher directory");
    Ok(teachers)
}

fn teacher_from_row(row: &PgRow) -> anyhow::Result<Teacher> {
    let id: String = row.get("id");
    let grade_level: String = row.get("grade_level");
    let status: String = row.get("status");

    Ok(Teacher {
        grade_level: grade_level
            .parse()
            .with_context(|| format!("teacher {id} has a bad grade level"))?,
        status: status
            .parse()
            .with_context(|| format!("teacher {id} has a bad status"))?,
        name: row.get("full_name"),
        subject: row.get("subject"),
        teaching_hours: row.get("teaching_hours"),
        substitute_hours: row.get("substitute_hours"),
        other_hours: row.get("other_hours"),
        email: row.get("email"),
        id,
    })
}

pub async fn upsert_teacher(pool: &PgPool, teacher: &Teacher) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO substitute_workload.teachers
        (id, full_name, subject, grade_level, teaching_hours, substitute_hours, other_hours, status, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            subject = EXCLUDED.subject,
            grade_level = EXCLUDED.grade_level,
            teaching_hours = EXCLUDED.teaching_hours,
            substitute_hours = EXCLUDED.substitute_hours,
            other_hours = EXCLUDED.other_hours,
            status = EXCLUDED.status,
            email = EXCLUDED.email,
            updated_at = now()
        "#,
    )
    .bind(&teacher.id)
    .bind(&teacher.name)
    .bind(&teacher.subject)
    .bind(teacher.grade_level.as_str())
    .bind(teacher.teaching_hours)
    .bind(teacher.substitute_hours)
    .bind(teacher.other_hours)
    .bind(teacher.status.as_str())
    .bind(&teacher.email)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug)]
pub enum Removal {
    Removed,
    NotFound,
    /// The teacher appears in this many substitution records.
    HasHistory(i64),
}

pub async fn remove_teacher(pool: &PgPool, id: &str) -> anyhow::Result<Removal> {
    let mut tx = pool.begin().await?;

    let history: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM substitute_workload.substitutions \
         WHERE absent_teacher_id = $1 OR substitute_teacher_id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?
    .get("n");

    if history > 0 {
        return Ok(Removal::HasHistory(history));
    }

    let result = sqlx::query("DELETE FROM substitute_workload.teachers WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if result.rows_affected() > 0 {
        info!(teacher = id, "removed teacher");
        Ok(Removal::Removed)
    } else {
        Ok(Removal::NotFound)
    }
}

async fn teacher_exists(conn: &mut sqlx::PgConnection, id: &str) -> anyhow::Result<bool> {
    let exists: bool =
        sqlx::query("SELECT EXISTS (SELECT 1 FROM substitute_workload.teachers WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(conn)
            .await?
            .get("found");
    Ok(exists)
}

/// Stores a pending request. No hours are credited until it is approved.
pub async fn request_substitution(pool: &PgPool, record: &SubstitutionRecord) -> anyhow::Result<()> {
    record.validate()?;

    let mut tx = pool.begin().await?;
    for (role, id) in [
        ("absent", &record.absent_teacher_id),
        ("substitute", &record.substitute_teacher_id),
    ] {
        if !teacher_exists(&mut tx, id).await? {
            bail!("unknown {role} teacher {id}");
        }
    }

    sqlx::query(
        r#"
        INSERT INTO substitute_workload.substitutions
        (id, absent_teacher_id, substitute_teacher_id, taught_on, period, subject, hours,
         status, requested_by, reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(record.id)
    .bind(&record.absent_teacher_id)
    .bind(&record.substitute_teacher_id)
    .bind(record.taught_on)
    .bind(&record.period)
    .bind(&record.subject)
    .bind(record.hours)
    .bind(record.status.as_str())
    .bind(&record.requested_by)
    .bind(&record.reason)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        id = %record.id,
        substitute = %record.substitute_teacher_id,
        absent = %record.absent_teacher_id,
        "substitution requested"
    );
    Ok(())
}

/// Approves or rejects a pending request. Approval credits the hours to the
/// substitute in the same transaction.
pub async fn decide_substitution(
    pool: &PgPool,
    id: Uuid,
    decision: SubstitutionStatus,
    reason: Option<&str>,
) -> anyhow::Result<SubstitutionRecord> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!("{SUBSTITUTION_COLUMNS} WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        bail!("no substitution request {id}");
    };
    let mut record = substitution_from_row(&row)?;
    record.status = record.decide(decision)?;
    if let Some(reason) = reason {
        record.reason = Some(reason.to_string());
    }

    sqlx::query(
        r#"
        UPDATE substitute_workload.substitutions
        SET status = $2, reason = $3, decided_at = now()
        WHERE id = $1
        "#,
    )
    .bind(record.id)
    .bind(record.status.as_str())
    .bind(&record.reason)
    .execute(&mut *tx)
    .await?;

    if record.status == SubstitutionStatus::Approved {
        let updated = sqlx::query(
            r#"
            UPDATE substitute_workload.teachers
            SET substitute_hours = substitute_hours + $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(&record.substitute_teacher_id)
        .bind(record.hours)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            bail!("unknown substitute teacher {}", record.substitute_teacher_id);
        }
    }

    tx.commit().await?;
    info!(id = %record.id, status = %record.status, hours = record.hours, "substitution decided");
    Ok(record)
}

const SUBSTITUTION_COLUMNS: &str = "SELECT id, absent_teacher_id, substitute_teacher_id, taught_on, \
     period, subject, hours, status, requested_by, reason \
     FROM substitute_workload.substitutions";

fn substitution_from_row(row: &PgRow) -> anyhow::Result<SubstitutionRecord> {
    let id: Uuid = row.get("id");
    let status: String = row.get("status");

    Ok(SubstitutionRecord {
        status: status
            .parse()
            .with_context(|| format!("substitution {id} has a bad status"))?,
        absent_teacher_id: row.get("absent_teacher_id"),
        substitute_teacher_id: row.get("substitute_teacher_id"),
        taught_on: row.get("taught_on"),
        period: row.get("period"),
        subject: row.get("subject"),
        hours: row.get("hours"),
        requested_by: row.get("requested_by"),
        reason: row.get("reason"),
        id,
    })
}

pub async fn fetch_substitutions(
    pool: &PgPool,
    status: Option<SubstitutionStatus>,
) -> anyhow::Result<Vec<SubstitutionRecord>> {
    let mut query = String::from(SUBSTITUTION_COLUMNS);
    if status.is_some() {
        query.push_str(" WHERE status = $1");
    }
    query.push_str(" ORDER BY requested_at, id");

    let mut rows = sqlx::query(&query);
    if let Some(status) = status {
        rows = rows.bind(status.as_str());
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        records.push(substitution_from_row(&row)?);
    }
    Ok(records)
}

/// Latest approved substitution date per substitute.
pub async fn fetch_last_substitutions(pool: &PgPool) -> anyhow::Result<HashMap<String, NaiveDate>> {
    let rows = sqlx::query(
        "SELECT substitute_teacher_id, MAX(taught_on) AS last_on \
         FROM substitute_workload.substitutions \
         WHERE status = 'approved' \
         GROUP BY substitute_teacher_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("substitute_teacher_id"), row.get("last_on")))
        .collect())
}

pub async fn fetch_rules(pool: &PgPool) -> anyhow::Result<Vec<Rule>> {
    let rows = sqlx::query(
        "SELECT id, name, rule_type, priority, weight, active, max_workload, tolerance \
         FROM substitute_workload.rules ORDER BY priority, id",
    )
    .fetch_all(pool)
    .await?;

    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let rule_type: String = row.get("rule_type");
        rules.push(Rule {
            rule_type: rule_type
                .parse()
                .with_context(|| format!("rule {id} has a bad type"))?,
            name: row.get("name"),
            priority: row.get("priority"),
            weight: row.get("weight"),
            active: row.get("active"),
            max_workload: row.get("max_workload"),
            tolerance: row.get("tolerance"),
            id,
        });
    }
    Ok(rules)
}

pub async fn set_rule_active(pool: &PgPool, id: &str, active: bool) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE substitute_workload.rules SET active = $2 WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        info!(rule = id, active, "rule toggled");
    }
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct CsvRow {
    id: String,
    name: String,
    subject: String,
    grade_level: String,
    teaching_hours: f64,
    #[serde(default)]
    substitute_hours: Option<f64>,
    #[serde(default)]
    other_hours: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl TryFrom<CsvRow> for Teacher {
    type Error = anyhow::Error;

    fn try_from(row: CsvRow) -> anyhow::Result<Self> {
        let status = match row.status.as_deref().map(str::trim) {
            None | Some("") => TeacherStatus::Active,
            Some(value) => value.parse()?,
        };
        let teacher = Teacher {
            grade_level: row.grade_level.parse()?,
            status,
            email: row.email.filter(|email| !email.trim().is_empty()),
            id: row.id,
            name: row.name,
            subject: row.subject,
            teaching_hours: row.teaching_hours,
            substitute_hours: row.substitute_hours.unwrap_or(0.0),
            other_hours: row.other_hours.unwrap_or(0.0),
        };
        workload::validate_hours(&teacher)?;
        Ok(teacher)
    }
}

pub(crate) fn read_csv<R: std::io::Read>(reader: R) -> anyhow::Result<Vec<Teacher>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut teachers = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        let teacher = Teacher::try_from(row).with_context(|| format!("invalid teacher at line {line}"))?;
        teachers.push(teacher);
    }

    Ok(teachers)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let teachers = read_csv(file)?;
    if teachers.is_empty() {
        warn!(path = %csv_path.display(), "CSV contained no teacher rows");
    }

    for teacher in teachers.iter() {
        upsert_teacher(pool, teacher).await?;
    }

    Ok(teachers.len())
}

pub struct NewSubstitution {
    pub absent_teacher_id: String,
    pub substitute_teacher_id: String,
    pub taught_on: NaiveDate,
    pub period: String,
    pub subject: String,
    pub hours: f64,
    pub requested_by: String,
    pub reason: Option<String>,
}

impl From<NewSubstitution> for SubstitutionRecord {
    fn from(new: NewSubstitution) -> Self {
        SubstitutionRecord {
            id: Uuid::new_v4(),
            absent_teacher_id: new.absent_teacher_id,
            substitute_teacher_id: new.substitute_teacher_id,
            taught_on: new.taught_on,
            period: new.period,
            subject: new.subject,
            hours: new.hours,
            status: SubstitutionStatus::Pending,
            requested_by: new.requested_by,
            reason: new.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_default_optional_columns() {
        let data = "\
id,name,subject,grade_level,teaching_hours,substitute_hours,other_hours,status,email
T001,Kosol Punoi,Science,secondary-low,12,2,1,active,kosol@school.ac.th
T002,Suchada Boonlert,Thai,primary_high,8,,,,
";
        let teachers = read_csv(data.as_bytes()).unwrap();
        assert_eq!(teachers.len(), 2);
        assert_eq!(teachers[0].grade_level, GradeLevel::SecondaryLow);
        assert_eq!(teachers[0].email.as_deref(), Some("kosol@school.ac.th"));
        assert_eq!(teachers[1].substitute_hours, 0.0);
        assert_eq!(teachers[1].status, TeacherStatus::Active);
        assert_eq!(teachers[1].email, None);
    }

    #[test]
    fn csv_rejects_negative_hours() {
        let data = "\
id,name,subject,grade_level,teaching_hours,substitute_hours,other_hours
T009,Negative,Art,kindergarten,-2,0,0
";
        let err = read_csv(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("teaching_hours"));
    }

    #[test]
    fn csv_rejects_hours_beyond_a_week() {
        let data = "\
id,name,subject,grade_level,teaching_hours,substitute_hours,other_hours
T011,Overbooked,Art,kindergarten,1e300,0,0
";
        let err = read_csv(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("teaching_hours"));
    }

    #[test]
    fn new_requests_start_pending() {
        let record = SubstitutionRecord::from(NewSubstitution {
            absent_teacher_id: "T001".to_string(),
            substitute_teacher_id: "T003".to_string(),
            taught_on: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            period: "3".to_string(),
            subject: "Science".to_string(),
            hours: 1.0,
            requested_by: "Head of Science".to_string(),
            reason: Some("sick leave".to_string()),
        });
        assert_eq!(record.status, SubstitutionStatus::Pending);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn substitution_history_is_not_cascaded_away() {
        let schema = include_str!("../migrations/0001_init.sql");
        assert!(!schema.contains("ON DELETE CASCADE"));
        assert_eq!(schema.matches("ON DELETE RESTRICT").count(), 2);
    }

    #[test]
    fn csv_rejects_unknown_grade() {
        let data = "\
id,name,subject,grade_level,teaching_hours
T010,Someone,Art,university,4
";
        let err = read_csv(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
