use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use uuid::Uuid;

mod db;
mod error;
mod logging;
mod models;
mod recommend;
mod report;
mod settings;
mod workload;

use models::{GradeLevel, SubstitutionRecord, SubstitutionStatus, Teacher, TeacherStatus};
use recommend::{LoadCap, Request};
use workload::SummaryOrder;

#[derive(Parser)]
#[command(name = "substitute-workload")]
#[command(about = "Teacher workload analysis and substitute planning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo teacher directory and default settings
    Seed,
    /// Import or update teachers from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show or change the workload settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Add, update or remove a teacher
    #[command(subcommand)]
    Teacher(TeacherCommand),
    /// Per-category load breakdown for each teacher
    Breakdown {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Average load with overloaded and available teachers
    Summary {
        #[arg(long)]
        sort_by_load: bool,
        #[arg(long)]
        json: bool,
    },
    /// Teachers ordered by total load, highest first
    Rank {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Suggest substitutes for an absent teacher
    Recommend {
        #[arg(long)]
        absent: String,
        #[arg(long)]
        subject: Option<String>,
        /// Skip candidates above this load (plus tolerance); overrides the
        /// active workload-balance rule
        #[arg(long)]
        max_load: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        tolerance: f64,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Ask for a substitute to cover an absent teacher
    Request {
        #[arg(long)]
        absent: String,
        #[arg(long)]
        substitute: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        period: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
        #[arg(long)]
        requested_by: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve a pending request and credit the substitute's hours
    Approve {
        #[arg(long)]
        id: Uuid,
    },
    /// Reject a pending request
    Reject {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List substitution requests, pending only by default
    Approvals {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// List or toggle substitution rules
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "workload-report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the stored base hours and thresholds
    Show,
    /// Change any of the base hours and thresholds
    Set {
        #[arg(long)]
        base_hours: Option<f64>,
        #[arg(long)]
        overload: Option<f64>,
        #[arg(long)]
        available: Option<f64>,
    },
}

#[derive(Subcommand)]
enum TeacherCommand {
    /// Create the teacher or replace the stored record
    Set(TeacherArgs),
    /// Delete a teacher with no substitution history
    Remove {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Print every stored rule
    List {
        #[arg(long)]
        json: bool,
    },
    /// Turn a rule on
    Enable {
        #[arg(long)]
        id: String,
    },
    /// Turn a rule off
    Disable {
        #[arg(long)]
        id: String,
    },
}

#[derive(Args)]
struct TeacherArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    grade_level: GradeLevel,
    #[arg(long, default_value_t = 0.0)]
    teaching_hours: f64,
    #[arg(long, default_value_t = 0.0)]
    substitute_hours: f64,
    #[arg(long, default_value_t = 0.0)]
    other_hours: f64,
    #[arg(long, default_value = "active")]
    status: TeacherStatus,
    #[arg(long)]
    email: Option<String>,
}

impl From<TeacherArgs> for Teacher {
    fn from(args: TeacherArgs) -> Self {
        Teacher {
            id: args.id,
            name: args.name,
            subject: args.subject,
            grade_level: args.grade_level,
            teaching_hours: args.teaching_hours,
            substitute_hours: args.substitute_hours,
            other_hours: args.other_hours,
            status: args.status,
            email: args.email,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must point at the Postgres database holding the teacher directory")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    debug!("connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            info!(imported, path = %csv.display(), "imported teachers");
            println!("Imported {imported} teachers from {}.", csv.display());
        }
        Commands::Settings(SettingsCommand::Show) => {
            let settings = db::load_settings(&pool).await?;
            print_settings(&settings);
        }
        Commands::Settings(SettingsCommand::Set {
            base_hours,
            overload,
            available,
        }) => {
            let current = db::load_settings(&pool).await?;
            let updated = current
                .with_overrides(base_hours, available, overload)
                .context("settings not saved")?;
            db::save_settings(&pool, &updated).await?;
            print_settings(&updated);
        }
        Commands::Teacher(TeacherCommand::Set(args)) => {
            let teacher = Teacher::from(args);
            let settings = db::load_settings(&pool).await?;
            // Reject bad hours before they reach the directory.
            let load = workload::teacher_load(&teacher, &settings)?;
            db::upsert_teacher(&pool, &teacher).await?;
            println!(
                "Saved {} ({}): {}% load, {}.",
                teacher.name, teacher.id, load.breakdown.total_pct, load.band
            );
        }
        Commands::Teacher(TeacherCommand::Remove { id }) => {
            match db::remove_teacher(&pool, &id).await? {
                db::Removal::Removed => println!("Removed teacher {id}."),
                db::Removal::NotFound => bail!("no teacher with id {id}"),
                db::Removal::HasHistory(count) => bail!(
                    "teacher {id} appears in {count} substitution record(s); \
                     set --status inactive instead of removing"
                ),
            }
        }
        Commands::Breakdown { id, json } => {
            let settings = db::load_settings(&pool).await?;
            let mut teachers = db::fetch_teachers(&pool).await?;
            if let Some(id) = id.as_deref() {
                teachers.retain(|teacher| teacher.id == id);
                if teachers.is_empty() {
                    bail!("no teacher with id {id}");
                }
            }

            let loads = teachers
                .iter()
                .map(|teacher| workload::teacher_load(teacher, &settings))
                .collect::<Result<Vec<_>, _>>()?;

            if json {
                print_json(&loads)?;
                return Ok(());
            }
            if loads.is_empty() {
                println!("No teachers in the directory.");
                return Ok(());
            }
            for load in loads.iter() {
                println!(
                    "- {} ({}): teaching {:.1}%, substitute {:.1}%, other {:.1}% => {}% [{}]",
                    load.teacher_name,
                    load.teacher_id,
                    load.breakdown.teaching_pct,
                    load.breakdown.substitute_pct,
                    load.breakdown.other_pct,
                    load.breakdown.total_pct,
                    load.band
                );
            }
        }
        Commands::Summary { sort_by_load, json } => {
            let settings = db::load_settings(&pool).await?;
            let teachers = db::fetch_teachers(&pool).await?;
            let order = if sort_by_load {
                SummaryOrder::LoadDescending
            } else {
                SummaryOrder::Input
            };
            let summary = match workload::summarize(&teachers, &settings, order) {
                Err(error::WorkloadError::EmptyInput) => {
                    println!("No teachers in the directory.");
                    return Ok(());
                }
                other => other?,
            };

            if json {
                print_json(&summary)?;
                return Ok(());
            }
            println!("Average load: {}% across {} teachers", summary.mean_load, summary.teacher_count);
            println!("Overloaded (> {}%):", settings.thresholds().overload());
            if summary.overloaded.is_empty() {
                println!("  none");
            }
            for load in summary.overloaded.iter() {
                println!("  - {} ({}) {}%", load.teacher_name, load.teacher_id, load.breakdown.total_pct);
            }
            println!("Available (< {}%):", settings.thresholds().available());
            if summary.available.is_empty() {
                println!("  none");
            }
            for load in summary.available.iter() {
                println!("  - {} ({}) {}%", load.teacher_name, load.teacher_id, load.breakdown.total_pct);
            }
        }
        Commands::Rank { limit, json } => {
            let settings = db::load_settings(&pool).await?;
            let teachers = db::fetch_teachers(&pool).await?;
            let ranked = workload::rank_by_load(&teachers, &settings)?;
            let top: Vec<_> = ranked.into_iter().take(limit).collect();

            if json {
                print_json(&top)?;
                return Ok(());
            }
            if top.is_empty() {
                println!("No teachers in the directory.");
                return Ok(());
            }
            println!("Teachers by load:");
            for (position, load) in top.iter().enumerate() {
                println!(
                    "{}. {} ({}) {}% [{}]",
                    position + 1,
                    load.teacher_name,
                    load.teacher_id,
                    load.breakdown.total_pct,
                    load.band
                );
            }
        }
        Commands::Recommend {
            absent,
            subject,
            max_load,
            tolerance,
            limit,
            json,
        } => {
            let settings = db::load_settings(&pool).await?;
            let teachers = db::fetch_teachers(&pool).await?;
            let Some(absent_teacher) = teachers.iter().find(|teacher| teacher.id == absent) else {
                bail!("no teacher with id {absent}");
            };
            let history = db::fetch_last_substitutions(&pool).await?;
            let cap = match max_load {
                Some(max_load) => Some(LoadCap { max_load, tolerance }),
                None => LoadCap::from_rules(&db::fetch_rules(&pool).await?),
            };
            if let Some(cap) = cap {
                debug!(max_load = cap.max_load, tolerance = cap.tolerance, "applying load cap");
            }
            let request = Request {
                subject: subject.as_deref(),
                cap,
            };

            let candidates =
                recommend::recommend(absent_teacher, &teachers, &request, &history, &settings)?;
            let top: Vec<_> = candidates.into_iter().take(limit).collect();

            if json {
                print_json(&top)?;
                return Ok(());
            }
            if top.is_empty() {
                println!("No eligible substitutes for {}.", absent_teacher.name);
                return Ok(());
            }
            println!("Substitutes for {} ({}):", absent_teacher.name, absent_teacher.subject);
            for candidate in top.iter() {
                let last = candidate
                    .last_substituted_on
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "- {} ({}, {}, {}) {}% load, subject match: {}, grade match: {}, last substituted: {}",
                    candidate.teacher_name,
                    candidate.teacher_id,
                    candidate.subject,
                    candidate.grade_level,
                    candidate.breakdown.total_pct,
                    yes_no(candidate.subject_match),
                    yes_no(candidate.grade_match),
                    last
                );
            }
        }
        Commands::Request {
            absent,
            substitute,
            date,
            period,
            subject,
            hours,
            requested_by,
            reason,
        } => {
            let record = SubstitutionRecord::from(db::NewSubstitution {
                absent_teacher_id: absent,
                substitute_teacher_id: substitute,
                taught_on: date.unwrap_or_else(|| Utc::now().date_naive()),
                period,
                subject,
                hours,
                requested_by,
                reason,
            });
            db::request_substitution(&pool, &record).await?;
            println!(
                "Request {} pending: {} to cover {} on {} (period {}).",
                record.id,
                record.substitute_teacher_id,
                record.absent_teacher_id,
                record.taught_on,
                record.period
            );
        }
        Commands::Approve { id } => {
            let record =
                db::decide_substitution(&pool, id, SubstitutionStatus::Approved, None).await?;
            println!(
                "Approved {}: credited {} hour(s) to {}.",
                record.id, record.hours, record.substitute_teacher_id
            );
        }
        Commands::Reject { id, reason } => {
            let record =
                db::decide_substitution(&pool, id, SubstitutionStatus::Rejected, reason.as_deref())
                    .await?;
            println!("Rejected {}.", record.id);
        }
        Commands::Approvals { all, json } => {
            let status = if all {
                None
            } else {
                Some(SubstitutionStatus::Pending)
            };
            let records = db::fetch_substitutions(&pool, status).await?;

            if json {
                print_json(&records)?;
                return Ok(());
            }
            if records.is_empty() {
                println!("No substitution requests.");
                return Ok(());
            }
            for record in records.iter() {
                println!(
                    "- {} [{}] {} period {}: {} covers {} ({}, {} h) requested by {}{}",
                    record.id,
                    record.status,
                    record.taught_on,
                    record.period,
                    record.substitute_teacher_id,
                    record.absent_teacher_id,
                    record.subject,
                    record.hours,
                    record.requested_by,
                    record
                        .reason
                        .as_deref()
                        .map(|reason| format!(": {reason}"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Rules(RulesCommand::List { json }) => {
            let rules = db::fetch_rules(&pool).await?;

            if json {
                print_json(&rules)?;
                return Ok(());
            }
            if rules.is_empty() {
                println!("No rules stored.");
                return Ok(());
            }
            for rule in rules.iter() {
                let limits = match (rule.max_workload, rule.tolerance) {
                    (Some(max), Some(tolerance)) => format!(", max {max}% +{tolerance}"),
                    (Some(max), None) => format!(", max {max}%"),
                    _ => String::new(),
                };
                println!(
                    "- {} {} ({}, priority {}, weight {}{}) {}",
                    rule.id,
                    rule.name,
                    rule.rule_type,
                    rule.priority,
                    rule.weight,
                    limits,
                    if rule.active { "on" } else { "off" }
                );
            }
        }
        Commands::Rules(RulesCommand::Enable { id }) => {
            if !db::set_rule_active(&pool, &id, true).await? {
                bail!("no rule with id {id}");
            }
            println!("Rule {id} enabled.");
        }
        Commands::Rules(RulesCommand::Disable { id }) => {
            if !db::set_rule_active(&pool, &id, false).await? {
                bail!("no rule with id {id}");
            }
            println!("Rule {id} disabled.");
        }
        Commands::Report { out } => {
            let settings = db::load_settings(&pool).await?;
            let teachers = db::fetch_teachers(&pool).await?;
            let report = report::build_report(&teachers, &settings, Utc::now().date_naive())?;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_settings(settings: &settings::WorkloadSettings) {
    let thresholds = settings.thresholds();
    println!("Base hours: {}", settings.base_hours());
    println!("Overload above: {}%", thresholds.overload());
    println!("Available below: {}%", thresholds.available());
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
