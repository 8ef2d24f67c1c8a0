//! Streakbook CLI
//!
//! Command-line front end over a local streak store:
//! - Manage streaks (list, create, rename, delete, select)
//! - Record days (click, color, add, set)
//! - Show statistics
//! - Export/import data

use anyhow::{bail, Context};
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use streakbook::config::{generate_default_config, Config, LoggingConfig};
use streakbook::stats::StreakStats;
use streakbook::storage::{
    Color, CountStartMode, DayKey, GatewayConfig, LegacyFile, StoreGateway, StreakSettings,
    StreakType,
};
use streakbook::transfer::write_csv;
use streakbook::{Session, StreakError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "streakbook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track daily habit streaks from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Streak to act on (created as a color streak if new)
    #[arg(short, long, global = true)]
    pub streak: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all streaks
    List,

    /// Create a streak
    Create {
        name: String,
        /// Streak type (color, count)
        #[arg(short = 't', long = "type", default_value = "color")]
        streak_type: StreakType,
    },

    /// Rename a streak
    Rename { old: String, new: String },

    /// Delete a streak and all of its days
    Delete {
        name: String,
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },

    /// Make a streak the active one
    Select { name: String },

    /// Advance a day to the next color
    Click {
        /// Day as YYYY-M-D, "today" or "yesterday"
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Set a day's color (none, red, green, blue)
    Color {
        color: Color,
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Add to (or subtract from) a day's count
    Add {
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Set a day's count
    Set {
        value: u32,
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Show statistics for the active streak
    Stats {
        /// Month as YYYY-M (default: current month)
        #[arg(short, long)]
        month: Option<String>,
        /// Statistics over the whole history instead
        #[arg(long)]
        overall: bool,
    },

    /// Show or change the active streak's settings
    Settings {
        #[arg(long)]
        red_label: Option<String>,
        #[arg(long)]
        green_label: Option<String>,
        #[arg(long)]
        blue_label: Option<String>,
        /// Count start mode (first-recorded, fixed-date)
        #[arg(long)]
        start_mode: Option<String>,
        /// Fixed start date for count statistics (YYYY-M-D)
        #[arg(long)]
        start_date: Option<String>,
        /// Remove all settings
        #[arg(long)]
        clear: bool,
    },

    /// Export everything (json) or day records (csv)
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Export format (json, csv)
        #[arg(long = "as", default_value = "json")]
        export_format: String,
    },

    /// Replace everything with an exported file
    Import { path: PathBuf },

    /// Print the default config file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.to_string_lossy().to_string();
    }

    init_logging(&config.logging)?;
    tracing::debug!("Streakbook v{}", env!("CARGO_PKG_VERSION"));

    let gateway = StoreGateway::new(
        GatewayConfig::new(config.storage.database_path()).durable(config.storage.durable),
    );
    let store = gateway.open().await.map_err(StreakError::from).context("Cannot load data")?;

    let mut builder = Session::builder(store)
        .legacy(Arc::new(LegacyFile::new(config.storage.legacy_path())));
    if let Some(name) = &cli.streak {
        builder = builder.route_hint(name.clone());
    }
    let mut session = builder.setup().await.context("Cannot load data")?;

    run(&cli, &mut session).await
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("streakbook={}", config.level)));

    let file = match &config.file {
        Some(path) => Some(Arc::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path))?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match (config.is_json(), file) {
        (true, Some(file)) => registry.with(fmt::layer().json().with_writer(file)).init(),
        (true, None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        (false, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(file))
            .init(),
        (false, None) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

async fn run(cli: &Cli, session: &mut Session) -> anyhow::Result<()> {
    let json = cli.format.eq_ignore_ascii_case("json");

    match &cli.command {
        Commands::List => {
            let directory = session.directory();
            if json {
                let rows: Vec<_> = directory
                    .names()
                    .iter()
                    .map(|name| {
                        serde_json::json!({
                            "name": name,
                            "type": directory.streak_type(name),
                            "records": session.records().days(name).map_or(0, |d| d.len()),
                            "active": name == session.active(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("  {:<24} {:<8} {}", "Name", "Type", "Days");
                println!("{}", "-".repeat(42));
                for name in directory.names() {
                    let marker = if name == session.active() { "*" } else { " " };
                    println!(
                        "{} {:<24} {:<8} {}",
                        marker,
                        name,
                        directory.streak_type(name),
                        session.records().days(name).map_or(0, |d| d.len())
                    );
                }
            }
        }

        Commands::Create { name, streak_type } => {
            let name = session.create_streak(name, *streak_type).await?;
            println!("Created {} streak \"{}\"", streak_type, name);
        }

        Commands::Rename { old, new } => {
            let name = session.rename_streak(old, new).await?;
            println!("Renamed \"{}\" to \"{}\"", old.trim(), name);
        }

        Commands::Delete { name, yes } => {
            if !yes {
                bail!("Deleting \"{}\" removes all of its days; pass --yes to confirm", name);
            }
            session.delete_streak(name).await?;
            println!("Deleted \"{}\"", name.trim());
        }

        Commands::Select { name } => {
            let state = session.select_streak(name).await?;
            print_state(&state, json)?;
        }

        Commands::Click { date } => {
            let day = parse_day(date.as_deref(), session.today())?;
            let color = session.click_color_day(day).await?;
            let label = session.directory().settings(session.active()).color_label(color).to_string();
            println!("{} {}: {}", session.active(), day, label);
        }

        Commands::Color { color, date } => {
            let day = parse_day(date.as_deref(), session.today())?;
            let color = session.set_color_day(day, *color).await?;
            let label = session.directory().settings(session.active()).color_label(color).to_string();
            println!("{} {}: {}", session.active(), day, label);
        }

        Commands::Add { delta, date } => {
            let day = parse_day(date.as_deref(), session.today())?;
            let value = session.adjust_count_day(day, *delta).await?;
            println!("{} {}: {}", session.active(), day, value);
        }

        Commands::Set { value, date } => {
            let day = parse_day(date.as_deref(), session.today())?;
            let value = session.set_count_day(day, *value).await?;
            println!("{} {}: {}", session.active(), day, value);
        }

        Commands::Stats { month, overall } => {
            let stats = if *overall {
                session.compute_overall_stats()
            } else {
                let (year, month) = parse_month(month.as_deref(), session.today())?;
                session.compute_month_stats(year, month)
            };
            print_stats(session, &stats, json)?;
        }

        Commands::Settings {
            red_label,
            green_label,
            blue_label,
            start_mode,
            start_date,
            clear,
        } => {
            let name = session.active().to_string();
            let mut settings = if *clear {
                StreakSettings::default()
            } else {
                session.directory().settings(&name)
            };

            for (color, label) in [
                (Color::Red, red_label),
                (Color::Green, green_label),
                (Color::Blue, blue_label),
            ] {
                if let Some(label) = label {
                    settings = settings.label(color, label.clone());
                }
            }
            if start_mode.is_some() || start_date.is_some() {
                let mode = match start_mode.as_deref() {
                    Some(mode) => parse_start_mode(mode)?,
                    None => CountStartMode::FixedDate,
                };
                let date = start_date
                    .as_deref()
                    .map(|d| parse_day(Some(d), session.today()))
                    .transpose()?
                    .or(settings.count_zero_start_date);
                settings = settings.count_start(mode, date);
            }

            let changed = *clear
                || red_label.is_some()
                || green_label.is_some()
                || blue_label.is_some()
                || start_mode.is_some()
                || start_date.is_some();
            if changed {
                session.update_settings(&name, settings).await?;
            }
            print_state(&session.active_state(), json)?;
        }

        Commands::Export {
            output,
            export_format,
        } => {
            let payload = session.export_all().await?;
            let body = match export_format.to_lowercase().as_str() {
                "csv" => {
                    let mut buf = Vec::new();
                    write_csv(&payload, &mut buf)?;
                    String::from_utf8(buf)?
                }
                "json" => payload.to_json()? + "\n",
                other => bail!("Unknown export format: {}", other),
            };

            match output {
                Some(path) => {
                    std::fs::write(path, body)
                        .with_context(|| format!("Cannot write {:?}", path))?;
                    eprintln!(
                        "Exported {} streaks, {} days to {:?}",
                        payload.names.len(),
                        payload.day_records.len(),
                        path
                    );
                }
                None => print!("{}", body),
            }
        }

        Commands::Import { path } => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {:?}", path))?;
            let plan = session.import_all(&raw).await?;
            println!(
                "Imported {} streaks, {} days",
                plan.streak_count(),
                plan.record_count()
            );
        }

        Commands::Config => print!("{}", generate_default_config()),
    }

    Ok(())
}

fn parse_day(input: Option<&str>, today: DayKey) -> anyhow::Result<DayKey> {
    match input.map(str::trim) {
        None | Some("today") => Ok(today),
        Some("yesterday") => Ok(DayKey::from_date(today.date() - Duration::days(1))),
        Some(s) => DayKey::parse(s).with_context(|| format!("Invalid date: {} (expected YYYY-M-D)", s)),
    }
}

fn parse_month(input: Option<&str>, today: DayKey) -> anyhow::Result<(i32, u32)> {
    let Some(s) = input else {
        return Ok((today.year(), today.month()));
    };
    let parsed = s.trim().split_once('-').and_then(|(y, m)| {
        let year: i32 = y.parse().ok()?;
        let month: u32 = m.parse().ok()?;
        (1..=12).contains(&month).then_some((year, month))
    });
    parsed.with_context(|| format!("Invalid month: {} (expected YYYY-M)", s))
}

fn parse_start_mode(s: &str) -> anyhow::Result<CountStartMode> {
    match s.trim().to_lowercase().as_str() {
        "first-recorded" | "first" => Ok(CountStartMode::FirstRecorded),
        "fixed-date" | "fixed" => Ok(CountStartMode::FixedDate),
        other => bail!("Unknown start mode: {} (expected first-recorded or fixed-date)", other),
    }
}

fn print_state(state: &streakbook::ActiveState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    println!("Streak: {} ({})", state.streak, state.streak_type);
    println!("Today:  {}", state.today);
    match state.streak_type {
        StreakType::Color => {
            for color in Color::all() {
                println!("  {:<6} {}", color.default_label(), state.settings.color_label(*color));
            }
        }
        StreakType::Count => {
            let mode = match state.settings.start_mode() {
                CountStartMode::FirstRecorded => "first-recorded".to_string(),
                CountStartMode::FixedDate => match state.settings.count_zero_start_date {
                    Some(date) => format!("fixed-date {}", date),
                    None => "fixed-date (unset)".to_string(),
                },
            };
            println!("  Count starts: {}", mode);
        }
    }
    Ok(())
}

fn print_stats(session: &Session, stats: &StreakStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    match stats {
        StreakStats::Count(count) => println!("{}", count),
        StreakStats::Color(color) => {
            let settings = session.directory().settings(session.active());
            println!("Days: {}", color.elapsed_days);
            for c in Color::all() {
                let tally = color.tally(*c);
                println!(
                    "  {:<10} {:>4} days, best run {}",
                    settings.color_label(*c),
                    tally.days,
                    tally.longest_run
                );
            }
            println!("  Success run: {}", color.success_run);
        }
    }
    Ok(())
}
