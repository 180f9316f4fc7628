use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, Subcommand};
use db::{ConnectOpts, DbHandle};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use scheduling::model::{
    Appointment, AppointmentId, NewAppointment, NewParty, Party, PartyId, PartyKind, PartyRole,
};
use scheduling::{Scheduling, SchedulingApi, SchedulingConfig, SchedulingError, MODULE_NAME};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const GENERIC_FAILURE: &str = "The operation could not be completed. Please try again later.";

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps in-memory DSNs as-is.
/// - Normalizes backslashes into forward slashes (important on Windows).
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path) -> Result<String> {
    if dsn.eq_ignore_ascii_case("sqlite::memory:") || dsn.eq_ignore_ascii_case("sqlite://:memory:")
    {
        return Ok(runtime::config::MEMORY_DATABASE_URL.to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {})", dsn))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` or the same with a space separator.
fn parse_datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s.trim(), f).ok())
        .ok_or_else(|| format!("invalid date-time '{s}', expected YYYY-MM-DDTHH:MM"))
}

/// Clinic appointment scheduler
#[derive(Parser)]
#[command(name = "scheduler")]
#[command(about = "Book, move and query appointments between requesters and providers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Log verbosity on the console (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use a throwaway in-memory database
    #[arg(long, global = true)]
    mock: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Book an appointment
    Book {
        #[arg(long)]
        requester: i64,
        #[arg(long)]
        provider: i64,
        /// Slot start, e.g. 2025-11-25T15:30
        #[arg(long, value_parser = parse_datetime)]
        at: NaiveDateTime,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel a booked appointment
    Cancel { id: i64 },
    /// Mark a booked appointment as completed
    Complete { id: i64 },
    /// Move an appointment to a new time (status returns to BOOKED)
    Reschedule {
        id: i64,
        #[arg(long, value_parser = parse_datetime)]
        at: NaiveDateTime,
    },
    /// Check whether a provider is free at a time
    Check {
        #[arg(long)]
        provider: i64,
        #[arg(long, value_parser = parse_datetime)]
        at: NaiveDateTime,
    },
    /// Show one appointment
    Show { id: i64 },
    /// Appointments of a requester, newest first
    ListRequester { id: i64 },
    /// Appointments of a provider, oldest first
    ListProvider { id: i64 },
    /// Register a requester or provider
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        name: String,
        /// requester | provider
        #[arg(long)]
        role: PartyRole,
        /// Contact details (requesters)
        #[arg(long)]
        contact: Option<String>,
        /// Specialization (providers)
        #[arg(long)]
        specialization: Option<String>,
    },
    /// List registered parties
    Parties {
        #[arg(long)]
        role: Option<PartyRole>,
    },
    /// Validate configuration and print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "command failed");
            eprintln!("Error: {}", user_message(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Conflicts and validation errors are shown verbatim; storage failures stay generic.
fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<SchedulingError>() {
        Some(SchedulingError::Conflict { message }) => message.clone(),
        Some(e @ SchedulingError::Validation { .. }) => e.to_string(),
        Some(SchedulingError::Persistence) => GENERIC_FAILURE.to_string(),
        None => format!("{err:#}"),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SchedulingError>() {
        Some(SchedulingError::Validation { .. }) => 2,
        Some(SchedulingError::Conflict { .. }) => 3,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        mock: cli.mock,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, &config.home_path());
    tracing::debug!(home_dir = %config.home_dir, "scheduler starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let module_config: SchedulingConfig = config.module_config(MODULE_NAME)?;
    if let Commands::CheckConfig = command {
        return check_config(&config, &module_config);
    }

    let db = connect(&config).await?;
    let module = Scheduling::init(db.clone(), &module_config).await?;
    let out = Output { json: cli.json };
    let res = execute(module.client(), command, &out).await;
    db.close().await;
    res
}

async fn connect(config: &AppConfig) -> Result<Arc<DbHandle>> {
    let db_config = config.database.clone().unwrap_or_default();
    let raw = db_config.url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }
    let dsn = absolutize_sqlite_dsn(raw, &config.home_path())?;

    let connect_opts = ConnectOpts {
        max_conns: db_config.max_conns,
        acquire_timeout: Some(Duration::from_secs(5)),
        sqlite_busy_timeout: db_config
            .busy_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms))),
        create_sqlite_dirs: true,
        ..Default::default()
    };

    tracing::info!(dsn = %dsn, "connecting to database");
    let db = DbHandle::connect(&dsn, connect_opts)
        .await
        .with_context(|| format!("failed to open database {dsn}"))?;
    Ok(Arc::new(db))
}

fn check_config(config: &AppConfig, module_config: &SchedulingConfig) -> Result<()> {
    if let Some(db) = &config.database {
        DbHandle::validate_dsn(db.url.trim())?;
    }
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    println!(
        "scheduling: buffer {} min, lock timeout {:?}",
        module_config.buffer_minutes, module_config.lock_timeout
    );
    Ok(())
}

async fn execute(api: Arc<dyn SchedulingApi>, command: Commands, out: &Output) -> Result<()> {
    match command {
        Commands::Book {
            requester,
            provider,
            at,
            notes,
        } => {
            let id = api
                .book(NewAppointment {
                    requester_id: PartyId(requester),
                    provider_id: PartyId(provider),
                    scheduled_at: at,
                    notes,
                })
                .await?;
            out.message(&format!("Booked appointment {id}"), &serde_json::json!({ "id": id }))
        }
        Commands::Cancel { id } => {
            let done = api.cancel(AppointmentId(id)).await?;
            out.outcome(id, done, "cancelled")
        }
        Commands::Complete { id } => {
            let done = api.complete(AppointmentId(id)).await?;
            out.outcome(id, done, "completed")
        }
        Commands::Reschedule { id, at } => {
            let done = api.reschedule(AppointmentId(id), at).await?;
            out.outcome(id, done, "rescheduled")
        }
        Commands::Check { provider, at } => {
            let free = api.check_availability(PartyId(provider), at).await?;
            let text = if free {
                format!("Provider {provider} is available at {at}")
            } else {
                format!("Provider {provider} is not available at {at}")
            };
            out.message(&text, &serde_json::json!({ "available": free }))
        }
        Commands::Show { id } => match api.get_appointment(AppointmentId(id)).await? {
            Some(a) => out.appointments(&[a]),
            None => Err(anyhow!("appointment {id} not found")),
        },
        Commands::ListRequester { id } => out.appointments(&api.list_for_requester(PartyId(id)).await?),
        Commands::ListProvider { id } => out.appointments(&api.list_for_provider(PartyId(id)).await?),
        Commands::Register {
            username,
            name,
            role,
            contact,
            specialization,
        } => {
            let kind = match role {
                PartyRole::Requester => PartyKind::Requester { contact },
                PartyRole::Provider => PartyKind::Provider { specialization },
            };
            let party = api
                .register_party(NewParty {
                    username,
                    display_name: name,
                    kind,
                })
                .await?;
            out.parties(&[party])
        }
        Commands::Parties { role } => out.parties(&api.list_parties(role).await?),
        Commands::CheckConfig => Ok(()),
    }
}

/// Renders results as plain lines or JSON on stdout.
struct Output {
    json: bool,
}

impl Output {
    fn message(&self, text: &str, value: &serde_json::Value) -> Result<()> {
        if self.json {
            println!("{value}");
        } else {
            println!("{text}");
        }
        Ok(())
    }

    fn outcome(&self, id: i64, changed: bool, verb: &str) -> Result<()> {
        let text = if changed {
            format!("Appointment {id} {verb}")
        } else {
            format!("Appointment {id} was not {verb} (missing or not in a matching state)")
        };
        self.message(&text, &serde_json::json!({ "id": id, "changed": changed }))
    }

    fn appointments(&self, items: &[Appointment]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(items)?);
            return Ok(());
        }
        if items.is_empty() {
            println!("No appointments");
        }
        for a in items {
            println!(
                "#{:<5} {}  {:<9}  requester {}  provider {}{}",
                a.id.0,
                a.scheduled_at.format("%Y-%m-%d %H:%M"),
                a.status.as_str(),
                a.requester_id,
                a.provider_id,
                a.notes
                    .as_deref()
                    .map(|n| format!("  ({n})"))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    fn parties(&self, items: &[Party]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(items)?);
            return Ok(());
        }
        if items.is_empty() {
            println!("No parties");
        }
        for p in items {
            let detail = match &p.kind {
                PartyKind::Requester { contact } => contact.clone(),
                PartyKind::Provider { specialization } => specialization.clone(),
            };
            println!(
                "#{:<5} {:<9}  {}  {}{}",
                p.id.0,
                p.kind.role().as_str(),
                p.username,
                p.display_name,
                detail.map(|d| format!("  ({d})")).unwrap_or_default()
            );
        }
        Ok(())
    }
}
