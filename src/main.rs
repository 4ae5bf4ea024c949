use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use deskd::{
    config::DeskConfig,
    directory::{Actor, NewStaff, StaffListParams, StaffStatus},
    policy::Role,
    workflow::{Priority, TaskListParams, TaskStatus},
    AppContext,
};

#[derive(Parser)]
#[command(
    name = "deskd",
    about = "Newsdesk Host — newsroom operations core daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "DESKD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DESKD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "DESKD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Act as this staff username (defaults to the first admin account).
    ///
    /// The CLI drives the same guarded service layer the HTTP collaborator
    /// would, so the named account's capabilities apply.
    #[arg(long, global = true)]
    actor: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the data directory and seed the first admin account.
    ///
    /// Runs migrations and creates the admin. Fails once any staff exist —
    /// after that, accounts are created through `deskd user add`.
    ///
    /// Examples:
    ///   deskd init --username chief --email chief@desk.example --full-name "Chief Editor" --password s3cret
    Init {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
    },
    /// Manage staff accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect the task board.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
    /// Show row counts for the core tables.
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a staff account (requires hr-management/create capability).
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
        /// chief-editor | department-head | reporter | secretary | admin
        #[arg(long)]
        role: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },
    /// List staff accounts (requires hr-management/view capability).
    List {
        #[arg(long)]
        role: Option<String>,
        /// active | disabled
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// List tasks, newest first.
    List {
        /// todo | in_progress | completed | blocked
        #[arg(long)]
        status: Option<String>,
        /// low | medium | high | urgent
        #[arg(long)]
        priority: Option<String>,
        /// Filter by assignee user id
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Show the newest audit entries (requires administration/view capability).
    Tail {
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.clone().unwrap_or_else(|| "info".to_string());
    let log_format =
        std::env::var("DESKD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = DeskConfig::new(args.data_dir.clone(), args.log.clone());
    let ctx = AppContext::bootstrap(config).await?;

    match args.command {
        Command::Init {
            username,
            email,
            full_name,
            password,
        } => {
            let admin = ctx
                .directory
                .bootstrap_admin(&username, &email, &full_name, &password)
                .await?;
            println!("created admin account '{}' ({})", admin.username, admin.id);
        }
        Command::User { action } => {
            let actor = resolve_cli_actor(&ctx, args.actor.as_deref()).await?;
            run_user(&ctx, &actor, action).await?;
        }
        Command::Task { action } => {
            let actor = resolve_cli_actor(&ctx, args.actor.as_deref()).await?;
            run_task(&ctx, &actor, action).await?;
        }
        Command::Audit { action } => {
            let actor = resolve_cli_actor(&ctx, args.actor.as_deref()).await?;
            let AuditAction::Tail { lines } = action;
            for entry in ctx.audit.tail(&actor, lines).await? {
                println!(
                    "{}  {:<8} {:<16} {:<24} {}",
                    entry.created_at,
                    entry.action_type,
                    entry.module,
                    entry.action,
                    entry.entity_name.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Status => {
            run_status(&ctx).await?;
        }
    }

    Ok(())
}

/// Resolve the account the CLI acts as. Named actor wins; otherwise the
/// oldest admin account. Fails cleanly before `deskd init` has run.
async fn resolve_cli_actor(ctx: &AppContext, username: Option<&str>) -> Result<Actor> {
    let row = match username {
        Some(name) => ctx
            .directory
            .find_by_username(name)
            .await?
            .with_context(|| format!("no staff account named '{name}'"))?,
        None => ctx
            .directory
            .first_admin()
            .await?
            .context("no admin account exists — run `deskd init` first")?,
    };
    Ok(row.actor()?)
}

async fn run_user(ctx: &AppContext, actor: &Actor, action: UserAction) -> Result<()> {
    match action {
        UserAction::Add {
            username,
            email,
            full_name,
            password,
            role,
            department,
            position,
        } => {
            let role: Role = role.parse()?;
            let row = ctx
                .directory
                .create_staff(
                    actor,
                    &NewStaff {
                        username,
                        email,
                        full_name,
                        password,
                        role,
                        department_id: department,
                        position,
                    },
                )
                .await?;
            println!("created '{}' ({}) as {}", row.username, row.id, row.role);
        }
        UserAction::List { role, status } => {
            let params = StaffListParams {
                role: role.map(|r| r.parse::<Role>()).transpose()?,
                status: status.map(|s| s.parse::<StaffStatus>()).transpose()?,
                ..Default::default()
            };
            let page = ctx.directory.list_staff(actor, &params).await?;
            println!("{} staff", page.total);
            for staff in page.items {
                println!(
                    "{:<24} {:<16} {:<10} active:{:<3} done:{:<3} {}",
                    staff.username,
                    staff.role,
                    staff.status,
                    staff.active_tasks,
                    staff.completed_tasks,
                    staff.full_name,
                );
            }
        }
    }
    Ok(())
}

async fn run_task(ctx: &AppContext, actor: &Actor, action: TaskAction) -> Result<()> {
    let TaskAction::List {
        status,
        priority,
        assignee,
        limit,
    } = action;
    let params = TaskListParams {
        status: status.map(|s| s.parse::<TaskStatus>()).transpose()?,
        priority: priority.map(|p| p.parse::<Priority>()).transpose()?,
        assignee_id: assignee,
        limit: Some(limit),
        ..Default::default()
    };
    let page = ctx.workflow.list_tasks(actor, &params).await?;
    println!("{} tasks", page.total);
    for task in page.items {
        println!(
            "{}  {:<12} {:<8} {:<18} due {}  {}",
            task.id,
            task.status,
            task.priority,
            task.submission_status,
            task.due_date,
            task.title,
        );
    }
    Ok(())
}

async fn run_status(ctx: &AppContext) -> Result<()> {
    let pool = ctx.storage.pool();
    for table in ["users", "departments", "tasks", "task_updates", "audit_logs"] {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        println!("{table:<14} {count}");
    }
    Ok(())
}

/// Initialize the tracing subscriber: stdout always, plus a daily-rolling
/// file when `log_file` is set. Returns the file writer's guard, which must
/// stay alive for the process lifetime.
///
/// `log_format` is `"pretty"` (compact, human-readable) or `"json"`
/// (structured, for log aggregators). A log directory that cannot be created
/// downgrades to stdout-only with a warning rather than failing startup.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let json = log_format == "json";

    let file_writer = log_file.and_then(|path| {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("deskd.log"));
        // tracing-appender panics on a missing directory; create it first.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e}; logging to stdout only",
                dir.display()
            );
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, filename);
        Some(tracing_appender::non_blocking(appender))
    });

    let registry = tracing_subscriber::registry().with(EnvFilter::new(log_level));
    match (file_writer, json) {
        (Some((writer, guard)), true) => {
            registry
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(writer))
                .init();
            Some(guard)
        }
        (Some((writer, guard)), false) => {
            registry
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(writer))
                .init();
            Some(guard)
        }
        (None, true) => {
            registry.with(fmt::layer().json()).init();
            None
        }
        (None, false) => {
            registry.with(fmt::layer().compact()).init();
            None
        }
    }
}
