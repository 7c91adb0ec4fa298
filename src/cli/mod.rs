pub mod calendar;
pub mod task;

use std::path::{Path, PathBuf};

use anyhow::Result;
use calendar::{process_calendar_command, process_summary_command, CalendarCommand, SummaryCommand};
use clap::{Parser, Subcommand};
use task::{process_task_command, TaskCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    engine::AggregationEngine,
    storage::{aggregate_storage::AggregateStorageImpl, task_storage::TaskStorageImpl},
    tags::TagRegistry,
    tasks::TaskService,
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Streakboard", version, long_about = None)]
#[command(about = "Turns tagged tasks into daily XP, streaks and a yearly calendar", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Print logs to the console")]
    log: bool,
    #[arg(long, help = "Log level. By default RUST_LOG or info is used")]
    log_filter: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "List known tags and their weights")]
    Tags {},
    #[command(about = "Create, retag, complete and delete tasks")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    #[command(about = "Show the activity calendar of the last year")]
    Calendar {
        #[command(flatten)]
        command: CalendarCommand,
    },
    #[command(about = "Show today's XP, all time XP and the current streak")]
    Summary {
        #[command(flatten)]
        command: SummaryCommand,
    },
}

/// Service backed by files inside the application directory.
pub type FileTaskService = TaskService<AggregateStorageImpl, TaskStorageImpl>;

pub fn open_service(dir: &Path, registry: TagRegistry) -> Result<FileTaskService> {
    let aggregates = AggregateStorageImpl::new(dir.join("aggregates"))?;
    let tasks = TaskStorageImpl::new(dir.join("tasks"))?;
    Ok(TaskService::new(
        AggregationEngine::new(aggregates, registry),
        tasks,
        Box::new(DefaultClock),
    ))
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    enable_logging(CLI_PREFIX, &dir, args.log_filter, args.log)?;

    let registry = TagRegistry::default();
    match args.commands {
        Commands::Tags {} => {
            for tag in registry.list() {
                println!("{}\t{}\t{}\t{}", tag.id, tag.name, tag.color, tag.weight);
            }
            Ok(())
        }
        Commands::Task { command } => {
            process_task_command(command, &open_service(&dir, registry)?).await
        }
        Commands::Calendar { command } => {
            process_calendar_command(command, open_service(&dir, registry)?.engine()).await
        }
        Commands::Summary { command } => {
            process_summary_command(command, open_service(&dir, registry)?.engine()).await
        }
    }
}
