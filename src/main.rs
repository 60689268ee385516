use std::{path::PathBuf, process::ExitCode};

use ::tracing::error;
use clap::{Parser, Subcommand};
use service::{PendingRun, RunOutcome, Service, WorkersRun};

mod config;
mod crawler;
mod devicepool;
mod fleet;
mod influx;
mod report_test;
mod service;
mod tracing;
use tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about = "Fleet observation reports: pending jobs and missing workers", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "config file",
        global = true,
        help = "Path to config file"
    )]
    config: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Specify multiple times for even more verbosity"
    )]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the push log for a count of pending jobs per project
    Pending {
        #[arg(short, long, help = "A single project to inspect for pending jobs")]
        project: Option<String>,
        #[arg(short, long, help = "Require pending jobs to match this string")]
        filter: Option<String>,
        #[arg(
            long,
            default_value_t = 3,
            help = "How many pages of pushes to inspect"
        )]
        pages: u64,
        #[arg(
            long,
            default_value_t = 20,
            help = "How many pushes per page to fetch"
        )]
        page_size: u64,
        #[arg(
            short = 'n',
            long,
            help = "Don't exit early if no pending jobs found on a page"
        )]
        no_early_exit: bool,
    },
    /// Compare the configured device fleet against observed workers
    Workers {
        #[arg(
            short = 'a',
            long = "all",
            help = "List all queues even if no workers are missing"
        )]
        all: bool,
        #[arg(
            short = 'u',
            long = "update",
            help = "Force an update of the fleet config checkout"
        )]
        update: bool,
        #[arg(
            short = 't',
            long = "time-limit",
            value_name = "minutes",
            help = "Only show workers that last started a job longer than this many minutes ago"
        )]
        time_limit: Option<u64>,
        #[arg(
            short = 'i',
            long = "influx-logging",
            help = "Write per-queue worker gauges to the configured influx endpoint"
        )]
        influx_logging: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_tracing(cli.verbose) {
        eprintln!("error setting up tracing: {:?}", err);
        return ExitCode::FAILURE;
    }

    let config = match &cli.config {
        Some(path) => match config::FleetwatchConfig::from_path(&path.to_string_lossy()) {
            Ok(config) => config,
            Err(err) => {
                error!("error loading config: {:?}", err);
                return ExitCode::FAILURE;
            }
        },
        None => config::FleetwatchConfig::default(),
    };

    match cli.command {
        Commands::Pending {
            project,
            filter,
            pages,
            page_size,
            no_early_exit,
        } => {
            let projects = match project {
                Some(project) => {
                    if !config.pushlog.projects.contains(&project) {
                        println!(
                            "invalid project specified. valid projects are: {}",
                            config.pushlog.projects.join(", ")
                        );
                        return ExitCode::from(1);
                    }
                    vec![project]
                }
                None => config.pushlog.projects.clone(),
            };
            let service = match Service::new(config) {
                Ok(service) => service,
                Err(err) => {
                    error!("error creating service: {:?}", err);
                    return ExitCode::FAILURE;
                }
            };
            let run = PendingRun {
                projects,
                platform_filter: filter,
                pages,
                page_size,
                early_exit: !no_early_exit,
            };
            match service.run_pending(run).await {
                Ok(RunOutcome::Completed(report)) => {
                    println!("{}", report);
                    ExitCode::SUCCESS
                }
                Ok(RunOutcome::Interrupted) => ExitCode::SUCCESS,
                Err(err) => {
                    error!("pending crawl failed: {:?}", err);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Workers {
            all,
            update,
            time_limit,
            influx_logging,
        } => {
            if influx_logging && config.influx.is_none() {
                println!("influx logging requested but no influx endpoint is configured");
                return ExitCode::from(1);
            }
            let service = match Service::new(config) {
                Ok(service) => service,
                Err(err) => {
                    error!("error creating service: {:?}", err);
                    return ExitCode::FAILURE;
                }
            };
            let run = WorkersRun {
                show_all: all,
                force_update: update,
                time_limit,
                influx_logging,
            };
            match service.run_workers(run).await {
                Ok(RunOutcome::Completed(report)) => {
                    println!("{}", report);
                    ExitCode::SUCCESS
                }
                Ok(RunOutcome::Interrupted) => ExitCode::SUCCESS,
                Err(err) => {
                    error!("workers report failed: {:?}", err);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
