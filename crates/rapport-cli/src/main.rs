mod cli;

use anyhow::Result;
use clap::Parser;

use rapport_core::models::ReportPatch;

use crate::cli::{commands, Cli, Commands, ReportCommands, SyncCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Report(report_cmd) => match report_cmd {
            ReportCommands::New {
                customer,
                project,
                project_name,
                location,
                date,
                hours,
                description,
                trade,
                lines,
            } => {
                commands::report_new(
                    &customer,
                    &project,
                    &project_name,
                    &location,
                    date.as_deref(),
                    hours,
                    &description,
                    &trade,
                    &lines,
                    cli.json,
                )
                .await
            }
            ReportCommands::List => commands::report_list(cli.json),
            ReportCommands::Show { id } => commands::report_show(&id, cli.json),
            ReportCommands::Edit {
                id,
                customer,
                location,
                date,
                hours,
                description,
                trade,
            } => {
                let patch = ReportPatch {
                    customer,
                    work_location: location,
                    work_date: date,
                    total_hours: hours,
                    work_description: description,
                    trade,
                    work_lines: None,
                };
                commands::report_edit(&id, patch, cli.json)
            }
            ReportCommands::Remove { id } => commands::report_remove(&id, cli.json),
        },
        Commands::Sync(sync_cmd) => match sync_cmd {
            SyncCommands::Now => commands::sync_now(cli.json).await,
            SyncCommands::Status => commands::sync_status(cli.json),
            SyncCommands::Clear { force } => commands::sync_clear(force, cli.json),
        },
    }
}
