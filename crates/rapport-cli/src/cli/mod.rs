pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(name = "rapport", about = "Field-service work reports with offline-first sync")]
#[clap(version, author)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[clap(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Commands for managing work reports
    #[clap(subcommand, name = "report")]
    Report(ReportCommands),

    /// Sync queue commands
    #[clap(subcommand, name = "sync")]
    Sync(SyncCommands),
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Create a report and submit it (falls back to the offline queue)
    #[clap(name = "new")]
    New {
        /// Customer name
        #[clap(long)]
        customer: String,
        /// Project number
        #[clap(long)]
        project: String,
        /// Project name
        #[clap(long, default_value = "")]
        project_name: String,
        /// Work location (site, city)
        #[clap(long)]
        location: String,
        /// Work date (YYYY-MM-DD, defaults to today)
        #[clap(long)]
        date: Option<String>,
        /// Total hours worked
        #[clap(long, default_value = "8")]
        hours: f64,
        /// Free-text description of the work
        #[clap(long, default_value = "")]
        description: String,
        /// Trade/craft of the report
        #[clap(long, default_value = "")]
        trade: String,
        /// Work line in the form "component:work done:hours" (repeatable)
        #[clap(long = "line")]
        lines: Vec<String>,
    },

    /// List local reports
    #[clap(name = "ls")]
    List,

    /// Show a single report
    #[clap(name = "show")]
    Show {
        /// Local report id (full or unambiguous prefix)
        id: String,
    },

    /// Edit a report inside its 36 hour window
    #[clap(name = "edit")]
    Edit {
        /// Local report id (full or unambiguous prefix)
        id: String,
        #[clap(long)]
        customer: Option<String>,
        #[clap(long)]
        location: Option<String>,
        #[clap(long)]
        date: Option<String>,
        #[clap(long)]
        hours: Option<f64>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        trade: Option<String>,
    },

    /// Delete a local report
    #[clap(name = "rm")]
    Remove {
        /// Local report id (full or unambiguous prefix)
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Flush the pending mutation queue now
    #[clap(name = "now")]
    Now,

    /// Show pending queue and dead-letter status
    #[clap(name = "status")]
    Status,

    /// Clear the pending queue and the dead-letter list (use with caution)
    #[clap(name = "clear")]
    Clear {
        /// Skip the confirmation prompt
        #[clap(long)]
        force: bool,
    },
}
