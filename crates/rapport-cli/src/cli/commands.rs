use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use serde_json::json;
use std::sync::Arc;

use rapport_core::clock::SystemClock;
use rapport_core::config::{get_config, Config};
use rapport_core::error::{RemoteError, ReportError};
use rapport_core::models::{LocalReport, ReportPatch, WorkLine};
use rapport_core::remote::{Connectivity, HttpBackend, HttpProbe, RemoteBackend};
use rapport_core::storage::SqliteKv;
use rapport_core::submit::{submit_report, SubmitOutcome};
use rapport_core::{MutationQueue, ReportDraft, ReportStore, SyncDispatcher};

/// Stand-in backend for local-only mode: every write fails transiently, so
/// submissions land in the queue instead of erroring out.
struct NoServerBackend;

#[async_trait]
impl RemoteBackend for NoServerBackend {
    async fn create_time_entry(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
    async fn update_task_status(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
    async fn add_note(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
    async fn create_photo_record(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
    async fn create_day_report(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
    async fn create_project_report(&self, _: &serde_json::Value) -> Result<String, RemoteError> {
        Err(RemoteError::Transient("no server configured".to_string()))
    }
}

/// Local-only mode is definitively offline.
struct NeverConnected;

#[async_trait]
impl Connectivity for NeverConnected {
    async fn is_connected(&self) -> bool {
        false
    }
}

fn open_stores(config: &Config) -> Result<(Arc<MutationQueue>, Arc<ReportStore>)> {
    let kv = Arc::new(SqliteKv::new(&config.database_path()?)?);
    let clock = Arc::new(SystemClock);
    let queue = Arc::new(MutationQueue::new(kv.clone(), clock.clone()));
    let reports = Arc::new(ReportStore::new(kv, clock));
    Ok((queue, reports))
}

fn build_backend(config: &Config) -> Result<Arc<dyn RemoteBackend>> {
    match &config.server.url {
        Some(url) => Ok(Arc::new(HttpBackend::new(
            url,
            config.server.auth_token.clone(),
            config.request_timeout(),
        )?)),
        None => Ok(Arc::new(NoServerBackend)),
    }
}

fn build_connectivity(config: &Config) -> Result<Arc<dyn Connectivity>> {
    match &config.server.url {
        Some(url) => Ok(Arc::new(HttpProbe::new(url, config.request_timeout())?)),
        None => Ok(Arc::new(NeverConnected)),
    }
}

/// Parse a work line argument of the form "component:work done:hours".
fn parse_work_line(raw: &str, line_number: u32) -> Result<WorkLine> {
    let parts: Vec<&str> = raw.splitn(3, ':').collect();
    if parts.len() != 3 {
        bail!("invalid work line '{raw}': expected \"component:work done:hours\"");
    }
    let hours: f64 = parts[2]
        .trim()
        .parse()
        .with_context(|| format!("invalid hours in work line '{raw}'"))?;
    Ok(WorkLine {
        line_number,
        component: parts[0].trim().to_string(),
        work_done: parts[1].trim().to_string(),
        quantity: 1.0,
        hours,
        location: String::new(),
        trade: String::new(),
    })
}

/// Resolve a report by full id or unambiguous prefix.
fn resolve_report(reports: &ReportStore, id: &str) -> Result<LocalReport> {
    let all = reports.list_all(None)?;
    let matches: Vec<&LocalReport> = all
        .iter()
        .filter(|r| r.local_id.to_string().starts_with(id))
        .collect();
    match matches.len() {
        0 => Err(anyhow!("no report matches '{id}'")),
        1 => Ok(matches[0].clone()),
        n => Err(anyhow!("'{id}' is ambiguous ({n} reports match)")),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn report_new(
    customer: &str,
    project: &str,
    project_name: &str,
    location: &str,
    date: Option<&str>,
    hours: f64,
    description: &str,
    trade: &str,
    lines: &[String],
    json: bool,
) -> Result<()> {
    let config = get_config();
    let (queue, reports) = open_stores(config)?;
    let backend = build_backend(config)?;

    let work_lines = lines
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_work_line(raw, i as u32 + 1))
        .collect::<Result<Vec<_>>>()?;

    let work_date = match date {
        Some(d) => d.to_string(),
        None => chrono::Local::now().format("%Y-%m-%d").to_string(),
    };

    let draft = ReportDraft {
        tenant_id: config.server.tenant_id.clone().unwrap_or_default(),
        customer: customer.to_string(),
        project_number: project.to_string(),
        project_name: project_name.to_string(),
        work_location: location.to_string(),
        work_date,
        total_hours: hours,
        work_description: description.to_string(),
        trade: trade.to_string(),
        work_lines,
    };

    let outcome = submit_report(&reports, &queue, backend.as_ref(), draft).await?;

    if json {
        let (report, state) = match &outcome {
            SubmitOutcome::Synced { report } => (report, "synced"),
            SubmitOutcome::SavedLocally { report, .. } => (report, "saved_locally"),
        };
        println!("{}", json!({ "state": state, "report": report }));
        return Ok(());
    }

    match outcome {
        SubmitOutcome::Synced { report } => {
            println!(
                "{} report {} synced to server",
                "Created:".green().bold(),
                short_id(&report)
            );
        }
        SubmitOutcome::SavedLocally { report, pending } => {
            // Local persistence already succeeded; this is not an error.
            println!(
                "{} report {} saved locally, will sync when online ({} pending)",
                "Saved:".yellow().bold(),
                short_id(&report),
                pending
            );
        }
    }
    Ok(())
}

pub fn report_list(json: bool) -> Result<()> {
    let config = get_config();
    let (_, reports) = open_stores(config)?;
    let all = reports.list_all(config.server.tenant_id.as_deref())?;

    if json {
        let items: Vec<serde_json::Value> = all
            .iter()
            .map(|r| {
                json!({
                    "report": r,
                    "can_edit": reports.is_editable(r),
                })
            })
            .collect();
        println!("{}", json!(items));
        return Ok(());
    }

    if all.is_empty() {
        println!("No local reports");
        return Ok(());
    }

    for report in &all {
        let sync_marker = if report.synced {
            "synced".green()
        } else {
            "pending".yellow()
        };
        let edit_marker = if reports.is_editable(report) {
            format!("editable {}h", reports.remaining_edit_hours(report))
                .cyan()
                .to_string()
        } else {
            "locked".dimmed().to_string()
        };
        println!(
            "{}  {}  {:<20}  {:>5.1}h  [{}] [{}]",
            short_id(report),
            report.data.work_date,
            report.data.customer,
            report.data.total_hours,
            sync_marker,
            edit_marker
        );
    }
    Ok(())
}

pub fn report_show(id: &str, json: bool) -> Result<()> {
    let config = get_config();
    let (_, reports) = open_stores(config)?;
    let report = resolve_report(&reports, id)?;

    if json {
        println!(
            "{}",
            json!({ "report": report, "can_edit": reports.is_editable(&report) })
        );
        return Ok(());
    }

    println!("{} {}", "Report".bold(), report.local_id);
    println!("  customer:     {}", report.data.customer);
    println!(
        "  project:      {} {}",
        report.data.project_number, report.data.project_name
    );
    println!("  location:     {}", report.data.work_location);
    println!("  date:         {}", report.data.work_date);
    println!("  hours:        {}", report.data.total_hours);
    if !report.data.trade.is_empty() {
        println!("  trade:        {}", report.data.trade);
    }
    if !report.data.work_description.is_empty() {
        println!("  description:  {}", report.data.work_description);
    }
    for line in &report.data.work_lines {
        println!(
            "  line {:>2}:      {} - {} ({}h)",
            line.line_number, line.component, line.work_done, line.hours
        );
    }
    let sync_state = match &report.remote_id {
        Some(remote_id) => format!("synced as {remote_id}"),
        None => "not yet synced".to_string(),
    };
    println!("  sync:         {}", sync_state);
    if reports.is_editable(&report) {
        println!(
            "  edit window:  {} hours remaining",
            reports.remaining_edit_hours(&report)
        );
    } else {
        println!("  edit window:  {}", "expired".dimmed());
    }
    Ok(())
}

pub fn report_edit(id: &str, patch: ReportPatch, json: bool) -> Result<()> {
    let config = get_config();
    let (_, reports) = open_stores(config)?;
    let report = resolve_report(&reports, id)?;

    match reports.update(report.local_id, &patch) {
        Ok(updated) => {
            if json {
                println!("{}", json!({ "report": updated }));
            } else {
                println!("{} report {}", "Updated:".green().bold(), short_id(&updated));
            }
            Ok(())
        }
        Err(ReportError::EditWindowExpired { .. }) => {
            // Distinct outcome: explain instead of suggesting a retry.
            bail!(
                "report {} can no longer be edited: the 36 hour edit window has expired",
                short_id(&report)
            );
        }
        Err(err) => Err(err.into()),
    }
}

pub fn report_remove(id: &str, json: bool) -> Result<()> {
    let config = get_config();
    let (_, reports) = open_stores(config)?;
    let report = resolve_report(&reports, id)?;
    reports.delete(report.local_id)?;
    if json {
        println!("{}", json!({ "deleted": report.local_id }));
    } else {
        println!("{} report {}", "Deleted:".red().bold(), short_id(&report));
    }
    Ok(())
}

pub async fn sync_now(json: bool) -> Result<()> {
    let config = get_config();
    let (queue, reports) = open_stores(config)?;
    let backend = build_backend(config)?;
    let connectivity = build_connectivity(config)?;

    let dispatcher = SyncDispatcher::new(queue.clone(), reports, backend, connectivity);
    let outcome = dispatcher.flush().await?;
    let pending = queue.pending_count()?;

    if json {
        println!(
            "{}",
            json!({
                "succeeded": outcome.succeeded,
                "failed": outcome.failed,
                "pending": pending,
            })
        );
        return Ok(());
    }

    if outcome.succeeded == 0 && outcome.failed == 0 && pending > 0 {
        println!(
            "{} {} mutation(s) still pending (offline or nothing accepted)",
            "Sync:".yellow().bold(),
            pending
        );
    } else {
        println!(
            "{} {} succeeded, {} failed, {} pending",
            "Sync:".green().bold(),
            outcome.succeeded,
            outcome.failed,
            pending
        );
    }
    Ok(())
}

pub fn sync_status(json: bool) -> Result<()> {
    let config = get_config();
    let (queue, _) = open_stores(config)?;
    let pending = queue.peek_all()?;
    let dead = queue.dead_letters()?;

    if json {
        println!("{}", json!({ "pending": pending, "dead_letters": dead }));
        return Ok(());
    }

    println!("{} {} pending mutation(s)", "Queue:".bold(), pending.len());
    for mutation in &pending {
        println!(
            "  {}  {}  retries: {}",
            mutation.id.to_string()[..8].dimmed(),
            mutation.kind.as_str(),
            mutation.retry_count
        );
    }
    if !dead.is_empty() {
        println!(
            "{} {} dropped mutation(s) that never reached the server",
            "Dead letters:".red().bold(),
            dead.len()
        );
        for letter in &dead {
            println!(
                "  {}  {}  {}",
                letter.mutation.id.to_string()[..8].dimmed(),
                letter.mutation.kind.as_str(),
                letter.reason
            );
        }
    }
    Ok(())
}

pub fn sync_clear(force: bool, json: bool) -> Result<()> {
    let config = get_config();
    let (queue, _) = open_stores(config)?;
    let pending = queue.pending_count()?;
    let dead = queue.dead_letters()?.len();

    if pending > 0 && !force {
        bail!("{pending} mutation(s) pending; pass --force to drop them permanently");
    }

    queue.clear()?;
    queue.clear_dead_letters()?;
    if json {
        println!("{}", json!({ "cleared": pending, "dead_letters": dead }));
    } else {
        println!(
            "{} dropped {} pending and {} dead-lettered mutation(s)",
            "Cleared:".red().bold(),
            pending,
            dead
        );
    }
    Ok(())
}

fn short_id(report: &LocalReport) -> String {
    report.local_id.to_string()[..8].to_string()
}
