//! User-facing console output
//!
//! Diagnostics go through `tracing`; everything here is meant for the person
//! running the command.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use colored::{Color, Colorize};
use tabled::{settings::Style, Table, Tabled};

use crate::errors::PilotError;
use crate::models::deployment::{Deployment, ResourceStatus};

/// Prefix colors, assigned round-robin on first use
const PALETTE: [Color; 5] = [Color::Cyan, Color::Magenta, Color::Blue, Color::Yellow, Color::Green];

/// Hands out one prefixed logger per name
#[derive(Clone, Default)]
pub struct LoggerFactory {
    loggers: Arc<Mutex<HashMap<String, ResourceLogger>>>,
}

impl LoggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger for `name`, created on first use
    pub fn get(&self, name: &str) -> ResourceLogger {
        let mut loggers = match self.loggers.lock() {
            Ok(loggers) => loggers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = loggers.len();
        loggers
            .entry(name.to_string())
            .or_insert_with(|| ResourceLogger::new(name, PALETTE[next % PALETTE.len()]))
            .clone()
    }
}

/// Writes lines prefixed with `[name]` in the logger's color
#[derive(Debug, Clone)]
pub struct ResourceLogger {
    name: String,
    color: Color,
}

impl ResourceLogger {
    pub fn new(name: &str, color: Color) -> Self {
        Self {
            name: name.to_string(),
            color,
        }
    }

    /// Logger with a dimmed prefix, used for stopped containers
    pub fn dimmed(name: &str) -> Self {
        Self::new(name, Color::BrightBlack)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn prefix(&self) -> String {
        format!("[{}]", self.name).color(self.color).to_string()
    }

    pub fn line(&self, msg: &str) {
        println!("{} {}", self.prefix(), msg);
    }

    pub fn info(&self, msg: &str) {
        println!("{} {}", self.prefix(), msg.blue());
    }

    pub fn start(&self, msg: &str) {
        println!("{} {}", self.prefix(), format!("⧗ {}", msg).cyan());
    }

    pub fn succeed(&self, msg: &str) {
        println!("{} {}", self.prefix(), format!("✔ {}", msg).green());
    }

    pub fn warn(&self, msg: &str) {
        println!("{} {}", self.prefix(), format!("⚠ {}", msg).yellow());
    }

    pub fn fail(&self, msg: &str) {
        eprintln!("{} {}", self.prefix(), format!("✖ {}", msg).red());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", self.prefix(), msg.red());
    }
}

/// Print a success line
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error line
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning line
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

/// User-facing text of a fatal error
pub fn describe_error(err: &PilotError) -> String {
    if err.is_connection_refused() {
        return format!(
            "could not connect to Docker, check that the engine is running and the profile host is right ({})",
            err
        );
    }
    match err {
        PilotError::NotFound(msg) => format!("container not found: {}", msg),
        other => other.to_string(),
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Render the resource table of a deployment
pub fn summary_table(deployment: &Deployment) -> String {
    let rows: Vec<SummaryRow> = deployment
        .resources
        .iter()
        .map(|record| SummaryRow {
            resource: record.name.clone(),
            version: record.version.clone(),
            status: colored_status(record.status),
            url: record.extra.display_url().unwrap_or("-").to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the end-of-deploy summary
pub fn print_summary(deployment: &Deployment) {
    let title = format!("Deployment Summary ({})", deployment.status);
    println!();
    println!("{}", title.bold());
    println!("{}", summary_table(deployment));
}

/// Status text colored by outcome
pub fn colored_status(status: ResourceStatus) -> String {
    let text = status.as_str();
    match status {
        ResourceStatus::Success => text.green().to_string(),
        ResourceStatus::Error | ResourceStatus::Failed => text.red().to_string(),
        ResourceStatus::Rollback => text.yellow().to_string(),
        ResourceStatus::Processing => text.blue().to_string(),
        ResourceStatus::Skipped => text.bright_black().to_string(),
        ResourceStatus::Pending => text.to_string(),
    }
}
