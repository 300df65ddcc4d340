//! Container log snapshot and follow

use std::future::Future;
use std::sync::Arc;

use colored::Colorize;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::console::{LoggerFactory, ResourceLogger};
use crate::errors::PilotError;
use crate::models::resource::full_name;
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSummary, LogChunk};

/// Which containers to read and how much
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Lines of history per container
    pub tail: usize,

    /// Keep streaming new output
    pub follow: bool,

    /// Include stopped containers
    pub all: bool,

    /// Restrict to these resources
    pub resources: Vec<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            tail: 100,
            follow: false,
            all: false,
            resources: Vec::new(),
        }
    }
}

/// Splits raw output into lines, holding back a trailing partial line
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete, non-blank lines contained in `bytes` plus what was pending
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever partial line is left
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim_end_matches(['\n', '\r']);
        (!rest.trim().is_empty()).then(|| rest.to_string())
    }
}

/// Stack containers matching `options`, sorted by name
pub async fn select_containers(
    runtime: &dyn ContainerRuntime,
    stack: &str,
    options: &StreamOptions,
) -> Result<Vec<ContainerSummary>, PilotError> {
    let prefixes: Vec<String> = options
        .resources
        .iter()
        .map(|name| format!("{}-", full_name(name, stack)))
        .collect();

    let mut containers: Vec<ContainerSummary> = runtime
        .list_containers(&ContainerFilter::stack(stack))
        .await?
        .into_iter()
        .filter(|c| options.all || c.is_running())
        .filter(|c| prefixes.is_empty() || prefixes.iter().any(|p| c.name.starts_with(p.as_str())))
        .collect();
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(containers)
}

/// Prefix logger for a container; stopped ones are grey and show their state
fn logger_for(loggers: &LoggerFactory, container: &ContainerSummary) -> ResourceLogger {
    if container.is_running() {
        loggers.get(&container.name)
    } else {
        ResourceLogger::dimmed(&format!("{} ({})", container.name, container.state))
    }
}

/// Line-buffered printer for one container's stdout and stderr
struct ContainerPrinter {
    logger: ResourceLogger,
    stdout: LineBuffer,
    stderr: LineBuffer,
    printed: usize,
}

impl ContainerPrinter {
    fn new(logger: ResourceLogger) -> Self {
        Self {
            logger,
            stdout: LineBuffer::new(),
            stderr: LineBuffer::new(),
            printed: 0,
        }
    }

    fn write(&mut self, chunk: &LogChunk) {
        let lines = match chunk {
            LogChunk::Stdout(bytes) => self.stdout.push(bytes),
            LogChunk::Stderr(bytes) => self.stderr.push(bytes),
        };
        for line in lines {
            self.logger.line(&line);
            self.printed += 1;
        }
    }

    fn flush(&mut self) {
        let rest: Vec<String> = [self.stdout.flush(), self.stderr.flush()].into_iter().flatten().collect();
        for line in rest {
            self.logger.line(&line);
            self.printed += 1;
        }
    }
}

/// Print the last `tail` lines of each container under a header; returns the line count
pub async fn snapshot(
    runtime: &dyn ContainerRuntime,
    containers: &[ContainerSummary],
    tail: usize,
    loggers: &LoggerFactory,
) -> Result<usize, PilotError> {
    let mut total = 0;
    for container in containers {
        println!("{}", format!("==> {} ({}) <==", container.name, container.state).bold());

        let mut printer = ContainerPrinter::new(logger_for(loggers, container));
        for chunk in runtime.logs(&container.id, tail).await? {
            printer.write(&chunk);
        }
        printer.flush();
        total += printer.printed;
    }
    Ok(total)
}

/// Stream every container until all streams end or `shutdown` resolves.
///
/// One stream ending or failing leaves the others running. On shutdown every
/// stream flushes its partial lines and closes. Returns the line count.
pub async fn follow<F>(
    runtime: Arc<dyn ContainerRuntime>,
    containers: Vec<ContainerSummary>,
    tail: usize,
    loggers: &LoggerFactory,
    shutdown: F,
) -> Result<usize, PilotError>
where
    F: Future<Output = ()>,
{
    let (stop_tx, _) = broadcast::channel::<()>(1);
    let mut set = JoinSet::new();

    for container in containers {
        let mut printer = ContainerPrinter::new(logger_for(loggers, &container));
        let mut stream = runtime.follow_logs(&container.id, tail);
        let mut stop_rx = stop_tx.subscribe();

        set.spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    item = stream.next() => match item {
                        Some(Ok(chunk)) => printer.write(&chunk),
                        Some(Err(e)) => {
                            warn!("Log stream of {} failed: {}", container.name, e);
                            break;
                        }
                        None => {
                            debug!("Log stream of {} ended", container.name);
                            break;
                        }
                    },
                }
            }
            printer.flush();
            printer.printed
        });
    }

    let mut total = 0;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Stopping log streams");
                let _ = stop_tx.send(());
                break;
            }
            joined = set.join_next() => match joined {
                Some(Ok(printed)) => total += printed,
                Some(Err(e)) => warn!("Log task failed: {}", e),
                None => return Ok(total),
            },
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(printed) => total += printed,
            Err(e) => warn!("Log task failed: {}", e),
        }
    }
    Ok(total)
}
