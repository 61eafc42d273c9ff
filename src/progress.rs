//! Build progress reporting.
//!
//! `convo index` reports which phase the build is in and how many archive
//! files are done. Lines go to **stderr** so stdout stays parseable and the
//! MCP stdio channel is never polluted.

use std::io::Write;

/// A single progress event emitted by [`SearchIndex::build`](crate::index::SearchIndex::build).
#[derive(Clone, Debug, PartialEq)]
pub enum BuildProgressEvent {
    /// Archive listing finished.
    Discovered { files: u64 },
    /// A batch was written; `n` of `total` files are processed.
    Batch { batch: u64, n: u64, total: u64 },
    /// Relational ingestion is done and the fuzzy snapshot is being built.
    Snapshotting,
}

/// Receives build progress.
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "index  batch 3  150 / 1,204 files".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Discovered { files } => {
                format!("index  discovered {} files\n", format_number(*files))
            }
            BuildProgressEvent::Batch { batch, n, total } => format!(
                "index  batch {}  {} / {} files\n",
                batch,
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Snapshotting => "index  building fuzzy snapshot...\n".to_string(),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &BuildProgressEvent) -> serde_json::Value {
        match event {
            BuildProgressEvent::Discovered { files } => serde_json::json!({
                "event": "progress",
                "phase": "discovered",
                "files": files
            }),
            BuildProgressEvent::Batch { batch, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "batch": batch,
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Snapshotting => serde_json::json!({
                "event": "progress",
                "phase": "snapshotting"
            }),
        }
    }
}

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_batch_event_carries_counts() {
        let value = JsonProgress::to_json(&BuildProgressEvent::Batch {
            batch: 2,
            n: 100,
            total: 120,
        });
        assert_eq!(value["phase"], "ingesting");
        assert_eq!(value["n"], 100);
        assert_eq!(value["total"], 120);
    }
}
