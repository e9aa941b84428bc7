//! Build progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. The
//! human form is one line per event; the JSON form is one object per line.

use std::io::Write;
use std::path::PathBuf;

/// A single progress event emitted by the build pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildProgressEvent {
    /// Listing the data directory. Total unknown.
    Discovering { dir: PathBuf },
    /// Documents have been sliced.
    Slicing { documents: u64, slices: u64 },
    /// `n` of `total` slices embedded so far.
    Embedding { n: u64, total: u64 },
    /// All vectors are in; the archive is being written.
    Writing { path: PathBuf },
}

/// Receives build progress. Called from inside the build pipeline.
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build  embedding  1,234 / 5,000 slices".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Discovering { dir } => {
                format!("build  discovering {}...\n", dir.display())
            }
            BuildProgressEvent::Slicing { documents, slices } => format!(
                "build  sliced {} documents into {} slices\n",
                format_number(*documents),
                format_number(*slices)
            ),
            BuildProgressEvent::Embedding { n, total } => format!(
                "build  embedding  {} / {} slices\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Writing { path } => {
                format!("build  writing {}\n", path.display())
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Discovering { dir } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "dir": dir.display().to_string(),
            }),
            BuildProgressEvent::Slicing { documents, slices } => serde_json::json!({
                "event": "progress",
                "phase": "slicing",
                "documents": documents,
                "slices": slices,
            }),
            BuildProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total,
            }),
            BuildProgressEvent::Writing { path } => serde_json::json!({
                "event": "progress",
                "phase": "writing",
                "path": path.display().to_string(),
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
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

/// Group digits in threes: `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
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
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(65_432), "65,432");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn reporter_matches_mode() {
        // Smoke: every mode yields a reporter that accepts every event.
        for mode in [ProgressMode::Off, ProgressMode::Human, ProgressMode::Json] {
            let reporter = mode.reporter();
            reporter.report(BuildProgressEvent::Embedding { n: 1, total: 2 });
        }
    }
}
