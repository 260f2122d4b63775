use super::{SampleSender, SampleSource, SensorInput};
use crate::error::SensorError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest pause honoured between two recorded samples
const MAX_REPLAY_GAP: Duration = Duration::from_secs(1);

/// Plays back a JSON-lines capture, one [`SensorInput`] per line
///
/// Blank lines and lines starting with `#` are ignored. A malformed line is logged
/// and skipped.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    realtime: bool,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
        }
    }

    /// Reproduce the recorded spacing between samples (default) or replay at full speed
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse one record; `Ok(None)` for lines that carry no sample
    pub fn parse_line(line: &str, line_number: usize) -> Result<Option<SensorInput>, SensorError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| SensorError::Parse {
                line: line_number,
                details: e.to_string(),
            })
    }

    fn open(&self) -> Result<File, SensorError> {
        File::open(&self.path).map_err(|e| SensorError::SourceOpen {
            source_name: self.path.display().to_string(),
            details: e.to_string(),
        })
    }
}

impl SampleSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn check_available(&self) -> Result<(), SensorError> {
        if !self.path.is_file() {
            return Err(SensorError::Unavailable(format!(
                "recording {} not found",
                self.path.display()
            )));
        }
        self.open().map(|_| ())
    }

    fn run(
        self: Box<Self>,
        output: SampleSender,
        token: CancellationToken,
    ) -> Result<(), SensorError> {
        let reader = BufReader::new(self.open()?);
        info!(path = %self.path.display(), realtime = self.realtime, "Replaying recording");

        let mut previous_timestamp: Option<i64> = None;
        let mut replayed = 0u64;
        let mut skipped = 0u64;

        for (index, line) in reader.lines().enumerate() {
            if token.is_cancelled() {
                break;
            }

            let line = line.map_err(|e| SensorError::SourceOpen {
                source_name: self.path.display().to_string(),
                details: e.to_string(),
            })?;

            let input = match Self::parse_line(&line, index + 1) {
                Ok(Some(input)) => input,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping record: {}", e);
                    skipped += 1;
                    continue;
                }
            };

            if self.realtime {
                if let Some(previous) = previous_timestamp {
                    let gap = input.timestamp_nanos().saturating_sub(previous);
                    if gap > 0 {
                        std::thread::sleep(Duration::from_nanos(gap as u64).min(MAX_REPLAY_GAP));
                    }
                }
                previous_timestamp = Some(input.timestamp_nanos());
            }

            let delivered = if self.realtime {
                output.push(input)
            } else {
                output.push_blocking(input, &token)
            };
            if !delivered {
                break;
            }
            replayed += 1;
        }

        debug!(replayed, skipped, "Replay finished");
        Ok(())
    }
}
