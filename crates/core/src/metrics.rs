//! Lightweight metrics recorder (JSONL) for disentanglement runs.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::assignment::MatchRoutine;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: MetricsFormat,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output: None,
            format: MetricsFormat::JsonLines,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsFormat {
    #[default]
    JsonLines,
}

pub struct MetricsRecorder {
    writer: Mutex<Box<dyn Write + Send>>,
    format: MetricsFormat,
}

impl MetricsRecorder {
    pub fn new(path: &Path, format: MetricsFormat) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(file), format))
    }

    /// Record into an arbitrary sink, e.g. an in-memory buffer.
    pub fn from_writer(writer: Box<dyn Write + Send>, format: MetricsFormat) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
        }
    }

    pub fn emit(&self, event: MetricsEvent) {
        if let Err(err) = self.write_event(event) {
            log::warn!("[metrics] failed to write event: {err}");
        }
    }

    fn write_event(&self, event: MetricsEvent) -> io::Result<()> {
        match self.format {
            MetricsFormat::JsonLines => {
                let envelope = EventEnvelope {
                    timestamp_ms: now_millis(),
                    event,
                };
                let mut guard = self.writer.lock();
                serde_json::to_writer(&mut *guard, &envelope)?;
                guard.write_all(b"\n")?;
                guard.flush()
            }
        }
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EventEnvelope {
    timestamp_ms: f64,
    #[serde(flatten)]
    event: MetricsEvent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    DisentangleStart {
        routine: MatchRoutine,
        k_points: usize,
        bands: usize,
        threshold: f64,
    },
    StepMatched {
        k_index: usize,
        broken: usize,
        min_overlap: f64,
        total_weight: f64,
    },
    DisentangleDone {
        working_slots: usize,
        retired_tracks: usize,
        duration_ms: f64,
    },
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

impl MetricsConfig {
    pub fn build_recorder(&self) -> io::Result<Option<MetricsRecorder>> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.output.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "metrics.output must be set when metrics are enabled",
            )
        })?;
        MetricsRecorder::new(path, self.format).map(Some)
    }
}
