use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::report::StageRecord;

const ROLLUP_LIMIT: usize = 100;

/// JSON-lines timing log. A `_hot.log` roll-up of the slowest spans is written
/// next to it when the last handle is dropped.
#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

#[derive(Default)]
struct SpanTotal {
    ms: f64,
    count: u64,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    spans: HashMap<String, SpanTotal>,
    counts: HashMap<String, u64>,
}

impl PerfState {
    fn add_span(&mut self, name: &str, ms: f64) {
        let total = self.spans.entry(name.to_string()).or_default();
        total.ms += ms;
        total.count = total.count.saturating_add(1);
    }

    fn write_record(&mut self, record: &Value) {
        let _ = writeln!(self.writer, "{record}");
    }
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                spans: HashMap::new(),
                counts: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, subset: Option<usize>, ms: f64) {
        let record = json!({
            "type": "perf.span",
            "name": name,
            "subset": subset,
            "unit": "ms",
            "ms": round_ms(ms),
        });
        if let Ok(mut state) = self.inner.lock() {
            state.add_span(name, ms);
            state.write_record(&record);
        }
    }

    pub fn log_stage(&self, record: &StageRecord, run_offset_ms: f64) {
        let ms = record.elapsed().as_secs_f64() * 1000.0;
        let line = json!({
            "type": "perf.stage",
            "name": record.stage.as_str(),
            "start_ms": round_ms(run_offset_ms),
            "ms": round_ms(ms),
            "outcome": record.outcome.to_string(),
        });
        if let Ok(mut state) = self.inner.lock() {
            state.add_span(&format!("stage.{}", record.stage.as_str()), ms);
            state.write_record(&line);
        }
    }

    pub fn log_counts(&self, name: &str, counts: &[(&str, u64)]) {
        let fields: serde_json::Map<String, Value> = counts
            .iter()
            .map(|(key, value)| ((*key).to_string(), Value::from(*value)))
            .collect();
        let record = json!({
            "type": "perf.counts",
            "name": name,
            "counts": fields,
        });
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let total = state.counts.entry(format!("{name}.{key}")).or_insert(0);
                *total = total.saturating_add(*value);
            }
            state.write_record(&record);
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(rollup_path(&self.path)) else {
            return;
        };
        let mut out = BufWriter::new(file);

        let mut spans: Vec<(&String, &SpanTotal)> = self.spans.iter().collect();
        spans.sort_by(|a, b| b.1.ms.total_cmp(&a.1.ms));
        let mut counts: Vec<(&String, &u64)> = self.counts.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let span_lines = spans.into_iter().take(ROLLUP_LIMIT).map(|(name, total)| {
            json!({
                "type": "perf.hot.span",
                "name": name,
                "ms": round_ms(total.ms),
                "count": total.count,
                "avg_ms": round_ms(total.ms / total.count.max(1) as f64),
            })
        });
        let count_lines = counts.into_iter().take(ROLLUP_LIMIT).map(|(name, value)| {
            json!({
                "type": "perf.hot.count",
                "name": name,
                "value": value,
            })
        });
        for (rank, mut line) in span_lines.enumerate().chain(count_lines.enumerate()) {
            line["rank"] = json!(rank + 1);
            let _ = writeln!(out, "{line}");
        }
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

/// `split.log` rolls up into `split_hot.log` in the same directory.
fn rollup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("fontsplit_perf");
    path.with_file_name(format!("{stem}_hot.log"))
}
