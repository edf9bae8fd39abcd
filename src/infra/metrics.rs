// ============================================================
// Layer 6 — Metrics Sinks and Logs
// ============================================================
// Two kinds of metric output:
//
//   CsvScalarSink  — streamed during training, one row per
//                    (tag, value, global step) triple.
//                    Output file: <dir>/scalars.csv
//
//   FoldHistoryLog — written once after all folds finish,
//                    one row per (fold, epoch).
//                    Output file: <dir>/cv_metrics.csv
//
// Example scalars.csv:
//   tag,value,step
//   epoch,1.000000,0
//   train_loss,0.693100,0
//   ...
//
// Example cv_metrics.csv:
//   fold,epoch,train_loss,train_acc,val_loss,val_acc,lr
//   1,1,0.693100,0.512000,0.688400,0.540000,0.000100

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{metrics::FoldHistory, traits::ScalarSink};

/// Appends scalars to a CSV file.
pub struct CsvScalarSink {
    csv_path: PathBuf,
}

impl CsvScalarSink {
    /// Create a sink writing to `<dir>/scalars.csv`.
    /// Writes the header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "tag,value,step")?;
            tracing::debug!("Created scalar CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl ScalarSink for CsvScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{tag},{value:.6},{step}")?;
        Ok(())
    }
}

/// Keeps every scalar in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(String, f64, u64)>,
}

impl MemorySink {
    /// Values logged under `tag`, in arrival order, with their steps.
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.records
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, s)| (*s, *v))
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.records.push((tag.to_string(), value, step));
        Ok(())
    }
}

/// Writes the fold-tagged history of a whole run.
pub struct FoldHistoryLog;

impl FoldHistoryLog {
    pub fn write(histories: &[FoldHistory], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;

        writeln!(f, "fold,epoch,train_loss,train_acc,val_loss,val_acc,lr")?;
        for history in histories {
            for m in &history.epochs {
                writeln!(
                    f,
                    "{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
                    history.fold,
                    m.epoch,
                    m.train_loss,
                    m.train_accuracy,
                    m.val_loss,
                    m.val_accuracy,
                    m.learning_rate,
                )?;
            }
        }

        tracing::info!("Wrote cross-validation history to '{}'", path.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{EpochMetrics, PassStats};

    #[test]
    fn test_csv_sink_appends_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = CsvScalarSink::new(tmp.path()).unwrap();
        sink.add_scalar("train_loss", 0.5, 0).unwrap();
        sink.add_scalar("val_acc", 0.25, 1).unwrap();

        let text = fs::read_to_string(sink.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["tag,value,step", "train_loss,0.500000,0", "val_acc,0.250000,1"]);
    }

    #[test]
    fn test_csv_sink_keeps_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        CsvScalarSink::new(tmp.path()).unwrap().add_scalar("a", 1.0, 0).unwrap();
        CsvScalarSink::new(tmp.path()).unwrap().add_scalar("a", 2.0, 1).unwrap();

        let text = fs::read_to_string(tmp.path().join("scalars.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_memory_sink_series() {
        let mut sink = MemorySink::default();
        sink.add_scalar("val_acc", 0.1, 0).unwrap();
        sink.add_scalar("val_loss", 2.0, 0).unwrap();
        sink.add_scalar("val_acc", 0.2, 1).unwrap();
        assert_eq!(sink.series("val_acc"), vec![(0, 0.1), (1, 0.2)]);
    }

    #[test]
    fn test_history_log_rows() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cv_metrics.csv");
        let row  = |e| EpochMetrics::new(e, PassStats::new(1.0, 0.5), PassStats::new(0.9, 0.6), 0.001);
        let histories = vec![
            FoldHistory { fold: 1, epochs: vec![row(1), row(2)] },
            FoldHistory { fold: 2, epochs: vec![row(1)] },
        ];
        FoldHistoryLog::write(&histories, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "fold,epoch,train_loss,train_acc,val_loss,val_acc,lr");
        assert_eq!(lines[3], "2,1,1.000000,0.500000,0.900000,0.600000,0.001000");
    }
}
