//! Prompt/response side-channel log (§6.4, rotation policy per §6.8).
//!
//! One JSON-Lines entry per LLM call. Size-based rotation (10 MiB, keep
//! 5 generations) — a plain `std::fs` rolling writer rather than
//! `tracing-appender` (which the pack's other examples reach for
//! elsewhere), because `tracing-appender`'s time-based rotation doesn't
//! express a size-triggered generation count; this is a narrow enough
//! concern that hand-rolling it is simpler than bending a time-based
//! rotator to a size policy. Failures here are swallowed — this channel
//! must never mask or preempt a real pipeline error.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bench_core::types::ids::{RunId, TraitId};
use bench_core::types::scale::ScaleOrder;
use serde::Serialize;

const MAX_BYTES: u64 = 10 * 1024 * 1024;
const MAX_GENERATIONS: u32 = 5;

#[derive(Debug, Serialize)]
pub struct PromptLogEntry<'a> {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub run_id: RunId,
    pub persona: &'a str,
    pub case: TraitId,
    pub scale: ScaleOrder,
    pub attempt: u32,
    pub model: &'a str,
    pub prompt: &'a str,
    pub response: &'a str,
    pub rating: Option<u8>,
    pub gen_ms: u64,
    pub ok: bool,
    pub error: Option<&'a str>,
}

struct Inner {
    dir: PathBuf,
    file_stem: String,
    file: File,
    bytes_written: u64,
}

/// Rotating JSON-Lines writer, guarded by a mutex so concurrent pipeline
/// workers can log without interleaving lines.
pub struct PromptResponseLog {
    inner: Mutex<Option<Inner>>,
}

impl PromptResponseLog {
    /// Opens (creating if needed) `dir/prompt_log.jsonl`. Returns an
    /// instance even if the directory can't be created yet — writes are
    /// retried lazily and simply no-op on persistent failure.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let inner = Self::open_inner(&dir).ok();
        Self { inner: Mutex::new(inner) }
    }

    /// A log that never writes anywhere — used when `PROMPT_LOG_ENABLED`
    /// is off, so call sites don't need an `Option<PromptResponseLog>`.
    pub fn disabled() -> Self {
        Self { inner: Mutex::new(None) }
    }

    fn open_inner(dir: &Path) -> std::io::Result<Inner> {
        fs::create_dir_all(dir)?;
        let path = dir.join("prompt_log.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Inner { dir: dir.to_path_buf(), file_stem: "prompt_log".to_string(), file, bytes_written })
    }

    pub fn log(&self, entry: &PromptLogEntry<'_>) {
        let Ok(mut guard) = self.inner.lock() else { return };
        let Some(inner) = guard.as_mut() else { return };

        let Ok(mut line) = serde_json::to_string(entry) else { return };
        line.push('\n');

        if inner.bytes_written + line.len() as u64 > MAX_BYTES {
            if rotate(inner).is_err() {
                return;
            }
        }

        if inner.file.write_all(line.as_bytes()).is_ok() {
            inner.bytes_written += line.len() as u64;
        }
    }
}

fn rotate(inner: &mut Inner) -> std::io::Result<()> {
    let base = inner.dir.join(format!("{}.jsonl", inner.file_stem));

    for gen in (1..MAX_GENERATIONS).rev() {
        let from = inner.dir.join(format!("{}.{}.jsonl", inner.file_stem, gen));
        let to = inner.dir.join(format!("{}.{}.jsonl", inner.file_stem, gen + 1));
        if from.exists() {
            let _ = fs::rename(&from, &to);
        }
    }
    if base.exists() {
        let _ = fs::rename(&base, inner.dir.join(format!("{}.1.jsonl", inner.file_stem)));
    }

    inner.file = OpenOptions::new().create(true).append(true).open(&base)?;
    inner.bytes_written = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(run_id: RunId) -> PromptLogEntry<'static> {
        PromptLogEntry {
            ts: chrono::Utc::now(),
            run_id,
            persona: "p1",
            case: TraitId(1),
            scale: ScaleOrder::In,
            attempt: 1,
            model: "test-model",
            prompt: "prompt text",
            response: "{\"rating\":3}",
            rating: Some(3),
            gen_ms: 42,
            ok: true,
            error: None,
        }
    }

    #[test]
    fn logs_one_line_per_call() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PromptResponseLog::open(tmp.path());
        log.log(&entry(RunId(1)));
        log.log(&entry(RunId(1)));
        let contents = std::fs::read_to_string(tmp.path().join("prompt_log.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn disabled_log_never_writes() {
        let log = PromptResponseLog::disabled();
        log.log(&entry(RunId(1)));
    }

    #[test]
    fn rotation_triggers_past_size_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PromptResponseLog::open(tmp.path());
        {
            let mut guard = log.inner.lock().unwrap();
            guard.as_mut().unwrap().bytes_written = MAX_BYTES;
        }
        log.log(&entry(RunId(1)));
        assert!(tmp.path().join("prompt_log.1.jsonl").exists());
        assert!(tmp.path().join("prompt_log.jsonl").exists());
    }
}
