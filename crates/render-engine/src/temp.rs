//! Per-run temp workspace for staged artifacts (pre-rendered frames).
//!
//! One directory per export run, created lazily under the configured temp
//! root. [`TempWorkspace::release`] deletes it at most once per run; later
//! calls return the recorded report. With `keep_temp_files` the directory
//! is left on disk for inspection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use qcut_common::error::{QcutError, QcutResult};
use serde::Serialize;

/// What a release did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// The run directory, if it was ever created.
    pub dir: Option<PathBuf>,
    pub files_tracked: usize,
    pub dir_removed: bool,
    /// Deletion skipped because `keep_temp_files` is set.
    pub kept: bool,
    /// Removal error, if any. The run result is not affected by it.
    pub error: Option<String>,
}

/// Shared handle to a run's temp directory.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    run_name: String,
    keep_temp_files: bool,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    released: Option<CleanupReport>,
    release_count: usize,
}

impl TempWorkspace {
    /// Workspace under `root`. Nothing touches the disk until first use.
    pub fn new(root: impl Into<PathBuf>, keep_temp_files: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                run_name: format!("qcut-export-{}", uuid::Uuid::new_v4()),
                keep_temp_files,
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Path the run directory has (or will have).
    pub fn planned_dir(&self) -> PathBuf {
        self.inner.root.join(&self.inner.run_name)
    }

    /// The run directory, created on first call.
    pub fn dir(&self) -> QcutResult<PathBuf> {
        let mut state = self.state();
        Self::ensure_dir(&self.inner, &mut state)
    }

    fn ensure_dir(inner: &Inner, state: &mut State) -> QcutResult<PathBuf> {
        if state.released.is_some() {
            return Err(QcutError::render("temp workspace already released"));
        }
        if let Some(dir) = &state.dir {
            return Ok(dir.clone());
        }
        let dir = inner.root.join(&inner.run_name);
        std::fs::create_dir_all(&dir).map_err(|e| {
            QcutError::render(format!(
                "failed to create temp workspace {}: {e}",
                dir.display()
            ))
        })?;
        tracing::debug!(dir = %dir.display(), "Temp workspace created");
        state.dir = Some(dir.clone());
        Ok(dir)
    }

    /// Reserve a file path (relative to the run directory), creating parent
    /// directories. The file itself is written by the caller.
    pub fn allocate(&self, relative: impl AsRef<Path>) -> QcutResult<PathBuf> {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            return Err(QcutError::render(format!(
                "temp allocation must be relative: {}",
                relative.display()
            )));
        }

        let mut state = self.state();
        let dir = Self::ensure_dir(&self.inner, &mut state)?;
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        state.files.push(path.clone());
        Ok(path)
    }

    pub fn allocated_files(&self) -> usize {
        self.state().files.len()
    }

    pub fn keep_temp_files(&self) -> bool {
        self.inner.keep_temp_files
    }

    /// Delete the run directory. Only the first call does anything.
    pub fn release(&self) -> CleanupReport {
        let mut state = self.state();
        if let Some(report) = &state.released {
            tracing::debug!("Temp workspace already released");
            return report.clone();
        }

        let mut report = CleanupReport {
            dir: state.dir.clone(),
            files_tracked: state.files.len(),
            ..CleanupReport::default()
        };

        match &state.dir {
            Some(dir) if self.inner.keep_temp_files => {
                report.kept = true;
                tracing::info!(dir = %dir.display(), "Keeping temp files");
            }
            Some(dir) => match std::fs::remove_dir_all(dir) {
                Ok(()) => {
                    report.dir_removed = true;
                    tracing::debug!(dir = %dir.display(), files = report.files_tracked, "Temp workspace removed");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.dir_removed = true;
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove temp workspace");
                    report.error = Some(e.to_string());
                }
            },
            None => {}
        }

        state.release_count += 1;
        state.released = Some(report.clone());
        report
    }

    pub fn is_released(&self) -> bool {
        self.state().released.is_some()
    }

    /// Number of releases that actually ran (0 or 1).
    pub fn release_count(&self) -> usize {
        self.state().release_count
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.released.is_some() || self.keep_temp_files {
            return;
        }
        if let Some(dir) = &state.dir {
            tracing::warn!(dir = %dir.display(), "Temp workspace dropped without release");
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        std::env::temp_dir().join("qcut_temp_tests")
    }

    #[test]
    fn test_lazy_creation() {
        let workspace = TempWorkspace::new(root(), false);
        assert!(!workspace.planned_dir().exists());

        let path = workspace.allocate("frames/a.png").unwrap();
        assert!(path.parent().unwrap().exists());
        assert_eq!(workspace.allocated_files(), 1);

        workspace.release();
        assert!(!workspace.planned_dir().exists());
    }

    #[test]
    fn test_release_runs_once() {
        let workspace = TempWorkspace::new(root(), false);
        let dir = workspace.dir().unwrap();
        std::fs::write(dir.join("x.bin"), b"x").unwrap();

        let first = workspace.release();
        let second = workspace.clone().release();
        assert!(first.dir_removed);
        assert_eq!(first, second);
        assert_eq!(workspace.release_count(), 1);
        assert!(workspace.allocate("late.png").is_err());
    }

    #[test]
    fn test_release_without_dir() {
        let workspace = TempWorkspace::new(root(), false);
        let report = workspace.release();
        assert_eq!(report.dir, None);
        assert!(!report.dir_removed);
        assert_eq!(workspace.release_count(), 1);
    }

    #[test]
    fn test_keep_temp_files() {
        let workspace = TempWorkspace::new(root(), true);
        let dir = workspace.dir().unwrap();
        let report = workspace.release();
        assert!(report.kept);
        assert!(dir.exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_drop_without_release_cleans_up() {
        let dir = {
            let workspace = TempWorkspace::new(root(), false);
            workspace.dir().unwrap()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_absolute_allocation_rejected() {
        let workspace = TempWorkspace::new(root(), false);
        assert!(workspace.allocate("/etc/passwd").is_err());
    }
}
