//! Screenshot capture policy with bounded retention.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use crate::settings::ScreenshotMode;

/// What triggered the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A key transition (page loaded, before clicking next, ...).
    Step,
    /// An ambiguous, risky or error state worth inspecting by hand.
    Problem,
}

#[derive(Debug, Clone)]
pub struct ScreenshotPolicy {
    pub mode: ScreenshotMode,
    pub dir: PathBuf,
    /// Oldest files beyond this count are deleted after each capture.
    pub retention: usize,
}

impl ScreenshotPolicy {
    pub fn disabled() -> Self {
        Self {
            mode: ScreenshotMode::None,
            dir: PathBuf::from("./screenshots"),
            retention: 0,
        }
    }

    pub fn should_capture(&self, event: CaptureEvent) -> bool {
        match self.mode {
            ScreenshotMode::None => false,
            ScreenshotMode::Problems => event == CaptureEvent::Problem,
            ScreenshotMode::Steps | ScreenshotMode::All => true,
        }
    }

    /// Write the PNG and prune the directory down to the retention bound.
    pub fn save(&self, address: &str, stage: &str, png: &[u8]) {
        if let Err(err) = self.save_inner(address, stage, png) {
            warn!(target: "probe::browser", %err, "failed to save screenshot");
        }
    }

    fn save_inner(&self, address: &str, stage: &str, png: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let safe_address: String = address
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let name = format!(
            "{}_{}_{}.png",
            safe_address,
            stage,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        fs::write(self.dir.join(&name), png)?;
        debug!(target: "probe::browser", screenshot = %name, "captured");
        self.prune()
    }

    fn prune(&self) -> std::io::Result<()> {
        if self.retention == 0 {
            return Ok(());
        }
        let mut files: Vec<_> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "png"))
            .collect();
        if files.len() <= self.retention {
            return Ok(());
        }
        files.sort_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });
        let excess = files.len() - self.retention;
        for entry in files.into_iter().take(excess) {
            fs::remove_file(entry.path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: ScreenshotMode, dir: &std::path::Path, retention: usize) -> ScreenshotPolicy {
        ScreenshotPolicy {
            mode,
            dir: dir.to_path_buf(),
            retention,
        }
    }

    #[test]
    fn mode_gates_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!policy(ScreenshotMode::None, dir.path(), 10).should_capture(CaptureEvent::Problem));
        assert!(policy(ScreenshotMode::Problems, dir.path(), 10).should_capture(CaptureEvent::Problem));
        assert!(!policy(ScreenshotMode::Problems, dir.path(), 10).should_capture(CaptureEvent::Step));
        assert!(policy(ScreenshotMode::All, dir.path(), 10).should_capture(CaptureEvent::Step));
    }

    #[test]
    fn save_prunes_to_retention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy = policy(ScreenshotMode::All, dir.path(), 2);
        for i in 0..4 {
            policy.save("a@example.com", &format!("stage{i}"), b"png");
        }
        let count = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(count, 2);
    }

    #[test]
    fn address_is_sanitized_in_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy = policy(ScreenshotMode::All, dir.path(), 10);
        policy.save("a+b@ex.com", "stage", b"png");
        let entry = fs::read_dir(dir.path())
            .expect("read dir")
            .next()
            .expect("entry")
            .expect("entry");
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("a_b_ex_com_stage_"));
    }
}
