//! Topology-change trigger file.
//!
//! Touching the file (any modification time change, including creation or
//! removal) is the operator's way to force a topology notification.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Watches the modification time of one file
#[derive(Debug)]
pub struct TriggerFile {
    path: PathBuf,
    last: Option<SystemTime>,
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

impl TriggerFile {
    /// Start watching `path` from its current state
    pub async fn new(path: PathBuf) -> Self {
        let last = modified(&path).await;
        Self { path, last }
    }

    /// Watched path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file changed since the previous poll
    pub async fn poll(&mut self) -> bool {
        let current = modified(&self.path).await;
        if current == self.last {
            return false;
        }
        debug!("Trigger file {:?} changed", self.path);
        self.last = current;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_touch_is_detected_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology_change");
        let mut trigger = TriggerFile::new(path.clone()).await;
        assert!(!trigger.poll().await);

        let file = std::fs::File::create(&path).unwrap();
        assert!(trigger.poll().await);
        assert!(!trigger.poll().await);

        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
        assert!(trigger.poll().await);
        assert!(!trigger.poll().await);

        std::fs::remove_file(&path).unwrap();
        assert!(trigger.poll().await);
        assert_eq!(trigger.path(), path.as_path());
    }
}
