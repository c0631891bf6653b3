use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::outbound::OutboundMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Files treated as per-slug manifests rather than plain content
const MANIFEST_NAMES: [&str; 2] = ["manifest.json", "metadata.json"];

/// Watches a content root and relays external edits to clients as
/// `file-changed` / `manifest-changed` messages. The watcher only
/// observes; manifest mutation goes through the store and its locks.
pub struct ContentWatcher {
    _watcher: PollWatcher,
    _handle: JoinHandle<()>,
}

impl ContentWatcher {
    pub fn start(root: PathBuf, outbound: broadcast::Sender<OutboundMessage>) -> Result<Self> {
        let (tx_fs, rx_fs) = channel();

        let config = notify::Config::default().with_poll_interval(POLL_INTERVAL);
        let mut watcher = PollWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx_fs.send(event);
                }
            },
            config,
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let handle = std::thread::Builder::new()
            .name("content-watcher".to_string())
            .spawn(move || {
                // Exits when the watcher (and with it the sender) drops
                while let Ok(event) = rx_fs.recv() {
                    handle_fs_event(&event, &root, &outbound);
                }
            })?;

        Ok(Self {
            _watcher: watcher,
            _handle: handle,
        })
    }
}

fn handle_fs_event(event: &Event, root: &Path, outbound: &broadcast::Sender<OutboundMessage>) {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return,
    }

    for path in &event.paths {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let display_path = relative.to_string_lossy().to_string();

        let is_manifest = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| MANIFEST_NAMES.contains(&name));

        if is_manifest {
            let slug = relative
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            debug!(slug = %slug, "manifest changed");
            let _ = outbound.send(OutboundMessage::ManifestChanged { slug });
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            debug!(path = %display_path, "content changed");
            let _ = outbound.send(OutboundMessage::ContentChanged { path: display_path });
        } else {
            debug!(path = %display_path, "file changed");
            let _ = outbound.send(OutboundMessage::FileChanged { path: display_path });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn wait_for<F>(rx: &mut broadcast::Receiver<OutboundMessage>, predicate: F) -> bool
    where
        F: Fn(&OutboundMessage) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(message) if predicate(&message) => return true,
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_reports_content_and_manifest_changes() {
        let dir = tempfile::tempdir().unwrap();
        let slug_dir = dir.path().join("first-post");
        std::fs::create_dir_all(&slug_dir).unwrap();

        let (tx, mut rx) = broadcast::channel(64);
        let _watcher = ContentWatcher::start(dir.path().to_path_buf(), tx).unwrap();

        std::fs::write(slug_dir.join("body.md"), "hello").unwrap();
        assert!(wait_for(&mut rx, |m| matches!(
            m,
            OutboundMessage::ContentChanged { path } if path.contains("body.md")
        )));

        std::fs::write(slug_dir.join("hero.png"), [0u8; 4]).unwrap();
        assert!(wait_for(&mut rx, |m| matches!(
            m,
            OutboundMessage::FileChanged { path } if path.contains("hero.png")
        )));

        std::fs::write(slug_dir.join("manifest.json"), "{}").unwrap();
        assert!(wait_for(&mut rx, |m| matches!(
            m,
            OutboundMessage::ManifestChanged { slug } if slug == "first-post"
        )));
    }
}
