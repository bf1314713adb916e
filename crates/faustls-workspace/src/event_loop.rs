use std::sync::Arc;

use camino::Utf8Path;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::editor::EditorEvent;
use crate::error::WorkspaceError;
use crate::watcher::DiskEvent;
use crate::watcher::WatchDirs;
use crate::workspace::Workspace;

const EDITOR_CHANNEL_CAPACITY: usize = 64;

/// Owner side of a running workspace.
///
/// Dropping the handle signals the event loop to stop; use
/// [`shutdown`](Self::shutdown) to also wait for it and observe how it ended.
#[derive(Debug)]
pub struct WorkspaceHandle {
    workspace: Arc<Workspace>,
    editor_tx: mpsc::Sender<EditorEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), WorkspaceError>>>,
}

impl WorkspaceHandle {
    #[must_use]
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.workspace.root()
    }

    /// Sender feeding this workspace's editor queue.
    ///
    /// Lets callers submit without holding on to the handle.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<EditorEvent> {
        self.editor_tx.clone()
    }

    /// Queue an editor event for this workspace's loop.
    ///
    /// Waits when the queue is full. Fails once the loop has stopped.
    pub async fn submit(&self, event: EditorEvent) -> Result<(), WorkspaceError> {
        self.editor_tx
            .send(event)
            .await
            .map_err(|_| WorkspaceError::Closed)
    }

    /// Whether the event loop has exited, either by shutdown or by error.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the event loop and wait for it.
    ///
    /// Returns the error the loop ended with, if it ended on its own.
    pub async fn shutdown(mut self) -> Result<(), WorkspaceError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(root = %self.workspace.root(), error = %err, "Workspace event loop panicked");
                Err(WorkspaceError::Closed)
            }
        }
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub(crate) fn spawn<W>(
    workspace: Arc<Workspace>,
    watch: W,
    disk_rx: mpsc::UnboundedReceiver<notify::Result<DiskEvent>>,
) -> WorkspaceHandle
where
    W: WatchDirs + 'static,
{
    let (editor_tx, editor_rx) = mpsc::channel(EDITOR_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let event_loop = EventLoop {
        workspace: workspace.clone(),
        watch,
        editor_rx,
        disk_rx,
        shutdown_rx,
    };
    let task = tokio::spawn(event_loop.run());

    WorkspaceHandle {
        workspace,
        editor_tx,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

/// Single consumer serializing every mutation of one workspace.
///
/// The watch set lives here so it is dropped, and the watcher closed, when
/// the loop exits.
struct EventLoop<W> {
    workspace: Arc<Workspace>,
    watch: W,
    editor_rx: mpsc::Receiver<EditorEvent>,
    disk_rx: mpsc::UnboundedReceiver<notify::Result<DiskEvent>>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl<W: WatchDirs> EventLoop<W> {
    async fn run(mut self) -> Result<(), WorkspaceError> {
        let root = self.workspace.root().to_path_buf();
        tracing::debug!(%root, "Workspace event loop started");

        loop {
            tokio::select! {
                Some(event) = self.editor_rx.recv() => {
                    if let Err(err) = self.workspace.handle_editor_event(&event) {
                        tracing::error!(%root, error = %err, "Stopping workspace event loop");
                        return Err(err);
                    }
                }
                disk = self.disk_rx.recv() => match disk {
                    Some(Ok(event)) => self.workspace.handle_disk_event(event, &mut self.watch),
                    Some(Err(err)) => tracing::warn!(%root, error = %err, "Watcher error"),
                    None => {
                        tracing::debug!(%root, "Disk event channel closed");
                        return Ok(());
                    }
                },
                _ = &mut self.shutdown_rx => break,
            }
        }

        tracing::debug!(%root, "Workspace event loop stopped");
        Ok(())
    }
}
