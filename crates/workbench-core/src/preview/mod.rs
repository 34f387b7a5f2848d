//! Preview servers and the loading/error state machine
//!
//! The manager drains the sandbox event channel in its own loop. Port events
//! maintain a deduplicated preview list sorted by port; page loads open an
//! error collection window; runtime error reports are classified and either
//! trigger a cooldown-guarded reload (hydration) or become code errors.

pub mod classify;
pub mod reload;

pub use classify::{ErrorClass, ErrorClassifier, HeuristicClassifier};
pub use reload::ReloadGuard;

use crate::config::WorkbenchConfig;
use crate::errors::CodeErrorQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workbench_types::{
    CodeError, ErrorSource, LoadingPhase, PortEventKind, PreviewInfo, PreviewMessage,
    PreviewMessageKind, PreviewState, SandboxEvent,
};

/// Notifications for front ends
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewNotice {
    StateChanged(PreviewState),
    PreviewsChanged(Vec<PreviewInfo>),
    /// The preview on `port` (or the active one) should be reloaded
    Reload { port: Option<u16> },
}

struct PreviewInner {
    previews: Vec<PreviewInfo>,
    selected: Option<u16>,
    state: PreviewState,
    pages_loaded: u64,
    /// Error generation when the current collection window opened
    collecting_since: Option<u64>,
    reload_guard: ReloadGuard,
}

pub struct PreviewManager {
    inner: RwLock<PreviewInner>,
    errors: Arc<CodeErrorQueue>,
    classifier: Arc<dyn ErrorClassifier>,
    notices: broadcast::Sender<PreviewNotice>,
    collection_window: Duration,
}

impl PreviewManager {
    pub fn new(
        errors: Arc<CodeErrorQueue>,
        classifier: Arc<dyn ErrorClassifier>,
        collection_window: Duration,
        reload_cooldown: Duration,
    ) -> Self {
        let (notices, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(PreviewInner {
                previews: Vec::new(),
                selected: None,
                state: PreviewState::Idle,
                pages_loaded: 0,
                collecting_since: None,
                reload_guard: ReloadGuard::new(reload_cooldown),
            }),
            errors,
            classifier,
            notices,
            collection_window,
        }
    }

    pub fn from_config(config: &WorkbenchConfig, errors: Arc<CodeErrorQueue>) -> Self {
        Self::new(
            errors,
            Arc::new(HeuristicClassifier::new()),
            config.error_collection_window(),
            config.hydration_reload_cooldown(),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewNotice> {
        self.notices.subscribe()
    }

    pub async fn state(&self) -> PreviewState {
        self.inner.read().await.state
    }

    /// Known previews, lowest port first
    pub async fn previews(&self) -> Vec<PreviewInfo> {
        self.inner.read().await.previews.clone()
    }

    /// The selected preview, else the one with the lowest port
    pub async fn active_preview(&self) -> Option<PreviewInfo> {
        let inner = self.inner.read().await;
        inner
            .selected
            .and_then(|port| inner.previews.iter().find(|p| p.port == port))
            .or_else(|| inner.previews.first())
            .cloned()
    }

    /// Pin the active preview; false if no preview listens on `port`
    pub async fn select_preview(&self, port: u16) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.previews.iter().any(|p| p.port == port) {
            return false;
        }
        inner.selected = Some(port);
        true
    }

    /// Apply one sandbox event; true when it opened an error collection window
    pub async fn handle_event(&self, event: SandboxEvent) -> bool {
        match event {
            SandboxEvent::Port {
                port,
                kind: PortEventKind::Open,
                url,
            } => {
                self.upsert(port, false, url).await;
                self.enter_loading(false).await;
                false
            }
            SandboxEvent::Port {
                port,
                kind: PortEventKind::Close,
                ..
            } => {
                self.remove(port).await;
                false
            }
            SandboxEvent::ServerReady { port, url } => {
                self.upsert(port, true, url).await;
                self.enter_loading(true).await;
                false
            }
            SandboxEvent::PageLoaded { port } => self.page_loaded(port).await,
            SandboxEvent::PreviewMessage(message) => {
                self.handle_message(message).await;
                false
            }
        }
    }

    async fn upsert(&self, port: u16, ready: bool, base_url: String) {
        let previews = {
            let mut inner = self.inner.write().await;
            match inner.previews.iter_mut().find(|p| p.port == port) {
                Some(existing) => {
                    existing.ready |= ready;
                    existing.base_url = base_url;
                }
                None => {
                    inner.previews.push(PreviewInfo {
                        port,
                        ready,
                        base_url,
                    });
                    inner.previews.sort_by_key(|p| p.port);
                }
            }
            inner.previews.clone()
        };
        let _ = self.notices.send(PreviewNotice::PreviewsChanged(previews));
    }

    async fn remove(&self, port: u16) {
        let previews = {
            let mut inner = self.inner.write().await;
            let before = inner.previews.len();
            inner.previews.retain(|p| p.port != port);
            if inner.previews.len() == before {
                return;
            }
            if inner.selected == Some(port) {
                inner.selected = None;
            }
            inner.previews.clone()
        };
        debug!("Preview on port {} closed", port);
        let _ = self.notices.send(PreviewNotice::PreviewsChanged(previews));
    }

    /// Server activity: stay in (or enter) loading; server-ready ends fixing
    async fn enter_loading(&self, server_ready: bool) {
        let mut inner = self.inner.write().await;
        let next = match inner.state {
            PreviewState::Loading {
                phase: LoadingPhase::FixingIssues,
            } if !server_ready => return,
            PreviewState::CollectingErrors => return,
            _ => PreviewState::Loading {
                phase: LoadingPhase::Starting,
            },
        };
        self.transition(&mut inner, next);
    }

    async fn page_loaded(&self, port: u16) -> bool {
        let generation = self.errors.generation();
        let mut inner = self.inner.write().await;
        inner.pages_loaded += 1;

        if inner.pages_loaded == 1 {
            debug!("First page load on port {}", port);
            self.transition(&mut inner, PreviewState::Ready);
            return false;
        }

        // A reload inside an open window extends it; errors already seen still count
        if inner.state == PreviewState::CollectingErrors {
            inner.collecting_since.get_or_insert(generation);
        } else {
            inner.collecting_since = Some(generation);
        }
        self.transition(&mut inner, PreviewState::CollectingErrors);
        true
    }

    /// Close the collection window: ready if nothing failed, else surface errors
    pub async fn finish_collection(&self) {
        let generation = self.errors.generation();
        let mut inner = self.inner.write().await;
        if inner.state != PreviewState::CollectingErrors {
            return;
        }
        let since = inner.collecting_since.take().unwrap_or(generation);
        let next = if generation != since {
            PreviewState::ErrorsSurfaced
        } else {
            PreviewState::Ready
        };
        self.transition(&mut inner, next);
    }

    async fn handle_message(&self, message: PreviewMessage) {
        match self.classifier.classify(&message) {
            ErrorClass::Ignore => {}
            ErrorClass::Runtime => {
                self.errors.push(code_error(&message)).await;
            }
            ErrorClass::Hydration => {
                let allowed = self.inner.write().await.reload_guard.try_reload(Instant::now());
                if allowed {
                    info!("Hydration error; reloading preview");
                    let _ = self.notices.send(PreviewNotice::Reload { port: message.port });
                } else {
                    warn!("Hydration error within reload cooldown; surfacing it instead");
                    self.errors.push(code_error(&message)).await;
                }
            }
        }
    }

    /// User asked the AI layer to fix the surfaced errors
    pub async fn start_fixing(&self) {
        let mut inner = self.inner.write().await;
        self.transition(
            &mut inner,
            PreviewState::Loading {
                phase: LoadingPhase::FixingIssues,
            },
        );
    }

    /// User dismissed the surfaced errors
    pub async fn dismiss_errors(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == PreviewState::ErrorsSurfaced {
            self.transition(&mut inner, PreviewState::Ready);
        }
    }

    /// Forget previews and load history (new session)
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.previews.clear();
        inner.selected = None;
        inner.pages_loaded = 0;
        inner.collecting_since = None;
        inner.reload_guard.reset();
        self.transition(&mut inner, PreviewState::Idle);
    }

    fn transition(&self, inner: &mut PreviewInner, next: PreviewState) {
        if inner.state == next {
            return;
        }
        debug!("Preview state {:?} -> {:?}", inner.state, next);
        inner.state = next;
        let _ = self.notices.send(PreviewNotice::StateChanged(next));
    }

    /// Drain sandbox events until cancelled or the channel closes
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SandboxEvent>,
        cancel: CancellationToken,
    ) {
        let mut deadline: Option<Instant> = None;

        loop {
            let collection = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = collection => {
                    deadline = None;
                    self.finish_collection().await;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if self.handle_event(event).await {
                            deadline = Some(Instant::now() + self.collection_window);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Preview loop lagged, skipped {} sandbox events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Preview loop stopped");
    }

    pub fn spawn(
        self: &Arc<Self>,
        events: broadcast::Receiver<SandboxEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(events, cancel))
    }
}

fn code_error(message: &PreviewMessage) -> CodeError {
    let title = match message.kind {
        PreviewMessageKind::UncaughtException => "Uncaught Exception",
        PreviewMessageKind::UnhandledRejection => "Unhandled Promise Rejection",
        PreviewMessageKind::ConsoleError => "Console Error",
    };
    let description = match &message.pathname {
        Some(path) => format!("{} on {}", message.message, path),
        None => message.message.clone(),
    };
    let content = match &message.stack {
        Some(stack) => format!("{}\n{}", message.message, stack),
        None => message.message.clone(),
    };
    CodeError::new(title, description, content, ErrorSource::Preview)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<PreviewManager>, Arc<CodeErrorQueue>) {
        let errors = Arc::new(CodeErrorQueue::new());
        let manager = Arc::new(PreviewManager::new(
            errors.clone(),
            Arc::new(HeuristicClassifier::new()),
            Duration::from_secs(2),
            Duration::from_secs(30),
        ));
        (manager, errors)
    }

    fn open(port: u16) -> SandboxEvent {
        SandboxEvent::Port {
            port,
            kind: PortEventKind::Open,
            url: format!("http://localhost:{}", port),
        }
    }

    fn close(port: u16) -> SandboxEvent {
        SandboxEvent::Port {
            port,
            kind: PortEventKind::Close,
            url: String::new(),
        }
    }

    fn runtime_error(text: &str) -> SandboxEvent {
        SandboxEvent::PreviewMessage(PreviewMessage {
            kind: PreviewMessageKind::UncaughtException,
            message: text.to_string(),
            stack: None,
            pathname: Some("/".to_string()),
            port: Some(5173),
        })
    }

    fn hydration_error() -> SandboxEvent {
        SandboxEvent::PreviewMessage(PreviewMessage {
            kind: PreviewMessageKind::ConsoleError,
            message: "Hydration failed because the initial UI does not match".to_string(),
            stack: None,
            pathname: None,
            port: Some(3000),
        })
    }

    #[tokio::test]
    async fn test_port_open_close_round_trip() {
        let (manager, _) = manager();
        manager.handle_event(open(5173)).await;
        manager.handle_event(open(3000)).await;
        manager.handle_event(open(8080)).await;
        let before = manager.previews().await;
        assert_eq!(
            before.iter().map(|p| p.port).collect::<Vec<_>>(),
            vec![3000, 5173, 8080]
        );

        assert!(manager.select_preview(5173).await);
        assert!(!manager.select_preview(9999).await);
        manager.handle_event(open(4000)).await;
        manager.handle_event(close(4000)).await;
        assert_eq!(manager.previews().await, before);
        assert_eq!(manager.active_preview().await.unwrap().port, 5173);

        manager.handle_event(close(5173)).await;
        assert_eq!(manager.active_preview().await.unwrap().port, 3000);
        assert_eq!(manager.previews().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fixing_cleared_by_server_ready() {
        let (manager, _) = manager();
        manager.handle_event(open(5173)).await;
        manager.start_fixing().await;

        manager.handle_event(open(5174)).await;
        assert_eq!(
            manager.state().await,
            PreviewState::Loading {
                phase: LoadingPhase::FixingIssues
            }
        );
        assert_eq!(manager.state().await.loading_message(), Some("Fixing issues..."));

        manager
            .handle_event(SandboxEvent::ServerReady {
                port: 5173,
                url: "http://localhost:5173".to_string(),
            })
            .await;
        assert_eq!(
            manager.state().await,
            PreviewState::Loading {
                phase: LoadingPhase::Starting
            }
        );
        assert!(manager.previews().await[0].ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_window_without_errors_becomes_ready() {
        let (manager, _) = manager();
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = manager.spawn(rx, cancel.clone());

        tx.send(open(5173)).unwrap();
        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.state().await, PreviewState::CollectingErrors);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.state().await, PreviewState::Ready);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_window_with_error_surfaces_it() {
        let (manager, errors) = manager();
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = manager.spawn(rx, cancel.clone());

        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(runtime_error("TypeError: boom")).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(manager.state().await, PreviewState::ErrorsSurfaced);
        assert_eq!(errors.len().await, 1);

        manager.dismiss_errors().await;
        assert_eq!(manager.state().await, PreviewState::Ready);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_inside_window_keeps_earlier_error() {
        let (manager, errors) = manager();
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let handle = manager.spawn(rx, cancel.clone());

        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(runtime_error("TypeError: boom")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // HMR reload right after the crash
        tx.send(SandboxEvent::PageLoaded { port: 5173 }).unwrap();

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(manager.state().await, PreviewState::CollectingErrors);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(errors.len().await, 1);
        assert_eq!(manager.state().await, PreviewState::ErrorsSurfaced);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydration_reload_cooldown() {
        let (manager, errors) = manager();
        let mut notices = manager.subscribe();

        manager.handle_event(hydration_error()).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        manager.handle_event(hydration_error()).await;

        let mut reloads = 0;
        while let Ok(notice) = notices.try_recv() {
            if matches!(notice, PreviewNotice::Reload { .. }) {
                reloads += 1;
            }
        }
        assert_eq!(reloads, 1);
        assert_eq!(errors.len().await, 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        manager.handle_event(hydration_error()).await;
        assert!(matches!(
            notices.try_recv(),
            Ok(PreviewNotice::Reload { port: Some(3000) })
        ));
    }
}
