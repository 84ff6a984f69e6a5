//! Conversation context.
//!
//! One `Conversation` owns the timeline and relationship gate of a single
//! one-to-one chat. It runs the change-feed listener between `start` and
//! `close`, routes local mutations through the optimistic coordinator and
//! publishes a [`ConversationEvent`] after every merge or mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{
    AddIntent, ConversationId, DeleteScope, Message, MessageId, OutgoingMessage,
    RelationshipGate, RelationshipView, UserId,
};
use crate::optimistic::{OptimisticCoordinator, PendingMutation};
use crate::relationship::RelationshipService;
use crate::store::{MessageStore, PageFeed};
use crate::sync::{LocalMutation, MergeOutcome, MessageSyncEngine, PaginationCursor};
use crate::util::now_millis;

const EVENT_CAPACITY: usize = 64;

/// Change notification for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A server page was merged into the timeline
    Merged(MergeOutcome),
    /// An older page was prepended
    OlderLoaded { added: usize, has_more: bool },
    /// A local mutation was applied optimistically
    LocalChange { id: MessageId },
    /// A local mutation was undone after its remote call failed
    Reverted { id: MessageId, reason: String },
    RelationshipChanged(RelationshipGate),
    /// The change feed reported an error; the timeline is unchanged
    FeedError(String),
    Closed,
}

struct ConversationState {
    engine: MessageSyncEngine,
    gate: Option<RelationshipGate>,
    closed: bool,
}

impl ConversationState {
    fn is_hidden(&self) -> bool {
        self.gate == Some(RelationshipGate::Hidden)
    }
}

struct ConversationInner {
    id: ConversationId,
    local_user: UserId,
    peer: UserId,
    page_size: usize,
    store: Arc<dyn MessageStore>,
    relationships: RelationshipService,
    coordinator: OptimisticCoordinator,
    state: Mutex<ConversationState>,
    events: broadcast::Sender<ConversationEvent>,
    loading_older: AtomicBool,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl ConversationInner {
    fn emit(&self, event: ConversationEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    async fn apply_page(&self, page: Vec<Message>) -> Result<MergeOutcome> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::ConversationClosed);
        }
        if state.is_hidden() {
            return Err(self.hidden_error());
        }
        let outcome = state.engine.merge_page(page);
        drop(state);
        self.emit(ConversationEvent::Merged(outcome));
        Ok(outcome)
    }

    fn hidden_error(&self) -> Error {
        Error::PermissionDenied(format!("conversation {} is hidden", self.id))
    }

    fn take_listener(&self) -> Option<JoinHandle<()>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for ConversationInner {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = listener {
            handle.abort();
        }
    }
}

/// Resets the `load_older` in-flight flag when dropped
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to an open conversation. Clones share the same context; the
/// listener is aborted when the last handle is dropped.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<ConversationInner>,
}

impl Conversation {
    /// Create a conversation context between `local_user` and `peer`.
    /// Nothing is fetched until [`Conversation::start`].
    pub fn open(
        local_user: UserId,
        peer: UserId,
        store: Arc<dyn MessageStore>,
        relationships: RelationshipService,
        config: &SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = ConversationInner {
            id: ConversationId::between(&local_user, &peer),
            page_size: config.page_size,
            store,
            relationships,
            coordinator: OptimisticCoordinator::new(local_user.clone(), config),
            state: Mutex::new(ConversationState {
                engine: MessageSyncEngine::new(local_user.clone(), config),
                gate: None,
                closed: false,
            }),
            events,
            loading_older: AtomicBool::new(false),
            listener: StdMutex::new(None),
            local_user,
            peer,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ConversationId {
        &self.inner.id
    }

    #[must_use]
    pub fn local_user(&self) -> &UserId {
        &self.inner.local_user
    }

    #[must_use]
    pub fn peer(&self) -> &UserId {
        &self.inner.peer
    }

    /// Receive change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    /// Evaluate the relationship and start the change-feed listener.
    ///
    /// Starting an already started conversation does nothing. A hidden pair
    /// is never subscribed; call `start` again once the gate opens.
    pub async fn start(&self) -> Result<()> {
        self.ensure_open().await?;
        if self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Ok(());
        }

        if self.refresh_relationship().await? == RelationshipGate::Hidden {
            tracing::info!("Conversation {} is hidden, not syncing", self.inner.id);
            return Ok(());
        }
        let feed = self
            .inner
            .store
            .subscribe(&self.inner.id, self.inner.page_size)
            .await?;

        let handle = tokio::spawn(listen(Arc::downgrade(&self.inner), feed));
        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!("Conversation {} started", self.inner.id);
        Ok(())
    }

    /// Stop the listener. Remote calls still in flight complete but their
    /// results are discarded.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
        }
        if let Some(handle) = self.inner.take_listener() {
            handle.abort();
        }
        self.inner.emit(ConversationEvent::Closed);
        tracing::info!("Conversation {} closed", self.inner.id);
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    /// Re-read the relationship store and cache the resulting gate.
    /// Turning hidden stops the change feed.
    pub async fn refresh_relationship(&self) -> Result<RelationshipGate> {
        let gate = self
            .inner
            .relationships
            .evaluate(&self.inner.local_user, &self.inner.peer)
            .await?;

        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(Error::ConversationClosed);
        }
        let changed = state.gate.replace(gate) != Some(gate);
        drop(state);
        if changed {
            if gate == RelationshipGate::Hidden {
                if let Some(handle) = self.inner.take_listener() {
                    handle.abort();
                    tracing::info!("Conversation {} hidden, change feed stopped", self.inner.id);
                }
            }
            self.inner.emit(ConversationEvent::RelationshipChanged(gate));
        }
        Ok(gate)
    }

    /// Run the add/restore action towards the peer and refresh the gate
    pub async fn add_action(&self) -> Result<Option<AddIntent>> {
        let intent = self
            .inner
            .relationships
            .perform_add_action(&self.inner.local_user, &self.inner.peer)
            .await?;
        self.refresh_relationship().await?;
        Ok(intent)
    }

    /// Cached relationship view; `None` while not yet evaluated or hidden
    pub async fn current_view(&self) -> Option<RelationshipView> {
        self.inner.state.lock().await.gate.and_then(RelationshipGate::view)
    }

    pub async fn can_send(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .gate
            .is_some_and(RelationshipGate::can_send)
    }

    /// The full timeline, oldest first, including provisional sends.
    /// Empty while the pair is hidden.
    pub async fn timeline_snapshot(&self) -> Vec<Message> {
        let state = self.inner.state.lock().await;
        if state.is_hidden() {
            return Vec::new();
        }
        state.engine.timeline().messages().to_vec()
    }

    /// Timeline without messages the local user deleted for themselves
    pub async fn visible_snapshot(&self) -> Vec<Message> {
        let state = self.inner.state.lock().await;
        if state.is_hidden() {
            return Vec::new();
        }
        state.engine.timeline().visible_to(&self.inner.local_user)
    }

    pub async fn cursor(&self) -> PaginationCursor {
        let state = self.inner.state.lock().await;
        if state.is_hidden() {
            return PaginationCursor::default();
        }
        state.engine.cursor().clone()
    }

    /// Merge a server page as if it came from the change feed
    pub async fn apply_page(&self, page: Vec<Message>) -> Result<MergeOutcome> {
        self.inner.apply_page(page).await
    }

    /// Send a message. A provisional entry is shown right away and replaced
    /// by the server copy once it arrives.
    ///
    /// The relationship is re-evaluated on every call, so a send is refused
    /// as soon as the store no longer allows it.
    pub async fn send(&self, draft: OutgoingMessage) -> Result<MessageId> {
        let gate = self.refresh_relationship().await?;
        if !gate.can_send() {
            return Err(Error::PermissionDenied(format!(
                "{} cannot message {} right now",
                self.inner.local_user, self.inner.peer
            )));
        }

        let provisional = {
            let mut state = self.open_state().await?;
            let engine = &mut state.engine;
            self.inner
                .coordinator
                .apply_send(engine, &draft, now_millis())?
        };
        self.inner.emit(ConversationEvent::LocalChange {
            id: provisional.id.clone(),
        });

        let remote = self
            .inner
            .store
            .send(&self.inner.id, &self.inner.local_user, &draft)
            .await;

        let mut state = self.inner.state.lock().await;
        if state.closed {
            tracing::debug!("Discarding send result for {} after close", provisional.id);
            return remote;
        }
        match remote {
            Ok(server_id) => {
                self.inner.coordinator.confirm_send(
                    &mut state.engine,
                    &provisional.id,
                    server_id.clone(),
                );
                Ok(server_id)
            }
            Err(error) => {
                self.inner
                    .coordinator
                    .revert_send(&mut state.engine, &provisional.id);
                drop(state);
                self.inner.emit(ConversationEvent::Reverted {
                    id: provisional.id,
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    pub async fn edit(&self, id: &MessageId, content: &str) -> Result<()> {
        let content = content.trim();
        let pending = {
            let mut state = self.visible_state().await?;
            self.inner
                .coordinator
                .apply_edit(&mut state.engine, id, content, now_millis())?
        };
        self.inner
            .emit(ConversationEvent::LocalChange { id: id.clone() });

        let remote = self
            .inner
            .store
            .edit(&self.inner.id, id, &self.inner.local_user, content)
            .await;
        self.settle(&pending, remote).await
    }

    /// Toggle the local user's `emoji` reaction on `id`
    pub async fn react(&self, id: &MessageId, emoji: &str) -> Result<()> {
        let pending = {
            let mut state = self.visible_state().await?;
            self.inner
                .coordinator
                .apply_react(&mut state.engine, id, emoji)?
        };
        self.inner
            .emit(ConversationEvent::LocalChange { id: id.clone() });

        let next = match &pending.mutation {
            LocalMutation::React { emoji } => emoji.clone(),
            _ => None,
        };
        let remote = self
            .inner
            .store
            .set_reaction(&self.inner.id, id, &self.inner.local_user, next.as_deref())
            .await;
        self.settle(&pending, remote).await
    }

    pub async fn delete(&self, id: &MessageId, scope: DeleteScope) -> Result<()> {
        let pending = {
            let mut state = self.visible_state().await?;
            self.inner
                .coordinator
                .apply_delete(&mut state.engine, id, scope)?
        };
        self.inner
            .emit(ConversationEvent::LocalChange { id: id.clone() });

        let remote = self
            .inner
            .store
            .delete(&self.inner.id, id, &self.inner.local_user, scope)
            .await;
        self.settle(&pending, remote).await
    }

    /// Fetch and prepend the page before the cursor.
    ///
    /// Returns how many messages were added; 0 when there is nothing more
    /// to load or another load is already running. On failure the cursor is
    /// left as it was and the call may be retried.
    pub async fn load_older(&self) -> Result<usize> {
        let Some(_guard) = LoadingGuard::acquire(&self.inner.loading_older) else {
            tracing::debug!("load_older already running for {}", self.inner.id);
            return Ok(0);
        };

        let before = {
            let state = self.visible_state().await?;
            let cursor = state.engine.cursor();
            match (&cursor.oldest_loaded_id, cursor.has_more) {
                (Some(id), true) => id.clone(),
                _ => return Ok(0),
            }
        };

        let page = self
            .inner
            .store
            .fetch_older(&self.inner.id, &before, self.inner.page_size)
            .await
            .map_err(|error| {
                tracing::warn!("Older page fetch for {} failed: {}", self.inner.id, error);
                Error::PageFetchFailed(error.to_string())
            })?;

        let mut state = self.inner.state.lock().await;
        if state.closed {
            tracing::debug!("Discarding older page for {} after close", self.inner.id);
            return Err(Error::ConversationClosed);
        }
        let added = state.engine.prepend_older(page);
        let has_more = state.engine.cursor().has_more;
        drop(state);

        self.inner
            .emit(ConversationEvent::OlderLoaded { added, has_more });
        Ok(added)
    }

    async fn ensure_open(&self) -> Result<()> {
        self.open_state().await.map(drop)
    }

    async fn open_state(&self) -> Result<tokio::sync::MutexGuard<'_, ConversationState>> {
        let state = self.inner.state.lock().await;
        if state.closed {
            return Err(Error::ConversationClosed);
        }
        Ok(state)
    }

    async fn visible_state(&self) -> Result<tokio::sync::MutexGuard<'_, ConversationState>> {
        let state = self.open_state().await?;
        if state.is_hidden() {
            return Err(self.inner.hidden_error());
        }
        Ok(state)
    }

    /// Confirm or revert `pending` with the remote outcome
    async fn settle(&self, pending: &PendingMutation, remote: Result<()>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            tracing::debug!(
                "Discarding {:?} result for {} after close",
                pending.kind(),
                pending.id
            );
            return remote;
        }

        match remote {
            Ok(()) => {
                self.inner.coordinator.confirm(&mut state.engine, pending);
                Ok(())
            }
            Err(error) => {
                let reverted = self.inner.coordinator.revert(&mut state.engine, pending);
                drop(state);
                if reverted {
                    self.inner.emit(ConversationEvent::Reverted {
                        id: pending.id.clone(),
                        reason: error.to_string(),
                    });
                }
                Err(error)
            }
        }
    }
}

/// Merge every feed item until the feed ends or the context goes away
async fn listen(inner: Weak<ConversationInner>, mut feed: PageFeed) {
    while let Some(item) = feed.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match item {
            Ok(page) => {
                if inner.apply_page(page).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!("Change feed error for {}: {}", inner.id, error);
                inner.emit(ConversationEvent::FeedError(error.to_string()));
            }
        }
    }
    tracing::info!("Change feed listener stopped");
}
