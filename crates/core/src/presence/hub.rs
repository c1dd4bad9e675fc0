// Presence Hub
//
// Single owner of the presence state of one open document. Turns incoming
// shouts into table mutations, republishes the derived views, throttles the
// local user's focus announcements and sweeps peers that went silent.
//
// Every state transition happens under the state lock and runs to completion
// without awaiting; shouts are sent after the lock is released.

use super::channel::ShoutChannel;
use super::live::{LiveValue, PresenceView};
use super::protocol::{DocEvent, FieldPath, ShoutMessage, UserLink};
use super::table::PresenceTable;
use super::throttle::{FocusDecision, FocusThrottle};
use crate::config::PresenceConfig;
use crate::error::PresenceError;
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

struct HubState {
    table: PresenceTable,
    throttle: FocusThrottle,
    /// Pending trailing focus send
    trailing: Option<JoinHandle<()>>,
    /// Event subscription + sweep task
    event_loop: Option<JoinHandle<()>>,
    /// Dropped on destroy, which ends every live value
    views: Option<watch::Sender<Arc<PresenceView>>>,
}

impl HubState {
    fn is_destroyed(&self) -> bool {
        self.views.is_none()
    }

    fn publish(&self) {
        let Some(views) = &self.views else {
            return;
        };
        let next = self.table.view();
        views.send_if_modified(|current| {
            if **current == next {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        });
    }

    fn cancel_trailing(&mut self) {
        if let Some(task) = self.trailing.take() {
            task.abort();
        }
    }
}

struct HubInner {
    own_user_id: String,
    config: PresenceConfig,
    shout: Arc<dyn ShoutChannel>,
    state: Mutex<HubState>,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one document event and return the reply to broadcast, if any
    fn apply(&self, event: DocEvent, now: Instant) -> Option<ShoutMessage> {
        let mut state = self.lock();
        if state.is_destroyed() {
            return None;
        }

        let reply = match event {
            DocEvent::Open => {
                info!("Document opened, announcing {}", self.own_user_id);
                Some(ShoutMessage::open(&self.own_user_id))
            }
            DocEvent::Shout(message) => self.apply_shout(&mut state, message, now),
            DocEvent::Other { name } => {
                trace!("Ignoring document event {}", name);
                None
            }
        };

        state.publish();
        reply
    }

    fn apply_shout(
        &self,
        state: &mut HubState,
        message: ShoutMessage,
        now: Instant,
    ) -> Option<ShoutMessage> {
        if message.user_id() == self.own_user_id {
            trace!("Ignoring own {} shout", message.kind());
            return None;
        }
        debug!("Presence {} from {}", message.kind(), message.user_id());

        match &message {
            ShoutMessage::Open { user_id } => {
                let reply = match state.throttle.path() {
                    Some(path) => ShoutMessage::focus(&self.own_user_id, path),
                    None => ShoutMessage::ping(&self.own_user_id),
                };
                state.table.reset(user_id, now);
                Some(reply)
            }
            ShoutMessage::Focus { user_id, path } => {
                state.table.set_focus(user_id, path, now);
                None
            }
            ShoutMessage::Close { user_id } => {
                state.table.remove(user_id);
                None
            }
            ShoutMessage::Ping { user_id } => {
                state.table.touch(user_id, now);
                None
            }
            ShoutMessage::Other { kind, user_id, .. } => {
                debug!("Unknown shout type {} from {}", kind, user_id);
                state.table.refresh(user_id, now);
                None
            }
        }
    }

    async fn handle_event(&self, event: DocEvent) {
        if let Some(reply) = self.apply(event, Instant::now()) {
            if let Err(err) = self.shout.shout(reply).await {
                warn!("Failed to answer presence event: {}", err);
            }
        }
    }

    fn sweep(&self) {
        let mut state = self.lock();
        if state.is_destroyed() {
            return;
        }
        let expired = state
            .table
            .sweep(Instant::now(), self.config.presence_timeout());
        if !expired.is_empty() {
            info!("Removed stale collaborators: {:?}", expired);
            state.publish();
        }
    }

    fn schedule_trailing(self: &Arc<Self>, deadline: Instant, epoch: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let message = {
                let mut state = inner.lock();
                if state.is_destroyed() {
                    return;
                }
                state
                    .throttle
                    .fire_trailing(epoch, Instant::now())
                    .map(|path| ShoutMessage::focus(&inner.own_user_id, path))
            };
            if let Some(message) = message {
                debug!("Sending trailing focus announcement");
                if let Err(err) = inner.shout.shout(message).await {
                    warn!("Trailing focus announcement failed: {}", err);
                }
            }
        })
    }
}

async fn run<S>(inner: Arc<HubInner>, events: S)
where
    S: Stream<Item = DocEvent> + Send + 'static,
{
    let mut events = Box::pin(events);
    let period = inner.config.sweep_interval();
    let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.next(), if events_open => match event {
                Some(event) => inner.handle_event(event).await,
                None => {
                    debug!("Document event stream ended");
                    events_open = false;
                }
            },
            _ = sweep.tick() => inner.sweep(),
        }
    }
}

/// Presence state of one open document session.
///
/// Must be created inside a tokio runtime. Dropping the hub destroys it.
pub struct PresenceHub {
    inner: Arc<HubInner>,
    views: watch::Receiver<Arc<PresenceView>>,
}

impl PresenceHub {
    /// Create a hub with the default timing (10s throttle, 60s sweep and timeout)
    pub fn create<S>(own_user_id: impl Into<String>, incoming: S, shout: Arc<dyn ShoutChannel>) -> Self
    where
        S: Stream<Item = DocEvent> + Send + 'static,
    {
        Self::with_config(PresenceConfig::default(), own_user_id, incoming, shout)
    }

    pub fn with_config<S>(
        config: PresenceConfig,
        own_user_id: impl Into<String>,
        incoming: S,
        shout: Arc<dyn ShoutChannel>,
    ) -> Self
    where
        S: Stream<Item = DocEvent> + Send + 'static,
    {
        let own_user_id = own_user_id.into();
        let (views_tx, views) = watch::channel(Arc::new(PresenceView::default()));
        let inner = Arc::new(HubInner {
            own_user_id,
            state: Mutex::new(HubState {
                table: PresenceTable::new(),
                throttle: FocusThrottle::new(config.throttle_window()),
                trailing: None,
                event_loop: None,
                views: Some(views_tx),
            }),
            config,
            shout,
        });

        let event_loop = tokio::spawn(run(Arc::clone(&inner), incoming));
        inner.lock().event_loop = Some(event_loop);
        info!("Presence hub created for {}", inner.own_user_id);

        Self { inner, views }
    }

    pub fn own_user_id(&self) -> &str {
        &self.inner.own_user_id
    }

    /// Announce that the local user is editing `field_id` in `locale_code`.
    ///
    /// A new path is broadcast immediately; repeating the current path within
    /// the throttle window results in at most one more broadcast, at the end
    /// of the window.
    pub async fn focus(&self, field_id: &str, locale_code: &str) -> Result<(), PresenceError> {
        let path = FieldPath::new(field_id, locale_code);
        let sent_epoch = {
            let mut state = self.inner.lock();
            if state.is_destroyed() {
                return Err(PresenceError::Destroyed);
            }
            match state.throttle.request(path.as_str(), Instant::now()) {
                FocusDecision::SendNow => {
                    state.cancel_trailing();
                    Some(state.throttle.epoch())
                }
                FocusDecision::ScheduleTrailing { deadline, epoch } => {
                    state.cancel_trailing();
                    state.trailing = Some(self.inner.schedule_trailing(deadline, epoch));
                    None
                }
                FocusDecision::Coalesced => None,
            }
        };

        let Some(epoch) = sent_epoch else {
            return Ok(());
        };
        debug!("Announcing focus on {}", path);
        let result = self
            .inner
            .shout
            .shout(ShoutMessage::focus(&self.inner.own_user_id, path))
            .await;
        if result.is_err() {
            // Nothing went out, so a retry must not be throttled
            self.inner.lock().throttle.rollback_send(epoch);
        }
        Ok(result?)
    }

    /// Announce departure, immediately and unthrottled
    pub async fn leave(&self) -> Result<(), PresenceError> {
        {
            let mut state = self.inner.lock();
            if state.is_destroyed() {
                return Err(PresenceError::Destroyed);
            }
            state.throttle.clear();
            state.cancel_trailing();
        }
        debug!("Announcing departure");
        self.inner
            .shout
            .shout(ShoutMessage::close(&self.inner.own_user_id))
            .await?;
        Ok(())
    }

    /// Keep-alive so peers do not sweep an idle local user
    pub async fn ping(&self) -> Result<(), PresenceError> {
        if self.is_destroyed() {
            return Err(PresenceError::Destroyed);
        }
        self.inner
            .shout
            .shout(ShoutMessage::ping(&self.inner.own_user_id))
            .await?;
        Ok(())
    }

    /// Path the local user most recently focused
    pub fn focused_path(&self) -> Option<String> {
        self.inner.lock().throttle.path().map(str::to_string)
    }

    /// All remote users currently present
    pub fn collaborators(&self) -> LiveValue<Vec<UserLink>> {
        LiveValue::new(self.views.clone(), |view| view.collaborators())
    }

    /// Remote users focused on `field_id` in `locale_code`
    pub fn collaborators_for(&self, field_id: &str, locale_code: &str) -> LiveValue<Vec<UserLink>> {
        let path = FieldPath::new(field_id, locale_code);
        LiveValue::new(self.views.clone(), move |view| view.collaborators_for(&path))
    }

    /// Current snapshot of the presence view
    pub fn snapshot(&self) -> PresenceView {
        self.views.borrow().as_ref().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().is_destroyed()
    }

    /// Stop the sweep, the event subscription and any pending focus send, and
    /// end all live values. Calling it again does nothing.
    pub fn destroy(&self) {
        let mut state = self.inner.lock();
        let Some(views) = state.views.take() else {
            return;
        };
        if let Some(event_loop) = state.event_loop.take() {
            event_loop.abort();
        }
        state.cancel_trailing();
        state.table.clear();
        state.throttle.clear();
        drop(views);
        info!("Presence hub destroyed for {}", self.inner.own_user_id);
    }
}

impl Drop for PresenceHub {
    fn drop(&mut self) {
        self.destroy();
    }
}
