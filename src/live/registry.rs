//! Channel registry: project identifier to subscriber fan-out.
//!
//! The registry starts a project's event source when the first callback subscribes
//! and stops it, synchronously, when the last one leaves. Every subscriber of a
//! project sees the same events in emission order, from the moment it subscribed
//! onward (no replay). Delivery for one project is serialized; different projects
//! are independent.
//!
//! The registry is an explicitly constructed object. Construct one at application
//! start, clone it where needed (clones share state), and call
//! [`ChannelRegistry::shutdown`] to tear every running source down.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, warn};

use super::protocol::ChannelEvent;
use super::source::{EventSource, SourceCommand, SourceHandle};
use crate::{Error, Result};

type EventCallback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide map from project identifier to its active subscribers.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    source: Arc<dyn EventSource>,
    channels: Mutex<HashMap<String, ProjectChannel>>,
    next_subscriber: AtomicU64,
    closed: AtomicBool,
}

/// A live project: its fan-out set and the source feeding it.
struct ProjectChannel {
    fanout: Arc<Fanout>,
    source: SourceHandle,
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    active: Arc<AtomicBool>,
    callback: EventCallback,
}

struct Fanout {
    project_id: String,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Held for the whole of one event's delivery so events never interleave.
    delivery: Mutex<()>,
    closed: AtomicBool,
}

impl Fanout {
    fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            subscribers: Mutex::new(Vec::new()),
            delivery: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for subscriber in lock(&self.subscribers).drain(..) {
            subscriber.active.store(false, Ordering::SeqCst);
        }
    }

    fn dispatch(&self, event: &ChannelEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let _turn = lock(&self.delivery);
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let subscribers: Vec<Subscriber> = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            let callback = &subscriber.callback;
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(
                    project_id = %self.project_id,
                    subscriber = subscriber.id,
                    kind = event.kind(),
                    "subscriber callback panicked, continuing delivery"
                );
            }
        }
        true
    }
}

/// Write end of one project's channel, handed to its event source.
#[derive(Clone)]
pub struct EventSink {
    fanout: Arc<Fanout>,
}

impl EventSink {
    /// Deliver `event` to every current subscriber of the project.
    ///
    /// Returns `false` once the channel has been torn down; the source should stop.
    /// Events tagged with a different project are dropped.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        if event.project_id() != self.fanout.project_id {
            warn!(
                expected = %self.fanout.project_id,
                got = %event.project_id(),
                kind = event.kind(),
                "dropping event addressed to another project"
            );
            return !self.is_closed();
        }
        self.fanout.dispatch(&event)
    }

    pub fn is_closed(&self) -> bool {
        self.fanout.closed.load(Ordering::SeqCst)
    }

    pub fn project_id(&self) -> &str {
        &self.fanout.project_id
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("project_id", &self.fanout.project_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Registration of one callback for one project.
///
/// Unsubscribes on [`Subscription::unsubscribe`] or on drop, whichever comes first.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    project_id: String,
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Remove this callback from the fan-out. Repeated calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.project_id, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("project_id", &self.project_id)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl RegistryInner {
    fn remove(&self, project_id: &str, subscriber_id: u64) {
        let torn_down = {
            let mut channels = lock(&self.channels);
            let Some(channel) = channels.get(project_id) else {
                return;
            };
            let now_empty = {
                let mut subscribers = lock(&channel.fanout.subscribers);
                subscribers.retain(|s| s.id != subscriber_id);
                subscribers.is_empty()
            };
            if now_empty {
                channels.remove(project_id)
            } else {
                None
            }
        };

        if let Some(mut channel) = torn_down {
            channel.fanout.close();
            channel.source.stop();
            info!(project_id, "last subscriber left, event source stopped");
        } else {
            debug!(project_id, subscriber_id, "subscriber removed");
        }
    }
}

impl ChannelRegistry {
    /// Create a registry whose channels are fed by `source`.
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                channels: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Convenience constructor taking the source by value.
    pub fn with_source(source: impl EventSource + 'static) -> Self {
        Self::new(Arc::new(source))
    }

    /// Register `callback` for every event emitted for `project_id` from now on.
    ///
    /// The first subscriber of a project starts a fresh event source. Callbacks run
    /// on the source's thread and must not emit into the same project themselves.
    pub fn subscribe<F>(&self, project_id: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        if project_id.is_empty() {
            return Err(Error::InvalidInput("project id must not be empty".to_string()));
        }

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));
        let subscriber = Subscriber {
            id,
            active: active.clone(),
            callback: Arc::new(callback),
        };

        let fanout = {
            let mut channels = lock(&self.inner.channels);
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(Error::RegistryClosed);
            }
            match channels.get(project_id) {
                Some(channel) => {
                    lock(&channel.fanout.subscribers).push(subscriber);
                    debug!(project_id, subscriber = id, "subscriber joined running channel");
                    None
                }
                None => {
                    let fanout = Arc::new(Fanout::new(project_id));
                    lock(&fanout.subscribers).push(subscriber);
                    channels.insert(
                        project_id.to_string(),
                        ProjectChannel {
                            fanout: fanout.clone(),
                            source: SourceHandle::detached(),
                        },
                    );
                    Some(fanout)
                }
            }
        };

        // The map lock is released here: a source may emit from `start`, and its
        // callbacks may use the registry.
        if let Some(fanout) = fanout {
            self.start_source(project_id, fanout)?;
            info!(project_id, subscriber = id, "event source started");
        }

        Ok(Subscription {
            registry: Arc::downgrade(&self.inner),
            project_id: project_id.to_string(),
            id,
            active,
        })
    }

    /// Start the source for a channel just inserted with a placeholder handle.
    fn start_source(&self, project_id: &str, fanout: Arc<Fanout>) -> Result<()> {
        let started = self.inner.source.start(
            project_id,
            EventSink {
                fanout: fanout.clone(),
            },
        );

        let mut orphaned = None;
        let outcome = {
            let mut channels = lock(&self.inner.channels);
            let ours = channels
                .get(project_id)
                .is_some_and(|c| Arc::ptr_eq(&c.fanout, &fanout));
            match started {
                Ok(source) if ours => {
                    if let Some(channel) = channels.get_mut(project_id) {
                        channel.source = source;
                    }
                    Ok(())
                }
                // Shut down while the source was starting
                Ok(source) => {
                    orphaned = Some(source);
                    Err(Error::RegistryClosed)
                }
                Err(e) => {
                    if ours {
                        channels.remove(project_id);
                    }
                    Err(e)
                }
            }
        };

        if let Err(e) = outcome {
            drop(orphaned);
            fanout.close();
            warn!(project_id, error = %e, "event source not started");
            return Err(e);
        }
        Ok(())
    }

    /// Forward a user-intent command to the project's running source.
    pub fn send_command(&self, project_id: &str, command: SourceCommand) -> Result<()> {
        let channels = lock(&self.inner.channels);
        match channels.get(project_id) {
            Some(channel) => channel.source.send(command),
            None => Err(Error::NotFound(format!(
                "no live channel for project {}",
                project_id
            ))),
        }
    }

    /// Whether a source is currently running for `project_id`.
    pub fn is_live(&self, project_id: &str) -> bool {
        lock(&self.inner.channels).contains_key(project_id)
    }

    pub fn subscriber_count(&self, project_id: &str) -> usize {
        lock(&self.inner.channels)
            .get(project_id)
            .map(|c| lock(&c.fanout.subscribers).len())
            .unwrap_or(0)
    }

    /// Projects with a running source, sorted.
    pub fn live_projects(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.channels).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop every running source and refuse further subscriptions.
    ///
    /// Existing `Subscription`s become inert; unsubscribing them is a no-op.
    pub fn shutdown(&self) {
        let drained: Vec<(String, ProjectChannel)> = {
            let mut channels = lock(&self.inner.channels);
            self.inner.closed.store(true, Ordering::SeqCst);
            channels.drain().collect()
        };
        let count = drained.len();
        for (project_id, mut channel) in drained {
            channel.fanout.close();
            channel.source.stop();
            debug!(project_id = %project_id, "event source stopped by shutdown");
        }
        info!(stopped = count, "channel registry shut down");
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("live_projects", &self.live_projects())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
