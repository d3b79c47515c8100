//! State reducers over a project's live channel.
//!
//! Each reducer is an independent fold over the same event stream and ignores the
//! event kinds it does not own. None of them sees another's state:
//!
//! - [`AgentsReducer`]: `agent:update` into the current agent table
//! - [`LogBuffer`]: `agent:log` into a bounded FIFO of log entries
//! - [`GraphReducer`]: `graph:update` snapshots into the current graph
//!
//! [`LiveView`] attaches a reducer to a [`ChannelRegistry`] and shares its state
//! with readers.

pub mod agents;
pub mod graph;
pub mod logs;

pub use agents::AgentsReducer;
pub use graph::GraphReducer;
pub use logs::{LOG_RETENTION_CAP, LogBuffer};

use std::sync::{Arc, Mutex};

use crate::Result;
use crate::live::registry::lock;
use crate::live::{ChannelEvent, ChannelRegistry, Subscription};

/// A fold over channel events.
pub trait Reducer: Send + 'static {
    /// Project whose events this reducer accepts.
    fn project_id(&self) -> &str;

    /// Fold one event into the state. Events of other kinds or projects are ignored.
    fn apply(&mut self, event: &ChannelEvent);
}

/// A reducer fed by a live subscription.
///
/// Dropping the view unsubscribes it.
pub struct LiveView<R> {
    state: Arc<Mutex<R>>,
    subscription: Subscription,
}

impl<R: Reducer> LiveView<R> {
    /// Subscribe `reducer` to its project's channel.
    pub fn attach(registry: &ChannelRegistry, reducer: R) -> Result<Self> {
        let project_id = reducer.project_id().to_string();
        let state = Arc::new(Mutex::new(reducer));
        let target = state.clone();
        let subscription =
            registry.subscribe(&project_id, move |event| lock(&target).apply(event))?;
        Ok(Self {
            state,
            subscription,
        })
    }

    /// Read the current state.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&lock(&self.state))
    }

    /// Mutate local state, e.g. selection or an optimistic agent transition.
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut lock(&self.state))
    }

    /// Stop receiving events. State stays readable.
    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<R: Reducer + Clone> LiveView<R> {
    /// Point-in-time copy of the state.
    pub fn snapshot(&self) -> R {
        lock(&self.state).clone()
    }
}

impl<R> std::fmt::Debug for LiveView<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("subscription", &self.subscription)
            .finish()
    }
}
