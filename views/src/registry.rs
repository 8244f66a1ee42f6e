use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;
use util::IdGenerator;

use crate::{ViewHandle, ViewId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A live handle already holds this id.
    #[error("view {0} is already registered")]
    DuplicateView(ViewId),
}

struct RegisteredView {
    handle: Rc<dyn ViewHandle>,
    last_interaction: Instant,
}

/// A view as seen at the moment [`ViewRegistry::live_views`] was called.
#[derive(Clone)]
pub struct LiveView {
    pub id: ViewId,
    pub last_interaction: Instant,
    pub handle: Rc<dyn ViewHandle>,
}

impl LiveView {
    /// Time since the last recorded interaction.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_interaction)
    }
}

impl fmt::Debug for LiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveView")
            .field("id", &self.id)
            .field("last_interaction", &self.last_interaction)
            .field("alive", &self.handle.is_alive())
            .finish()
    }
}

/// Authoritative record of currently open views.
///
/// Owned by the composition root and shared by `Rc`. Enumeration hands out
/// an owned snapshot, so handlers that register or unregister views while a
/// snapshot is being walked (a window closing mid-tick, say) never observe a
/// half-updated map.
#[derive(Default)]
pub struct ViewRegistry {
    views: RefCell<BTreeMap<ViewId, RegisteredView>>,
    ids: IdGenerator,
}

impl ViewRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh id for a view about to be created.
    pub fn allocate_id(&self) -> ViewId {
        ViewId::new(self.ids.next())
    }

    /// Inserts a handle, stamping `now` as its last interaction.
    ///
    /// A dead handle left under the same id is replaced; a live one is a
    /// caller bug and is rejected.
    pub fn register(&self, handle: Rc<dyn ViewHandle>, now: Instant) -> Result<(), RegistryError> {
        let id = handle.id();
        let mut views = self.views.borrow_mut();
        if let Some(existing) = views.get(&id) {
            if existing.handle.is_alive() {
                return Err(RegistryError::DuplicateView(id));
            }
        }

        views.insert(
            id,
            RegisteredView {
                handle,
                last_interaction: now,
            },
        );
        debug!(view = %id, live = views.len(), "view registered");
        Ok(())
    }

    /// Removes the handle for `id`. Unknown ids are ignored.
    pub fn unregister(&self, id: ViewId) -> bool {
        let removed = self.views.borrow_mut().remove(&id).is_some();
        if removed {
            debug!(view = %id, "view unregistered");
        }
        removed
    }

    /// Records an interaction. Timestamps never move backwards.
    pub fn touch(&self, id: ViewId, now: Instant) -> bool {
        let mut views = self.views.borrow_mut();
        let Some(view) = views.get_mut(&id) else {
            return false;
        };

        if now > view.last_interaction {
            view.last_interaction = now;
        }
        true
    }

    /// Returns the last recorded interaction for `id`.
    pub fn last_interaction(&self, id: ViewId) -> Option<Instant> {
        self.views.borrow().get(&id).map(|view| view.last_interaction)
    }

    /// Snapshot of handles that are still alive.
    pub fn live_views(&self) -> Vec<LiveView> {
        self.views
            .borrow()
            .iter()
            .filter(|(_, view)| view.handle.is_alive())
            .map(|(id, view)| LiveView {
                id: *id,
                last_interaction: view.last_interaction,
                handle: Rc::clone(&view.handle),
            })
            .collect()
    }

    /// Returns the number of registered views, dead or alive.
    pub fn len(&self) -> usize {
        self.views.borrow().len()
    }

    /// Returns `true` if no views are registered.
    pub fn is_empty(&self) -> bool {
        self.views.borrow().is_empty()
    }

    /// Drops every handle. Used at shutdown.
    pub fn clear(&self) {
        let dropped = {
            let mut views = self.views.borrow_mut();
            let dropped = views.len();
            views.clear();
            dropped
        };
        debug!(dropped, "view registry cleared");
    }
}
