//! Correlates a dispatch thread with the session delivering on it.
//!
//! Application code running inside a listener can call [`current_session`]
//! to send replies through the same session that delivered the message.

use crate::broker::Session;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Session>>> = const { RefCell::new(None) };
}

/// Per-thread slot holding the active session.
pub trait SessionContext: Send + Sync {
    fn set(&self, session: Arc<dyn Session>);

    /// Empties the slot; a following `set` always starts from empty.
    fn clear(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalSessionContext;

impl SessionContext for ThreadLocalSessionContext {
    fn set(&self, session: Arc<dyn Session>) {
        CURRENT.with(|slot| *slot.borrow_mut() = Some(session));
    }

    fn clear(&self) {
        CURRENT.with(|slot| *slot.borrow_mut() = None);
    }
}

/// Session delivering on the calling thread, if any.
pub fn current_session() -> Option<Arc<dyn Session>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

pub fn with_current_session<R>(f: impl FnOnce(Option<&Arc<dyn Session>>) -> R) -> R {
    CURRENT.with(|slot| f(slot.borrow().as_ref()))
}

/// Clears the context when dropped, including during unwinding.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub struct ContextGuard<'a> {
    ctx: &'a dyn SessionContext,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.ctx.clear();
    }
}

pub fn enter<'a>(ctx: &'a dyn SessionContext, session: Arc<dyn Session>) -> ContextGuard<'a> {
    ctx.set(session);
    ContextGuard { ctx }
}
