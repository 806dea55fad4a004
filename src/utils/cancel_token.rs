use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Shared cancellation state.
///
/// Cancellation is pushed down to children eagerly, so checking a token is a
/// single atomic load regardless of how deep it sits in the tree.
#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn attach(&self, child: &Arc<CancelState>) {
        let mut children = self.children.lock();
        // Checked under the lock: a concurrent `cancel` either sees the
        // child in the list or the child sees the flag here.
        if self.cancelled.load(Ordering::Acquire) {
            child.cancelled.store(true, Ordering::Release);
            return;
        }
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }
}

/// Hierarchical cancellation token.
///
/// Cloning shares the same state. [`CancelToken::child`] creates a token that
/// is cancelled together with its parent but can also be cancelled alone.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new_root() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        let child = Self::default();
        self.state.attach(&child.state);
        child
    }

    pub fn cancel(&self) {
        self.state.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
