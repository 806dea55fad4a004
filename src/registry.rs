use crate::broker::EndpointFactory;
use crate::descriptor::SubscriptionDescriptor;
use crate::endpoint::{EndpointRunner, RunnerContext};
use crate::error::{BridgeError, BridgeResult};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Endpoint factory compared and hashed by pointer identity.
#[derive(Clone)]
pub struct EndpointFactoryRef(pub Arc<dyn EndpointFactory>);

impl EndpointFactoryRef {
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for EndpointFactoryRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for EndpointFactoryRef {}

impl Hash for EndpointFactoryRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for EndpointFactoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointFactoryRef({:p})", self.addr())
    }
}

/// Identity of one activation: descriptor plus consuming factory.
///
/// Either half may be absent. Halves match when both are absent or both
/// are present and equal; absent against present never matches.
#[derive(Debug, Clone)]
pub struct SubscriptionKey {
    descriptor: Option<SubscriptionDescriptor>,
    factory: Option<EndpointFactoryRef>,
}

impl SubscriptionKey {
    pub fn new(descriptor: Option<SubscriptionDescriptor>, factory: Option<Arc<dyn EndpointFactory>>) -> Self {
        Self {
            descriptor,
            factory: factory.map(EndpointFactoryRef),
        }
    }

    pub fn descriptor(&self) -> Option<&SubscriptionDescriptor> {
        self.descriptor.as_ref()
    }
}

fn halves_match<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        (None, Some(_)) | (Some(_), None) => false,
    }
}

impl PartialEq for SubscriptionKey {
    fn eq(&self, other: &Self) -> bool {
        halves_match(self.descriptor.as_ref(), other.descriptor.as_ref())
            && halves_match(self.factory.as_ref(), other.factory.as_ref())
    }
}

impl Eq for SubscriptionKey {}

impl Hash for SubscriptionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
        self.factory.hash(state);
    }
}

/// Active subscriptions, one runner per key.
pub struct Registry {
    ctx: RunnerContext,
    runners: Mutex<AHashMap<SubscriptionKey, Arc<EndpointRunner>>>,
}

impl Registry {
    pub fn new(ctx: RunnerContext) -> Self {
        Self {
            ctx,
            runners: Mutex::new(AHashMap::new()),
        }
    }

    /// Registers a runner for the pair. The runner is returned unstarted.
    pub fn create(
        &self,
        descriptor: &SubscriptionDescriptor,
        factory: &Arc<dyn EndpointFactory>,
    ) -> BridgeResult<Arc<EndpointRunner>> {
        let key = SubscriptionKey::new(Some(descriptor.clone()), Some(Arc::clone(factory)));
        let mut runners = self.runners.lock();
        if runners.contains_key(&key) {
            return Err(BridgeError::AlreadyRegistered);
        }
        let runner = Arc::new(EndpointRunner::new(&self.ctx, descriptor.clone(), Arc::clone(factory)));
        runners.insert(key, Arc::clone(&runner));
        tracing::debug!("[Registry] registered {} ({} active)", descriptor.destination, runners.len());
        Ok(runner)
    }

    /// Unregisters the pair. The runner is returned still running.
    pub fn remove(
        &self,
        descriptor: &SubscriptionDescriptor,
        factory: &Arc<dyn EndpointFactory>,
    ) -> BridgeResult<Arc<EndpointRunner>> {
        let key = SubscriptionKey::new(Some(descriptor.clone()), Some(Arc::clone(factory)));
        self.runners.lock().remove(&key).ok_or(BridgeError::NotRegistered)
    }

    /// Stops and forgets every runner, then cancels pending reconnect waits.
    pub fn dispose_all(&self) {
        let drained: Vec<_> = self.runners.lock().drain().collect();
        for (key, runner) in drained {
            if let Err(e) = runner.stop() {
                let name = key.descriptor().map(|d| d.destination.as_str()).unwrap_or("?");
                tracing::warn!("[Registry] failed to stop {name}: {e}");
            }
        }
        self.ctx.cancel.cancel();
    }

    pub fn contains(&self, descriptor: &SubscriptionDescriptor, factory: &Arc<dyn EndpointFactory>) -> bool {
        let key = SubscriptionKey::new(Some(descriptor.clone()), Some(Arc::clone(factory)));
        self.runners.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.runners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.lock().is_empty()
    }
}
