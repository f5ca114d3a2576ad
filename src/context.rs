//! Explicit runtime context shared by bridge instances.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::adapter::{OutboundProvider, UnavailableProvider};
use crate::error::{Error, Result};

/// Everything a bridge needs from its host: a runtime to spawn tasks on and a
/// provider that builds protocol adapters.
#[derive(Clone)]
pub struct Context {
    runtime: Handle,
    provider: Arc<dyn OutboundProvider>,
}

impl Context {
    /// Context on `runtime` with no outbound provider registered.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            provider: Arc::new(UnavailableProvider),
        }
    }

    /// Context on the runtime the caller is currently running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| Error::Runtime)
    }

    /// Replace the outbound provider.
    pub fn with_provider(mut self, provider: Arc<dyn OutboundProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Runtime bridge tasks are spawned on.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Provider used by the protocol constructors.
    pub fn provider(&self) -> &dyn OutboundProvider {
        self.provider.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_runtime() {
        assert!(matches!(Context::current(), Err(Error::Runtime)));
    }

    #[tokio::test]
    async fn test_current_runtime() {
        let ctx = Context::current().unwrap();
        let value = ctx.runtime().spawn(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
