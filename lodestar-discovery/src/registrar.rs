//! Registration facade for application code

use crate::client::RegistryClient;
use crate::error::Result;
use crate::service::ServiceRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Advertises and withdraws service instances.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Advertise `record` until `ctx` is cancelled
    async fn register(&self, ctx: &CancellationToken, record: ServiceRecord) -> Result<()>;

    /// Withdraw `record`
    async fn unregister(&self, ctx: &CancellationToken, record: &ServiceRecord) -> Result<()>;
}

/// [`Registrar`] delegating to a shared [`RegistryClient`]
#[derive(Clone)]
pub struct ServiceRegistrar {
    client: Arc<RegistryClient>,
}

impl ServiceRegistrar {
    /// Create a registrar bound to `client`
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    /// The underlying client
    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }
}

#[async_trait]
impl Registrar for ServiceRegistrar {
    async fn register(&self, ctx: &CancellationToken, record: ServiceRecord) -> Result<()> {
        self.client.register(ctx, record).await
    }

    async fn unregister(&self, ctx: &CancellationToken, record: &ServiceRecord) -> Result<()> {
        self.client.unregister(ctx, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::options::ClientOptions;
    use crate::store::InMemoryStore;
    use lodestar_log::Logger;

    #[tokio::test]
    async fn test_registrar_delegates() {
        let store = InMemoryStore::new();
        let client = Arc::new(RegistryClient::with_store(
            store.clone(),
            ClientOptions::default().with_logger(Logger::disabled()),
        ));
        let registrar: Box<dyn Registrar> = Box::new(ServiceRegistrar::new(client.clone()));
        let ctx = CancellationToken::new();
        let record = ServiceRecord::new("chat", "10.0.0.1:9000");

        tokio_test::assert_ok!(registrar.register(&ctx, record.clone()).await);
        assert!(store.contains("chat(tcp@10.0.0.1:9000)").await);
        assert_eq!(client.active_registrations(), 1);

        tokio_test::assert_ok!(registrar.unregister(&ctx, &record).await);
        assert!(!store.contains("chat(tcp@10.0.0.1:9000)").await);
        assert!(matches!(
            client.get_service(&ctx, "chat").await,
            Err(DiscoveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_registrar_surfaces_validation_errors() {
        let store = InMemoryStore::new();
        let client = Arc::new(RegistryClient::with_store(
            store.clone(),
            ClientOptions::default().with_logger(Logger::disabled()),
        ));
        let registrar = ServiceRegistrar::new(client.clone());
        assert!(Arc::ptr_eq(registrar.client(), &client));

        let err = registrar
            .register(&CancellationToken::new(), ServiceRecord::new("chat", ""))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.stats().await.total(), 0);

        // the shared client stays usable for lookups
        assert!(matches!(
            registrar.client().get_services(&CancellationToken::new(), "chat").await,
            Err(DiscoveryError::NotFound(_))
        ));
    }
}
