//! Heritage-tagged DNS record management (§4.7). The concrete provider
//! (Route53 in the reference deployment) is reached through [`DnsProvider`];
//! this module only owns the safety rule that keeps the service from ever
//! overwriting a record it did not create.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Value written into the TXT record alongside every A/AAAA record this
/// service manages, so a future call can tell "ours" from "somebody else's".
fn heritage_value(owner: &str) -> String {
    format!("heritage=meridian-control-plane,owner={owner}")
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("record for {hostname} exists and is not managed by this service")]
    Conflict { hostname: String },
    #[error("dns provider failure: {0}")]
    Provider(#[from] anyhow::Error),
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn get_address(&self, hostname: &str) -> anyhow::Result<Option<IpAddr>>;
    async fn get_heritage(&self, hostname: &str) -> anyhow::Result<Option<String>>;
    async fn put_record(&self, hostname: &str, addr: IpAddr, heritage: &str) -> anyhow::Result<()>;
    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()>;
}

pub struct DnsHelper<P: DnsProvider> {
    provider: P,
}

impl<P: DnsProvider> DnsHelper<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Creates the record if absent, replaces its address if this service
    /// owns it already, and refuses to touch it otherwise.
    pub async fn ensure_record(&self, hostname: &str, addr: IpAddr, owner: &str) -> Result<(), DnsError> {
        let heritage = heritage_value(owner);
        match self.provider.get_heritage(hostname).await? {
            None => {
                self.provider.put_record(hostname, addr, &heritage).await?;
                Ok(())
            }
            Some(existing) if existing == heritage => {
                if self.provider.get_address(hostname).await? != Some(addr) {
                    self.provider.put_record(hostname, addr, &heritage).await?;
                }
                Ok(())
            }
            Some(_) => Err(DnsError::Conflict {
                hostname: hostname.to_string(),
            }),
        }
    }

    /// Removes the record pair only if this service's heritage tag matches;
    /// a non-matching or absent record is a silent no-op.
    pub async fn remove_record(&self, hostname: &str, owner: &str) -> Result<(), DnsError> {
        let heritage = heritage_value(owner);
        if self.provider.get_heritage(hostname).await? == Some(heritage) {
            self.provider.delete_record(hostname).await?;
        }
        Ok(())
    }
}

/// In-memory provider for tests. Not suitable for production use; the real
/// deployment reaches Route53 through its own `DnsProvider` implementation,
/// which is outside this crate's scope.
#[derive(Default)]
pub struct InMemoryDnsProvider {
    records: Mutex<HashMap<String, (IpAddr, String)>>,
}

#[async_trait]
impl DnsProvider for InMemoryDnsProvider {
    async fn get_address(&self, hostname: &str) -> anyhow::Result<Option<IpAddr>> {
        Ok(self.records.lock().unwrap().get(hostname).map(|(addr, _)| *addr))
    }

    async fn get_heritage(&self, hostname: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(hostname)
            .map(|(_, heritage)| heritage.clone()))
    }

    async fn put_record(&self, hostname: &str, addr: IpAddr, heritage: &str) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(hostname.to_string(), (addr, heritage.to_string()));
        Ok(())
    }

    async fn delete_record(&self, hostname: &str) -> anyhow::Result<()> {
        self.records.lock().unwrap().remove(hostname);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn creates_record_when_absent() {
        let helper = DnsHelper::new(InMemoryDnsProvider::default());
        helper.ensure_record("c1.example.org", addr("10.0.0.1"), "cluster/c1").await.unwrap();
        assert_eq!(helper.provider.get_address("c1.example.org").await.unwrap(), Some(addr("10.0.0.1")));
    }

    #[tokio::test]
    async fn replaces_address_when_owned() {
        let helper = DnsHelper::new(InMemoryDnsProvider::default());
        helper.ensure_record("c1.example.org", addr("10.0.0.1"), "cluster/c1").await.unwrap();
        helper.ensure_record("c1.example.org", addr("10.0.0.2"), "cluster/c1").await.unwrap();
        assert_eq!(helper.provider.get_address("c1.example.org").await.unwrap(), Some(addr("10.0.0.2")));
    }

    #[tokio::test]
    async fn refuses_to_overwrite_foreign_record() {
        let provider = InMemoryDnsProvider::default();
        provider
            .put_record("c1.example.org", addr("10.0.0.9"), "heritage=someone-else")
            .await
            .unwrap();
        let helper = DnsHelper::new(provider);

        let err = helper
            .ensure_record("c1.example.org", addr("10.0.0.1"), "cluster/c1")
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::Conflict { .. }));
    }

    #[tokio::test]
    async fn remove_is_noop_for_foreign_record() {
        let provider = InMemoryDnsProvider::default();
        provider
            .put_record("c1.example.org", addr("10.0.0.9"), "heritage=someone-else")
            .await
            .unwrap();
        let helper = DnsHelper::new(provider);

        helper.remove_record("c1.example.org", "cluster/c1").await.unwrap();
        assert_eq!(helper.provider.get_address("c1.example.org").await.unwrap(), Some(addr("10.0.0.9")));
    }
}
