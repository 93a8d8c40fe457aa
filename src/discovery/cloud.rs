use super::{PeerSource, SourceError};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Cloud inventory backend: resolves autoscaling-group names to the
/// addresses of their current instances. Implementations wrap a provider
/// API and are network-bound.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn group_addresses(&self, groups: &[String]) -> Result<Vec<IpAddr>, SourceError>;
}

/// Discovers peers through the instances of the configured autoscaling
/// groups, on the cluster's p2p port.
#[derive(Clone)]
pub struct AutoscalingPeers {
    port: u16,
    groups: Vec<String>,
    inventory: Arc<dyn InstanceInventory>,
}

impl AutoscalingPeers {
    pub fn new(port: u16, groups: Vec<String>, inventory: Arc<dyn InstanceInventory>) -> Self {
        Self {
            port,
            groups,
            inventory,
        }
    }
}

#[async_trait]
impl PeerSource for AutoscalingPeers {
    fn name(&self) -> &'static str {
        "autoscaling"
    }

    async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
        let addrs = self.inventory.group_addresses(&self.groups).await?;
        Ok(addrs
            .into_iter()
            .map(|ip| SocketAddr::new(ip, self.port))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FixedInventory {
        addresses: Vec<IpAddr>,
        queried: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl InstanceInventory for FixedInventory {
        async fn group_addresses(&self, groups: &[String]) -> Result<Vec<IpAddr>, SourceError> {
            self.queried.lock().push(groups.to_vec());
            Ok(self.addresses.clone())
        }
    }

    #[tokio::test]
    async fn maps_instances_onto_cluster_port() {
        let inventory = Arc::new(FixedInventory {
            addresses: vec!["10.0.1.5".parse().unwrap(), "10.0.1.6".parse().unwrap()],
            queried: Mutex::new(Vec::new()),
        });
        let source = AutoscalingPeers::new(2001, vec!["workers".to_string()], inventory.clone());
        let peers = source.peers().await.unwrap();
        assert_eq!(
            peers,
            vec![
                "10.0.1.5:2001".parse::<SocketAddr>().unwrap(),
                "10.0.1.6:2001".parse().unwrap()
            ]
        );
        assert_eq!(inventory.queried.lock().as_slice(), &[vec!["workers".to_string()]]);
    }

    struct FailingInventory;

    #[async_trait]
    impl InstanceInventory for FailingInventory {
        async fn group_addresses(&self, _groups: &[String]) -> Result<Vec<IpAddr>, SourceError> {
            Err(SourceError::Inventory("provider API unavailable".into()))
        }
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let source = AutoscalingPeers::new(2001, Vec::new(), Arc::new(FailingInventory));
        assert!(matches!(
            source.peers().await,
            Err(SourceError::Inventory(_))
        ));
    }
}
