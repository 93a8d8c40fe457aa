use super::{PeerSource, SourceError, SOURCE_QUERY_TIMEOUT};
use log::{debug, warn};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// One source's failure within an aggregation cycle.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: SourceError,
}

fn describe(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.source, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every enabled source failed within a single query cycle.
#[derive(Debug, Error)]
#[error("all enabled discovery sources failed: [{}]", describe(.failures))]
pub struct AggregateError {
    pub failures: Vec<SourceFailure>,
}

/// Queries N independent sources as one. Individual failures are logged and
/// skipped; the cycle fails only when no source succeeds. Addresses are
/// returned in source order without deduplication; attempt ordering and
/// dedup belong to the cluster joiner.
pub struct Aggregate {
    sources: Vec<Box<dyn PeerSource>>,
    query_timeout: Duration,
}

impl Aggregate {
    pub fn new(sources: Vec<Box<dyn PeerSource>>) -> Self {
        Self {
            sources,
            query_timeout: SOURCE_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub async fn discover(&self) -> Result<Vec<SocketAddr>, AggregateError> {
        let mut collected = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded = 0usize;

        for source in &self.sources {
            match timeout(self.query_timeout, source.peers()).await {
                Ok(Ok(addrs)) => {
                    debug!(
                        "event=discovery_source_ok source={} peers={}",
                        source.name(),
                        addrs.len()
                    );
                    succeeded += 1;
                    collected.extend(addrs);
                }
                Ok(Err(error)) => {
                    warn!(
                        "event=discovery_source_failed source={} err={error}",
                        source.name()
                    );
                    failures.push(SourceFailure {
                        source: source.name(),
                        error,
                    });
                }
                Err(_) => {
                    warn!(
                        "event=discovery_source_timeout source={} after={:?}",
                        source.name(),
                        self.query_timeout
                    );
                    failures.push(SourceFailure {
                        source: source.name(),
                        error: SourceError::Timeout(self.query_timeout),
                    });
                }
            }
        }

        if succeeded == 0 && !failures.is_empty() {
            return Err(AggregateError { failures });
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticPeers;
    use async_trait::async_trait;

    struct Failing(&'static str);

    #[async_trait]
    impl PeerSource for Failing {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
            Err(SourceError::Dial("connection refused".into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl PeerSource for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn peers(&self) -> Result<Vec<SocketAddr>, SourceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn disabled_sources_never_fail_aggregation() {
        let aggregate = Aggregate::new(vec![
            Box::new(StaticPeers::disabled()),
            Box::new(StaticPeers::disabled()),
        ]);
        assert!(aggregate.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_failure_is_isolated() {
        let aggregate = Aggregate::new(vec![
            Box::new(Failing("p2p")),
            Box::new(StaticPeers::new(vec![addr("10.0.0.1:2001")])),
        ]);
        assert_eq!(aggregate.discover().await.unwrap(), vec![addr("10.0.0.1:2001")]);
    }

    #[tokio::test]
    async fn fails_only_when_every_enabled_source_fails() {
        let aggregate = Aggregate::new(vec![Box::new(Failing("p2p")), Box::new(Failing("dns"))]);
        let err = aggregate.discover().await.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        let message = err.to_string();
        assert!(message.contains("p2p"));
        assert!(message.contains("dns"));
    }

    #[tokio::test]
    async fn preserves_source_order_without_dedup() {
        let aggregate = Aggregate::new(vec![
            Box::new(StaticPeers::new(vec![addr("10.0.0.1:2001"), addr("10.0.0.2:2001")])),
            Box::new(StaticPeers::new(vec![addr("10.0.0.1:2001")])),
        ]);
        assert_eq!(
            aggregate.discover().await.unwrap(),
            vec![
                addr("10.0.0.1:2001"),
                addr("10.0.0.2:2001"),
                addr("10.0.0.1:2001")
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sources_are_time_bounded() {
        let aggregate = Aggregate::new(vec![Box::new(Hanging)])
            .with_query_timeout(Duration::from_millis(50));
        let err = aggregate.discover().await.unwrap_err();
        assert!(matches!(
            err.failures.as_slice(),
            [SourceFailure {
                error: SourceError::Timeout(_),
                ..
            }]
        ));
    }
}
