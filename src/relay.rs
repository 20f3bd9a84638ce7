//! Publish events to nostr relays and track the outcome of every relay.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use nostr_sdk::{Client, Event, Keys, Options};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    str::FromStr,
    time::{Duration, Instant},
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Outcome of publishing to one relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayStatus {
    Success {
        #[serde(rename = "latencyMs", default, skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pending,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RelayPublishStatus {
    pub relay: String,
    #[serde(flatten)]
    pub status: RelayStatus,
}

impl RelayPublishStatus {
    pub fn pending(relay: impl Into<String>) -> Self {
        Self {
            relay: relay.into(),
            status: RelayStatus::Pending,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RelayStatus::Success { .. })
    }
}

/// At least one relay accepted the event.
pub fn any_success(statuses: &[RelayPublishStatus]) -> bool {
    statuses.iter().any(RelayPublishStatus::is_success)
}

/// Join the errors of failed relays, none if nothing failed.
pub fn failure_summary(statuses: &[RelayPublishStatus]) -> Option<String> {
    let errors = statuses
        .iter()
        .filter_map(|s| match &s.status {
            RelayStatus::Failed { error } => Some(format!(
                "{}: {}",
                s.relay,
                error.as_deref().unwrap_or("unknown error")
            )),
            RelayStatus::Success { .. } | RelayStatus::Pending => None,
        })
        .collect::<Vec<_>>();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

pub fn encode_statuses(statuses: &[RelayPublishStatus]) -> Result<String> {
    Ok(serde_json::to_string(statuses)?)
}

pub fn decode_statuses(json: &str) -> Result<Vec<RelayPublishStatus>> {
    Ok(serde_json::from_str(json)?)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("{0}")]
    Rejected(String),
    #[error("connection: {0}")]
    Connection(String),
}

/// The nostr client used by the publisher.
///
/// Owns the signer and the relay connections.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// signer of published events
    fn keys(&self) -> &Keys;

    /// configured relays, in publish order
    fn relays(&self) -> &[String];

    /// publish the event to one relay, resolves after the relay answers.
    async fn send_event_to(&self, relay: &str, event: &Event) -> Result<(), RelayError>;
}

/// Publish to all relays of the client concurrently.
///
/// Every relay gets exactly one status in the configured order, a relay that
/// doesn't answer within `timeout` is failed with a timeout error.
pub async fn publish_to_relays(
    client: &dyn RelayClient,
    event: &Event,
    timeout: Duration,
) -> Vec<RelayPublishStatus> {
    let futures = client.relays().iter().map(|relay| async move {
        let start = Instant::now();
        let res = match tokio::time::timeout(timeout, client.send_event_to(relay, event)).await {
            Ok(res) => res,
            Err(_) => Err(RelayError::Timeout(timeout)),
        };
        let status = match res {
            Ok(()) => RelayStatus::Success {
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(err) => {
                debug!(relay = relay.as_str(), error = err.to_string(), "relay publish failed");
                RelayStatus::Failed {
                    error: Some(err.to_string()),
                }
            }
        };
        RelayPublishStatus {
            relay: relay.clone(),
            status,
        }
    });
    join_all(futures).await
}

/// Relay client backed by nostr-sdk, connects on first publish.
pub struct NostrRelayClient {
    client: Client,
    keys: Keys,
    relays: Vec<String>,
    proxy: Option<SocketAddr>,
    connected: OnceCell<()>,
}

impl NostrRelayClient {
    pub fn new(keys: Keys, relays: Vec<String>, proxy: Option<&str>) -> Result<Self> {
        if relays.is_empty() {
            return Err(Error::Setting("no relays to publish".to_owned()));
        }
        let proxy = match proxy {
            Some(proxy) => Some(
                SocketAddr::from_str(proxy)
                    .map_err(|e| Error::Setting(format!("invalid proxy {}: {}", proxy, e)))?,
            ),
            None => None,
        };
        let opts = Options::new().wait_for_send(true);
        let client = Client::with_opts(&keys, opts);
        Ok(Self {
            client,
            keys,
            relays,
            proxy,
            connected: OnceCell::new(),
        })
    }

    async fn connect(&self) -> Result<(), RelayError> {
        self.connected
            .get_or_try_init(|| async {
                for url in &self.relays {
                    self.client
                        .add_relay(url.as_str(), self.proxy)
                        .await
                        .map_err(|e| RelayError::Connection(e.to_string()))?;
                }
                self.client.connect().await;
                info!(relays = self.relays.len(), "connected nostr relays");
                Ok::<(), RelayError>(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RelayClient for NostrRelayClient {
    fn keys(&self) -> &Keys {
        &self.keys
    }

    fn relays(&self) -> &[String] {
        &self.relays
    }

    async fn send_event_to(&self, relay: &str, event: &Event) -> Result<(), RelayError> {
        self.connect().await?;
        self.client
            .send_event_to(relay, event.clone())
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Kind};
    use std::collections::HashMap;

    enum Answer {
        Ok,
        Err(&'static str),
        Hang,
    }

    struct Scripted {
        keys: Keys,
        relays: Vec<String>,
        answers: HashMap<String, Answer>,
    }

    #[async_trait]
    impl RelayClient for Scripted {
        fn keys(&self) -> &Keys {
            &self.keys
        }

        fn relays(&self) -> &[String] {
            &self.relays
        }

        async fn send_event_to(&self, relay: &str, _event: &Event) -> Result<(), RelayError> {
            match self.answers.get(relay) {
                Some(Answer::Ok) => Ok(()),
                Some(Answer::Err(e)) => Err(RelayError::Rejected(e.to_string())),
                Some(Answer::Hang) | None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn concurrent_publish() -> anyhow::Result<()> {
        let keys = Keys::generate();
        let relays = vec![
            "wss://a.example".to_owned(),
            "wss://b.example".to_owned(),
            "wss://c.example".to_owned(),
            "wss://d.example".to_owned(),
        ];
        let client = Scripted {
            keys: keys.clone(),
            relays: relays.clone(),
            answers: HashMap::from([
                (relays[0].clone(), Answer::Hang),
                (relays[1].clone(), Answer::Ok),
                (relays[2].clone(), Answer::Err("blocked: spam")),
                (relays[3].clone(), Answer::Hang),
            ]),
        };
        let event = EventBuilder::new(Kind::TextNote, "hi", &[]).to_event(&keys)?;

        let start = Instant::now();
        let statuses = publish_to_relays(&client, &event, Duration::from_millis(200)).await;
        // hanging relays time out together
        assert!(start.elapsed() < Duration::from_millis(1_000));

        assert_eq!(statuses.len(), 4);
        assert_eq!(
            statuses.iter().map(|s| s.relay.clone()).collect::<Vec<_>>(),
            relays
        );
        assert_eq!(
            statuses[0].status,
            RelayStatus::Failed {
                error: Some("timeout after 200ms".to_owned())
            }
        );
        assert!(statuses[1].is_success());
        assert_eq!(
            statuses[2].status,
            RelayStatus::Failed {
                error: Some("blocked: spam".to_owned())
            }
        );
        assert!(any_success(&statuses));
        assert_eq!(
            failure_summary(&statuses).unwrap(),
            "wss://a.example: timeout after 200ms; wss://c.example: blocked: spam; wss://d.example: timeout after 200ms"
        );
        Ok(())
    }

    #[test]
    fn status_json() -> anyhow::Result<()> {
        let statuses = vec![
            RelayPublishStatus {
                relay: "wss://a.example".to_owned(),
                status: RelayStatus::Success {
                    latency_ms: Some(12),
                },
            },
            RelayPublishStatus {
                relay: "wss://b.example".to_owned(),
                status: RelayStatus::Failed { error: None },
            },
            RelayPublishStatus::pending("wss://c.example"),
        ];
        let json = encode_statuses(&statuses)?;
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&json)?,
            serde_json::json!([
                {"relay": "wss://a.example", "status": "success", "latencyMs": 12},
                {"relay": "wss://b.example", "status": "failed"},
                {"relay": "wss://c.example", "status": "pending"},
            ])
        );
        assert_eq!(decode_statuses(&json)?, statuses);
        assert!(!any_success(&statuses[1..]));
        assert_eq!(
            failure_summary(&statuses).as_deref(),
            Some("wss://b.example: unknown error")
        );
        assert_eq!(failure_summary(&statuses[2..]), None);
        Ok(())
    }

    #[tokio::test]
    async fn nostr_client() {
        let keys = Keys::generate();
        assert!(matches!(
            NostrRelayClient::new(keys.clone(), vec![], None),
            Err(Error::Setting(_))
        ));
        assert!(matches!(
            NostrRelayClient::new(
                keys.clone(),
                vec!["wss://relay.example".to_owned()],
                Some("not an addr")
            ),
            Err(Error::Setting(_))
        ));
        let client = NostrRelayClient::new(
            keys.clone(),
            vec!["wss://relay.example".to_owned()],
            Some("127.0.0.1:9050"),
        )
        .unwrap();
        assert_eq!(client.relays(), ["wss://relay.example".to_owned()]);
        assert_eq!(client.keys().public_key(), keys.public_key());
    }
}
