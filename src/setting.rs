use crate::{retry::Backoff, Error, Result};
use config::{Config, Environment, File, FileFormat};
use nostr_sdk::{
    prelude::FromBech32,
    secp256k1::{SecretKey, XOnlyPublicKey},
};
use serde::{Deserialize, Serialize};
use std::{num::NonZeroU32, path::Path, str::FromStr, time::Duration};
use url::Url;

/// number of threads config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Thread {
    /// number of http server threads
    pub http: usize,
}

/// network config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Network {
    /// server bind host
    pub host: String,
    /// server bind port
    pub port: u16,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// admin api config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Admin {
    /// pubkeys (hex or npub) allowed to call the admin api.
    pub pubkeys: Vec<String>,
}

impl Admin {
    pub fn is_admin(&self, pubkey: &str) -> bool {
        self.pubkeys.iter().any(|k| k == pubkey)
    }

    fn validate(&mut self) -> Result<()> {
        self.pubkeys = self
            .pubkeys
            .iter()
            .map(|k| parse_pubkey(k.trim()).map(|k| k.to_string()))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}

fn parse_pubkey(s: &str) -> Result<XOnlyPublicKey> {
    if s.starts_with("npub") {
        XOnlyPublicKey::from_bech32(s)
            .map_err(|e| Error::Setting(format!("invalid admin pubkey {}: {}", s, e)))
    } else {
        XOnlyPublicKey::from_str(s)
            .map_err(|e| Error::Setting(format!("invalid admin pubkey {}: {}", s, e)))
    }
}

/// nostr publish config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Publish {
    pub enabled: bool,
    /// nostr private key for signing the business events
    pub privkey: Option<SecretKey>,
    /// relay servers, published to all of them
    pub relays: Vec<String>,
    /// relay proxy
    pub proxy: Option<String>,

    /// timeout of a single relay publish
    pub relay_timeout_ms: u64,
    /// retries after the first failed attempt
    pub max_retries: u32,
    pub backoff: Backoff,

    pub rate_limit_per_second: NonZeroU32,

    /// a pending publish log not updated for this long no longer blocks new attempts
    pub pending_timeout_secs: u64,
}

impl Default for Publish {
    fn default() -> Self {
        Self {
            enabled: false,
            privkey: None,
            relays: vec![],
            proxy: None,
            relay_timeout_ms: 10_000,
            max_retries: 5,
            backoff: Default::default(),
            rate_limit_per_second: NonZeroU32::new(10).unwrap(),
            pending_timeout_secs: 60 * 60,
        }
    }
}

impl Publish {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    /// Trim and de-duplicate relays, keeping the configured order.
    fn normalize(&mut self) {
        let mut relays: Vec<String> = Vec::with_capacity(self.relays.len());
        for relay in &self.relays {
            let relay = relay.trim();
            if !relay.is_empty() && !relays.iter().any(|r| r == relay) {
                relays.push(relay.to_owned());
            }
        }
        self.relays = relays;
    }

    /// Checks everything the publisher needs to start.
    pub fn check(&self) -> Result<SecretKey> {
        if !self.enabled {
            return Err(Error::PublishDisabled);
        }
        let privkey = self
            .privkey
            .ok_or_else(|| Error::Setting("publish.privkey is required".to_owned()))?;
        if self.relays.is_empty() {
            return Err(Error::Setting("publish.relays is empty".to_owned()));
        }
        for relay in &self.relays {
            let url = Url::parse(relay)
                .map_err(|e| Error::Setting(format!("invalid relay url {}: {}", relay, e)))?;
            if url.scheme() != "ws" && url.scheme() != "wss" {
                return Err(Error::Setting(format!(
                    "relay url must be ws or wss: {}",
                    relay
                )));
            }
        }
        if self.relay_timeout_ms == 0 {
            return Err(Error::Setting(
                "publish.relay_timeout_ms must be greater than 0".to_owned(),
            ));
        }
        Ok(privkey)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Setting {
    /// database url
    /// https://www.sea-ql.org/SeaORM/docs/install-and-config/connection/
    pub db_url: String,

    pub thread: Thread,
    pub network: Network,

    pub admin: Admin,
    pub publish: Publish,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            db_url: "sqlite://satsmap.sqlite?mode=rwc".to_string(),
            thread: Default::default(),
            network: Default::default(),
            admin: Default::default(),
            publish: Default::default(),
        }
    }
}

impl Setting {
    /// read config from file and env
    pub fn read<P: AsRef<Path>>(file: P, env_prefix: Option<String>) -> Result<Self> {
        let builder = Config::builder();
        let path = file
            .as_ref()
            .to_str()
            .ok_or_else(|| Error::Message("invalid config path".to_owned()))?;
        let mut config = builder.add_source(File::with_name(path));
        if let Some(prefix) = env_prefix {
            config = config.add_source(Self::env_source(&prefix));
        }

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn env_source(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .try_parsing(true)
            .prefix_separator("_")
            .separator("__")
            .list_separator(" ")
            .with_list_parse_key("publish.relays")
            .with_list_parse_key("admin.pubkeys")
    }

    /// read config from env
    pub fn from_env(env_prefix: String) -> Result<Self> {
        let mut config = Config::builder();
        config = config.add_source(Self::env_source(&env_prefix));

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    /// config from str
    pub fn from_str(s: &str, format: FileFormat) -> Result<Self> {
        let builder = Config::builder();
        let config = builder.add_source(File::from_str(s, format)).build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn validate(&mut self) -> Result<()> {
        self.publish.normalize();
        self.admin.validate()?;
        Ok(())
    }
}
