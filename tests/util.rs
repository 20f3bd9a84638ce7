#![allow(unused)]

use actix_http::{body::MessageBody, header::AUTHORIZATION, Method, Request};
use actix_web::{
    dev::{Service, ServiceResponse},
    test::{call_service, read_body, TestRequest},
};
use anyhow::Result;
use async_trait::async_trait;
use base64::engine::{general_purpose, Engine};
use entity::submission;
use migration::{Migrator, MigratorTrait};
use nostr_sdk::{secp256k1::SecretKey, Event, EventBuilder, Keys, Kind, Tag};
use parking_lot::Mutex;
use satsmap::{
    connect_db,
    now,
    relay::{RelayClient, RelayError},
    retry::Backoff,
    setting::{Publish, Setting},
    sha256, AppState, Publisher, Service as DbService,
};
use sea_orm::{ActiveModelTrait, NotSet, Set};
use serde_json::Value;
use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

pub const ALICE_SK: &str = "6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e";
pub const BOB_SK: &str = "7b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e";

pub const BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Ok,
    Err(&'static str),
    Hang,
}

/// Relay client answering from a per relay script.
///
/// The nth publish to a relay gets the nth answer, the last answer repeats.
pub struct ScriptedRelays {
    keys: Keys,
    relays: Vec<String>,
    script: HashMap<String, Vec<Answer>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedRelays {
    pub fn new(script: Vec<(&str, Vec<Answer>)>) -> Self {
        Self {
            keys: Keys::generate(),
            relays: script.iter().map(|(r, _)| r.to_string()).collect(),
            script: script
                .into_iter()
                .map(|(r, a)| (r.to_string(), a))
                .collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self, relay: &str) -> usize {
        self.calls.lock().get(relay).copied().unwrap_or_default()
    }
}

#[async_trait]
impl RelayClient for ScriptedRelays {
    fn keys(&self) -> &Keys {
        &self.keys
    }

    fn relays(&self) -> &[String] {
        &self.relays
    }

    async fn send_event_to(&self, relay: &str, event: &Event) -> Result<(), RelayError> {
        assert!(event.verify().is_ok());
        let n = {
            let mut calls = self.calls.lock();
            let n = calls.entry(relay.to_owned()).or_default();
            *n += 1;
            *n - 1
        };
        let answers = &self.script[relay];
        match answers[n.min(answers.len() - 1)] {
            Answer::Ok => Ok(()),
            Answer::Err(e) => Err(RelayError::Rejected(e.to_owned())),
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Shared handle so tests can inspect the client after handing it over.
pub struct SharedRelays(pub Arc<ScriptedRelays>);

#[async_trait]
impl RelayClient for SharedRelays {
    fn keys(&self) -> &Keys {
        self.0.keys()
    }

    fn relays(&self) -> &[String] {
        self.0.relays()
    }

    async fn send_event_to(&self, relay: &str, event: &Event) -> Result<(), RelayError> {
        self.0.send_event_to(relay, event).await
    }
}

/// Fast publish setting for tests.
pub fn publish_setting(max_retries: u32) -> Publish {
    Publish {
        enabled: true,
        privkey: Some(SecretKey::from_str(BOB_SK).unwrap()),
        relay_timeout_ms: 100,
        max_retries,
        backoff: Backoff {
            initial_ms: 10,
            max_ms: 40,
        },
        ..Default::default()
    }
}

pub async fn create_service() -> Result<DbService> {
    let conn = connect_db("sqlite::memory:").await?;
    Migrator::fresh(&conn).await?;
    Ok(DbService::new(conn))
}

/// In memory app state, alice is the admin.
pub async fn create_test_state(relays: Option<Arc<ScriptedRelays>>) -> Result<AppState> {
    let service = create_service().await?;
    let mut setting = Setting::default();
    setting.admin.pubkeys = vec![Keys::new(SecretKey::from_str(ALICE_SK)?)
        .public_key()
        .to_string()];
    let publisher = match relays {
        Some(relays) => {
            setting.publish = publish_setting(1);
            setting.publish.relays = relays.relays().to_vec();
            Some(Arc::new(Publisher::new(
                service.clone(),
                Box::new(SharedRelays(relays)),
                setting.publish.clone(),
            )?))
        }
        None => None,
    };
    Ok(AppState {
        service,
        setting,
        publisher,
    })
}

pub async fn insert_submission(service: &DbService, name: &str) -> Result<submission::Model> {
    let time = now() as i64;
    let model = submission::ActiveModel {
        id: NotSet,
        status: Set(submission::Status::Pending),
        name: Set(name.to_owned()),
        category: Set(Some("cafe".to_owned())),
        street: Set(Some("1 George St".to_owned())),
        city: Set(Some("Sydney".to_owned())),
        state: Set(Some("NSW".to_owned())),
        postcode: Set(Some("2000".to_owned())),
        country: Set(Some("AU".to_owned())),
        latitude: Set(Some(-33.865143)),
        longitude: Set(Some(151.2099)),
        website: Set(None),
        phone: Set(None),
        email: Set(None),
        bitcoin_details: Set(r#"{"lightning":true}"#.to_owned()),
        notes: Set(Some("<b>Lightning</b> at the counter".to_owned())),
        created_at: Set(time),
        updated_at: Set(time),
    };
    Ok(model.insert(service.db()).await?)
}

/// NIP-98 authorization header value.
pub fn nostr_auth(sk: &str, url: &str, method: &str, body: Option<&[u8]>) -> Result<String> {
    let keys = Keys::new(SecretKey::from_str(sk)?);
    let mut tags = vec![
        Tag::try_from(vec!["u", url])?,
        Tag::try_from(vec!["method", method])?,
    ];
    if let Some(body) = body {
        tags.push(Tag::try_from(vec!["payload", &hex::encode(sha256(body))])?);
    }
    let event = EventBuilder::new(Kind::from(27235), "", &tags).to_event(&keys)?;
    Ok(format!(
        "Nostr {}",
        general_purpose::STANDARD.encode(event.as_json())
    ))
}

pub fn get_req(path: &str) -> TestRequest {
    TestRequest::with_uri(&format!("{}{}", BASE_URL, path))
}

pub fn post_req(path: &str, data: Value) -> TestRequest {
    TestRequest::with_uri(&format!("{}{}", BASE_URL, path))
        .method(Method::POST)
        .set_json(data)
}

pub fn admin_get(path: &str) -> Result<TestRequest> {
    let auth = nostr_auth(ALICE_SK, &format!("{}{}", BASE_URL, path), "GET", None)?;
    Ok(get_req(path).insert_header((AUTHORIZATION, auth)))
}

pub fn admin_post(sk: &str, path: &str, data: Value) -> Result<TestRequest> {
    let body = serde_json::to_vec(&data)?;
    let auth = nostr_auth(sk, &format!("{}{}", BASE_URL, path), "POST", Some(&body))?;
    Ok(post_req(path, data).insert_header((AUTHORIZATION, auth)))
}

/// Call the service, returns json body and status code.
pub async fn call<S, B>(req: TestRequest, app: &S) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let res = call_service(app, req.to_request()).await;
    let status = res.status().as_u16();
    let body = read_body(res).await;
    let val = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((val, status))
}
