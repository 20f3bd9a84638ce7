use super::AuthError;
use crate::{now, sha256, Error, Result};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, http::Uri, web, FromRequest, HttpRequest};
use base64::engine::{general_purpose, Engine};
use nostr_sdk::nostr::Event;
use std::{future::Future, pin::Pin};

/// NIP-98 http auth event kind
pub const HTTP_AUTH_KIND: u32 = 27_235;

/// Max clock difference of the auth event
const MAX_TIME_DIFF_SECONDS: u64 = 60;

/// Verified NIP-98 http auth event with the request body it signs.
#[derive(Debug)]
pub struct NostrAuth {
    pub pubkey: Vec<u8>,
    pub url: Uri,
    pub method: String,
    pub payload_sha: Option<Vec<u8>>,
    pub created_at: i64,
    pub payload: Vec<u8>,
}

/// Absolute request uri, the `u` tag of the auth event must match it.
pub fn full_uri_from_req(req: &HttpRequest) -> Option<Uri> {
    let uri = req.uri();
    if uri.authority().is_some() {
        return Some(uri.clone());
    }
    let info = req.connection_info();
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{}://{}{}", info.scheme(), info.host(), path)
        .parse()
        .ok()
}

fn invalid(msg: &'static str) -> AuthError {
    AuthError::InvalidEvent(msg)
}

impl NostrAuth {
    pub fn verify_time(&self, diff_seconds: u64) -> Result<(), AuthError> {
        if now().abs_diff(self.created_at.max(0) as u64) > diff_seconds {
            return Err(invalid("Invalid nostr event, timestamp out of range"));
        }
        Ok(())
    }

    /// The event must sign this url and method, and the body of a POST.
    pub fn verify_http(&self, url: &Uri, method: &str) -> Result<(), AuthError> {
        if url != &self.url {
            return Err(invalid("Invalid nostr event, invalid url"));
        }
        if method != self.method {
            return Err(invalid("Invalid nostr event, invalid method"));
        }
        if method == "POST" {
            let sha = self
                .payload_sha
                .as_ref()
                .ok_or(invalid("Invalid nostr event, missing payload"))?;
            if &sha256(&self.payload) != sha {
                return Err(invalid("Invalid nostr event, invalid payload"));
            }
        }
        Ok(())
    }

    fn from_token(s: &str, payload: Vec<u8>) -> Result<Self, AuthError> {
        let json = String::from_utf8(general_purpose::STANDARD.decode(s)?)?;
        let event = Event::from_json(json)?;
        event.verify()?;
        if event.kind.as_u32() != HTTP_AUTH_KIND {
            return Err(invalid("Invalid nostr event, wrong kind"));
        }

        let (mut url, mut method, mut payload_sha) = (None, None, None);
        for tag in &event.tags {
            let tag = tag.as_vec();
            let (Some(name), Some(value)) = (tag.first(), tag.get(1)) else {
                continue;
            };
            match name.as_str() {
                "u" => {
                    url = Some(
                        value
                            .parse::<Uri>()
                            .map_err(|_| invalid("Invalid nostr event, invalid url"))?,
                    )
                }
                "method" => method = Some(value.clone()),
                "payload" => {
                    payload_sha = Some(
                        hex::decode(value)
                            .map_err(|_| invalid("Invalid nostr event, invalid payload"))?,
                    )
                }
                _ => {}
            }
        }

        Ok(Self {
            pubkey: event.pubkey.serialize().to_vec(),
            url: url.ok_or(invalid("Invalid nostr event, missing url"))?,
            method: method.ok_or(invalid("Invalid nostr event, missing method"))?,
            payload_sha,
            created_at: event.created_at.as_i64(),
            payload,
        })
    }
}

/// `Nostr <base64 event>` token of the authorization header
fn auth_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("nostr")
        .then(|| token.trim().to_owned())
}

impl FromRequest for NostrAuth {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<NostrAuth>>>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        let mut payload = payload.take();

        Box::pin(async move {
            let token = auth_token(&req).ok_or(invalid("Invalid nostr event, missing auth"))?;
            let body = web::Bytes::from_request(&req, &mut payload)
                .await
                .map_err(|e| Error::Message(e.to_string()))?;
            let auth = NostrAuth::from_token(&token, body.to_vec())?;
            auth.verify_time(MAX_TIME_DIFF_SECONDS)?;
            let url = full_uri_from_req(&req).ok_or(invalid("Invalid nostr event, invalid url"))?;
            auth.verify_http(&url, req.method().as_str())?;
            Ok(auth)
        })
    }
}
