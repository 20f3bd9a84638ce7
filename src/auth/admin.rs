use super::{AuthError, NostrAuth};
use crate::{AppState, Error, Result};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use serde::de::DeserializeOwned;
use std::{future::Future, pin::Pin};

/// Nostr auth of a pubkey listed in `admin.pubkeys`
#[derive(Debug)]
pub struct AdminAuth {
    /// hex pubkey
    pub pubkey: String,
    pub auth: NostrAuth,
}

impl AdminAuth {
    /// Parse the signed json payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.auth.payload)?)
    }
}

impl FromRequest for AdminAuth {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<AdminAuth>>>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let req = req.clone();
        let fut = NostrAuth::from_request(&req, pl);
        Box::pin(async move {
            let auth = fut.await?;
            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or(Error::Str("AppState required"))?;
            let pubkey = hex::encode(&auth.pubkey);
            if !state.setting.admin.is_admin(&pubkey) {
                return Err(AuthError::Whitelist.into());
            }
            Ok(AdminAuth { pubkey, auth })
        })
    }
}
