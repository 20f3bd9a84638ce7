mod admin;
mod nostr;

pub use admin::*;
pub use nostr::*;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("decode error")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("decode error")]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
    #[error("invalid event")]
    Event(#[from] nostr_sdk::nostr::event::Error),
    #[error("{0}")]
    InvalidEvent(&'static str),
    #[error("Pubkey not in whitelist")]
    Whitelist,
}
