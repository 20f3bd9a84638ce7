//! admin http api

use crate::{
    publisher::{dispatch, Publisher},
    relay::{decode_statuses, RelayPublishStatus},
    AdminAuth, AppState, Error, Result,
};
use actix_web::{get, post, web, HttpResponse, Responder, Scope};
use chrono::{SecondsFormat, TimeZone, Utc};
use entity::{dead_letter, publish_log, publish_log::Trigger};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};
use tracing::info;

pub const CARGO_PKG_VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn version() -> String {
    CARGO_PKG_VERSION.map(ToOwned::to_owned).unwrap_or_default()
}

pub fn scope() -> Scope {
    web::scope("/v1")
        .service(info)
        .service(publish_status)
        .service(publish)
        .service(approve)
        .service(dead_letters)
}

/// RFC 3339 UTC time of a unix timestamp
pub fn iso_time(secs: i64) -> Option<String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishLogView {
    pub id: i32,
    pub submission_id: i32,
    pub trigger: String,
    pub status: String,
    pub event_id: Option<String>,
    pub relays: Vec<String>,
    pub relay_statuses: Vec<RelayPublishStatus>,
    pub retries: i32,
    pub last_error: Option<String>,
    pub published_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl TryFrom<publish_log::Model> for PublishLogView {
    type Error = Error;

    fn try_from(log: publish_log::Model) -> Result<Self> {
        Ok(Self {
            id: log.id,
            submission_id: log.submission_id,
            trigger: log.trigger.as_str().to_owned(),
            status: log.status.as_str().to_owned(),
            relays: serde_json::from_str(&log.relays)?,
            relay_statuses: decode_statuses(&log.relay_statuses)?,
            event_id: log.event_id,
            retries: log.retries,
            last_error: log.last_error,
            published_at: log.published_at.and_then(iso_time),
            created_at: iso_time(log.created_at),
            updated_at: iso_time(log.updated_at),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatusView {
    pub latest_status: Option<String>,
    pub logs: Vec<PublishLogView>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterView {
    pub id: i32,
    pub submission_id: Option<i32>,
    pub job_id: String,
    pub payload: Value,
    pub error: Option<String>,
    pub retries: i32,
    pub created_at: Option<String>,
}

impl TryFrom<dead_letter::Model> for DeadLetterView {
    type Error = Error;

    fn try_from(m: dead_letter::Model) -> Result<Self> {
        Ok(Self {
            id: m.id,
            submission_id: m.submission_id,
            job_id: m.job_id,
            payload: serde_json::from_str(&m.payload)?,
            error: m.error,
            retries: m.retries,
            created_at: iso_time(m.created_at),
        })
    }
}

fn get_publisher(state: &AppState) -> Result<&Arc<Publisher>> {
    state.publisher.as_ref().ok_or(Error::PublishDisabled)
}

#[get("/info")]
pub async fn info(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let publish_info = state.publisher.as_ref().map(|p| {
        json!({
            "pubkey": p.client().keys().public_key().to_string(),
            "relays": p.client().relays(),
            "max_retries": p.setting().max_retries,
        })
    });
    Ok(HttpResponse::Ok().json(json!({
        "version": version(),
        "publish": publish_info,
    })))
}

/// publish history of a submission
#[get("/submissions/{id}/publish")]
pub async fn publish_status(
    state: web::Data<AppState>,
    _admin: AdminAuth,
    id: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let logs = state
        .service
        .list_publish_logs(id.into_inner())
        .await?
        .into_iter()
        .map(PublishLogView::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(web::Json(PublishStatusView {
        latest_status: logs.first().map(|l| l.status.clone()),
        logs,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PublishReq {
    trigger: Option<String>,
}

/// publish a submission again
#[post("/submissions/{id}/publish")]
pub async fn publish(
    state: web::Data<AppState>,
    admin: AdminAuth,
    id: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let data: PublishReq = if admin.auth.payload.is_empty() {
        Default::default()
    } else {
        admin.json()?
    };
    let trigger = match data.trigger.as_deref() {
        Some(t) => Trigger::from_str(t).map_err(Error::InvalidParam)?,
        None => Trigger::Approval,
    };
    let job = get_publisher(&state)?.prepare(id.into_inner(), trigger).await?;
    info!(
        submission_id = job.submission().id,
        trigger = trigger.as_str(),
        admin = admin.pubkey.as_str(),
        "dispatch nostr publish"
    );
    let _r = dispatch(job);
    Ok(HttpResponse::Accepted().json(json!({"success": true})))
}

/// approve a submission and publish the approval
#[post("/submissions/{id}/approve")]
pub async fn approve(
    state: web::Data<AppState>,
    admin: AdminAuth,
    id: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let submission = state.service.approve_submission(id.into_inner()).await?;
    info!(
        submission_id = submission.id,
        admin = admin.pubkey.as_str(),
        "submission approved"
    );
    let dispatched = match &state.publisher {
        Some(p) => match p.prepare(submission.id, Trigger::Approval).await {
            Ok(job) => {
                let _r = dispatch(job);
                true
            }
            // the running approval publish covers this approval
            Err(Error::InFlight(..)) => false,
            Err(err) => return Err(err),
        },
        None => false,
    };
    Ok(web::Json(json!({
        "success": true,
        "publish": dispatched,
    })))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLettersReq {
    limit: u64,
}

impl Default for DeadLettersReq {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

/// abandoned publish jobs
#[get("/dead_letters")]
pub async fn dead_letters(
    state: web::Data<AppState>,
    _admin: AdminAuth,
    query: web::Query<DeadLettersReq>,
) -> Result<impl Responder, Error> {
    let limit = query.limit.clamp(1, 500);
    let list = state
        .service
        .list_dead_letters(limit)
        .await?
        .into_iter()
        .map(DeadLetterView::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(web::Json(json!({ "dead_letters": list })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayStatus;
    use entity::publish_log::Status;

    #[test]
    fn time() {
        assert_eq!(iso_time(0).as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(
            iso_time(1_710_238_500).as_deref(),
            Some("2024-03-12T10:15:00Z")
        );
    }

    #[test]
    fn log_view() -> anyhow::Result<()> {
        let log = publish_log::Model {
            id: 3,
            submission_id: 7,
            trigger: Trigger::Approval,
            status: Status::Failed,
            event_id: Some("ab".to_owned()),
            relays: r#"["wss://a.example"]"#.to_owned(),
            relay_statuses: r#"[{"relay":"wss://a.example","status":"failed","error":"timeout after 10ms"}]"#.to_owned(),
            retries: 2,
            last_error: Some("wss://a.example: timeout after 10ms".to_owned()),
            published_at: None,
            created_at: 0,
            updated_at: 1_710_238_500,
        };
        let view = PublishLogView::try_from(log)?;
        assert_eq!(view.trigger, "approval");
        assert_eq!(view.status, "failed");
        assert_eq!(
            view.relay_statuses[0].status,
            RelayStatus::Failed {
                error: Some("timeout after 10ms".to_owned())
            }
        );
        let json = serde_json::to_value(&view)?;
        assert_eq!(json["submissionId"], json!(7));
        assert_eq!(json["relayStatuses"][0]["relay"], json!("wss://a.example"));
        assert_eq!(json["lastError"], json!("wss://a.example: timeout after 10ms"));
        assert_eq!(json["publishedAt"], Value::Null);
        assert_eq!(json["createdAt"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(json["updatedAt"], json!("2024-03-12T10:15:00Z"));
        Ok(())
    }
}
