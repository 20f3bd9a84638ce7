//! Nostr publish orchestrator
//!
//! One job per (submission, trigger): build and sign the note, publish it to
//! every relay, retry with backoff while no relay accepts it and dead letter
//! the job once the retries are exhausted.

use crate::{
    event::build_event,
    now,
    relay::{self, NostrRelayClient, RelayClient, RelayPublishStatus},
    service::{NewDeadLetter, NewPublishLog, PublishLogPatch},
    setting::Publish,
    Error, Result, Service,
};
use entity::{
    dead_letter, publish_log,
    publish_log::{Status, Trigger},
    submission,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nostr_sdk::{Event, Keys};
use parking_lot::Mutex;
use serde_json::json;
use std::{collections::HashSet, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Result of a finished publish job.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub log: publish_log::Model,
    pub dead_letter: Option<dead_letter::Model>,
}

pub struct Publisher {
    service: Service,
    client: Box<dyn RelayClient>,
    setting: Publish,
    limiter: Limiter,
    in_flight: Mutex<HashSet<(i32, Trigger)>>,
}

impl Publisher {
    pub fn new(service: Service, client: Box<dyn RelayClient>, setting: Publish) -> Result<Self> {
        if client.relays().is_empty() {
            return Err(Error::Setting("no relays to publish".to_owned()));
        }
        let limiter = RateLimiter::direct(Quota::per_second(setting.rate_limit_per_second));
        Ok(Self {
            service,
            client,
            setting,
            limiter,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Create the publisher with a nostr-sdk client, fails on any missing setting.
    pub fn from_setting(service: Service, setting: &Publish) -> Result<Self> {
        let privkey = setting.check()?;
        let client = NostrRelayClient::new(
            Keys::new(privkey),
            setting.relays.clone(),
            setting.proxy.as_deref(),
        )?;
        Self::new(service, Box::new(client), setting.clone())
    }

    pub fn client(&self) -> &dyn RelayClient {
        self.client.as_ref()
    }

    pub fn setting(&self) -> &Publish {
        &self.setting
    }

    pub fn is_in_flight(&self, submission_id: i32, trigger: Trigger) -> bool {
        self.in_flight.lock().contains(&(submission_id, trigger))
    }

    /// Claim the (submission, trigger) pair and load the submission.
    ///
    /// Fails with `Error::InFlight` while another job of the pair runs in this
    /// process or a recent pending log exists in the database.
    pub async fn prepare(
        self: &Arc<Self>,
        submission_id: i32,
        trigger: Trigger,
    ) -> Result<PublishJob> {
        let guard = InFlightGuard::acquire(self.clone(), submission_id, trigger)?;

        let updated_since = now() as i64 - self.setting.pending_timeout_secs as i64;
        if let Some(pending) = self
            .service
            .find_pending_publish(submission_id, trigger, updated_since)
            .await?
        {
            warn!(
                submission_id,
                trigger = trigger.as_str(),
                log_id = pending.id,
                "publish already pending"
            );
            return Err(Error::InFlight(submission_id, trigger.as_str()));
        }

        let abandoned = self
            .service
            .abandon_stale_publishes(submission_id, trigger, updated_since)
            .await?;
        if abandoned > 0 {
            warn!(
                submission_id,
                trigger = trigger.as_str(),
                abandoned,
                "closed abandoned pending publish"
            );
        }

        let submission = self
            .service
            .get_submission(submission_id)
            .await?
            .ok_or(Error::NotFound("submission"))?;

        Ok(PublishJob {
            guard,
            submission,
            trigger,
        })
    }

    /// Prepare and run a publish job to completion.
    pub async fn publish(
        self: &Arc<Self>,
        submission_id: i32,
        trigger: Trigger,
    ) -> Result<PublishOutcome> {
        self.prepare(submission_id, trigger).await?.run().await
    }

    async fn attempt(&self, event: &Event) -> Vec<RelayPublishStatus> {
        self.limiter.until_ready().await;
        relay::publish_to_relays(self.client(), event, self.setting.relay_timeout()).await
    }
}

/// Run a prepared job in the background.
pub fn dispatch(job: PublishJob) -> JoinHandle<Result<PublishOutcome>> {
    tokio::spawn(async move {
        let submission_id = job.submission.id;
        let trigger = job.trigger;
        let res = job.run().await;
        if let Err(err) = &res {
            error!(
                submission_id,
                trigger = trigger.as_str(),
                error = err.to_string(),
                "publish job failed"
            );
        }
        res
    })
}

struct InFlightGuard {
    publisher: Arc<Publisher>,
    key: (i32, Trigger),
}

impl InFlightGuard {
    fn acquire(publisher: Arc<Publisher>, submission_id: i32, trigger: Trigger) -> Result<Self> {
        let key = (submission_id, trigger);
        if !publisher.in_flight.lock().insert(key) {
            return Err(Error::InFlight(submission_id, trigger.as_str()));
        }
        Ok(Self { publisher, key })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.publisher.in_flight.lock().remove(&self.key);
    }
}

/// A claimed publish job, releases the claim when dropped.
pub struct PublishJob {
    guard: InFlightGuard,
    submission: submission::Model,
    trigger: Trigger,
}

impl PublishJob {
    pub fn submission(&self) -> &submission::Model {
        &self.submission
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub async fn run(self) -> Result<PublishOutcome> {
        let publisher = &self.guard.publisher;
        let service = &publisher.service;
        let setting = &publisher.setting;
        let client = publisher.client();

        let event = build_event(&self.submission, self.trigger).to_event(client.keys())?;
        let relays = client.relays().to_vec();

        let log = service
            .create_publish_log(NewPublishLog {
                event_id: Some(event.id.to_hex()),
                relay_statuses: relays.iter().map(RelayPublishStatus::pending).collect(),
                relays: relays.clone(),
                ..NewPublishLog::new(self.submission.id, self.trigger)
            })
            .await?;
        info!(
            submission_id = self.submission.id,
            trigger = self.trigger.as_str(),
            log_id = log.id,
            event_id = event.id.to_hex(),
            "start nostr publish"
        );

        let mut retries: u32 = 0;
        loop {
            let statuses = publisher.attempt(&event).await;

            if relay::any_success(&statuses) {
                let log = update(
                    service,
                    log.id,
                    PublishLogPatch {
                        status: Some(Status::Success),
                        relay_statuses: Some(statuses),
                        retries: Some(retries),
                        last_error: None,
                        published_at: Some(now() as i64),
                    },
                )
                .await?;
                info!(log_id = log.id, retries, "nostr publish succeeded");
                return Ok(PublishOutcome {
                    log,
                    dead_letter: None,
                });
            }

            let last_error = relay::failure_summary(&statuses);
            if retries >= setting.max_retries {
                let (log, dead_letter) = service
                    .fail_publish(
                        log.id,
                        PublishLogPatch {
                            status: Some(Status::Failed),
                            relay_statuses: Some(statuses),
                            retries: Some(retries),
                            last_error: Some(last_error.clone()),
                            published_at: None,
                        },
                        NewDeadLetter {
                            submission_id: Some(self.submission.id),
                            job_id: format!("nostr-publish:{}", log.id),
                            payload: json!({
                                "submissionId": self.submission.id,
                                "trigger": self.trigger.as_str(),
                                "publishLogId": log.id,
                                "eventId": log.event_id,
                                "relays": relays,
                            }),
                            error: last_error,
                            retries,
                        },
                    )
                    .await?
                    .ok_or(Error::StaleAttempt(log.id))?;
                error!(
                    log_id = log.id,
                    retries,
                    dead_letter_id = dead_letter.id,
                    "nostr publish failed, retries exhausted"
                );
                return Ok(PublishOutcome {
                    log,
                    dead_letter: Some(dead_letter),
                });
            }

            update(
                service,
                log.id,
                PublishLogPatch {
                    status: None,
                    relay_statuses: Some(statuses),
                    retries: Some(retries),
                    last_error: Some(last_error),
                    published_at: None,
                },
            )
            .await?;

            retries += 1;
            let delay = setting.backoff.delay(retries);
            warn!(
                log_id = log.id,
                retries,
                delay_ms = delay.as_millis() as u64,
                "nostr publish failed on all relays, retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

async fn update(service: &Service, id: i32, patch: PublishLogPatch) -> Result<publish_log::Model> {
    service
        .update_publish_log(id, patch)
        .await?
        .ok_or(Error::StaleAttempt(id))
}
