use crate::{
    now,
    relay::{encode_statuses, RelayPublishStatus},
    Error, Result,
};
use entity::{
    dead_letter, publish_log,
    publish_log::{Status, Trigger},
    submission,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;

/// New publish log row, status defaults to pending.
#[derive(Debug, Clone)]
pub struct NewPublishLog {
    pub submission_id: i32,
    pub trigger: Trigger,
    pub status: Option<Status>,
    pub event_id: Option<String>,
    pub relays: Vec<String>,
    pub relay_statuses: Vec<RelayPublishStatus>,
}

impl NewPublishLog {
    pub fn new(submission_id: i32, trigger: Trigger) -> Self {
        Self {
            submission_id,
            trigger,
            status: None,
            event_id: None,
            relays: vec![],
            relay_statuses: vec![],
        }
    }
}

/// Partial update of a publish log, unset fields are kept.
#[derive(Debug, Clone, Default)]
pub struct PublishLogPatch {
    pub status: Option<Status>,
    pub relay_statuses: Option<Vec<RelayPublishStatus>>,
    /// retry count of the attempt writing the patch
    pub retries: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub published_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub submission_id: Option<i32>,
    pub job_id: String,
    /// job payload snapshot, a json object
    pub payload: Value,
    pub error: Option<String>,
    pub retries: u32,
}

/// last error of a pending log left behind by a dead job
pub const ABANDONED_ERROR: &str = "abandoned";

/// Database access of the publish pipeline
#[derive(Clone)]
pub struct Service {
    conn: DbConn,
}

impl Service {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    pub async fn get_submission(&self, id: i32) -> Result<Option<submission::Model>> {
        Ok(submission::Entity::find_by_id(id).one(self.db()).await?)
    }

    /// Mark a submission approved, approving twice is allowed.
    pub async fn approve_submission(&self, id: i32) -> Result<submission::Model> {
        let res = submission::Entity::update_many()
            .set(submission::ActiveModel {
                status: Set(submission::Status::Approved),
                updated_at: Set(now() as i64),
                ..Default::default()
            })
            .filter(submission::Column::Id.eq(id))
            .exec(self.db())
            .await?;
        if res.rows_affected != 1 {
            return Err(Error::NotFound("submission"));
        }
        self.get_submission(id)
            .await?
            .ok_or(Error::NotFound("submission"))
    }

    pub async fn get_publish_log(&self, id: i32) -> Result<Option<publish_log::Model>> {
        Ok(publish_log::Entity::find_by_id(id).one(self.db()).await?)
    }

    /// The most recent successful publish of a submission.
    pub async fn get_latest_successful_publish(
        &self,
        submission_id: i32,
    ) -> Result<Option<publish_log::Model>> {
        Ok(publish_log::Entity::find()
            .filter(publish_log::Column::SubmissionId.eq(submission_id))
            .filter(publish_log::Column::Status.eq(Status::Success))
            .order_by_desc(publish_log::Column::CreatedAt)
            .order_by_desc(publish_log::Column::Id)
            .one(self.db())
            .await?)
    }

    /// A pending publish of the pair updated after `updated_since`.
    pub async fn find_pending_publish(
        &self,
        submission_id: i32,
        trigger: Trigger,
        updated_since: i64,
    ) -> Result<Option<publish_log::Model>> {
        Ok(publish_log::Entity::find()
            .filter(publish_log::Column::SubmissionId.eq(submission_id))
            .filter(publish_log::Column::Trigger.eq(trigger))
            .filter(publish_log::Column::Status.eq(Status::Pending))
            .filter(publish_log::Column::UpdatedAt.gte(updated_since))
            .order_by_desc(publish_log::Column::Id)
            .one(self.db())
            .await?)
    }

    /// All publish logs of a submission, newest first.
    pub async fn list_publish_logs(&self, submission_id: i32) -> Result<Vec<publish_log::Model>> {
        Ok(publish_log::Entity::find()
            .filter(publish_log::Column::SubmissionId.eq(submission_id))
            .order_by_desc(publish_log::Column::CreatedAt)
            .order_by_desc(publish_log::Column::Id)
            .all(self.db())
            .await?)
    }

    pub async fn create_publish_log(&self, input: NewPublishLog) -> Result<publish_log::Model> {
        let time = now() as i64;
        let model = publish_log::ActiveModel {
            id: NotSet,
            submission_id: Set(input.submission_id),
            trigger: Set(input.trigger),
            status: Set(input.status.unwrap_or(Status::Pending)),
            event_id: Set(input.event_id),
            relays: Set(serde_json::to_string(&input.relays)?),
            relay_statuses: Set(encode_statuses(&input.relay_statuses)?),
            retries: Set(0),
            last_error: Set(None),
            published_at: Set(None),
            created_at: Set(time),
            updated_at: Set(time),
        };
        Ok(model.insert(self.db()).await?)
    }

    /// Apply a patch to a pending publish log.
    ///
    /// Returns none without writing if the log is no longer pending or was
    /// already written by an attempt with a higher retry count.
    pub async fn update_publish_log(
        &self,
        id: i32,
        patch: PublishLogPatch,
    ) -> Result<Option<publish_log::Model>> {
        patch_publish_log(self.db(), id, patch).await
    }

    /// Close a publish log as failed and dead letter the job, both or neither.
    ///
    /// Returns none and writes nothing if the log is no longer pending or
    /// was written by a newer attempt.
    pub async fn fail_publish(
        &self,
        id: i32,
        patch: PublishLogPatch,
        dead_letter: NewDeadLetter,
    ) -> Result<Option<(publish_log::Model, dead_letter::Model)>> {
        let patch = PublishLogPatch {
            status: Some(Status::Failed),
            ..patch
        };
        let txn = self.conn.begin().await?;
        let log = match patch_publish_log(&txn, id, patch).await? {
            Some(log) => log,
            None => return Ok(None),
        };
        let dead_letter = insert_dead_letter(&txn, dead_letter).await?;
        txn.commit().await?;
        Ok(Some((log, dead_letter)))
    }

    /// Fail the pending logs of the pair not updated since `updated_before`.
    ///
    /// Returns the number of closed logs.
    pub async fn abandon_stale_publishes(
        &self,
        submission_id: i32,
        trigger: Trigger,
        updated_before: i64,
    ) -> Result<u64> {
        let res = publish_log::Entity::update_many()
            .set(publish_log::ActiveModel {
                status: Set(Status::Failed),
                last_error: Set(Some(ABANDONED_ERROR.to_owned())),
                updated_at: Set(now() as i64),
                ..Default::default()
            })
            .filter(publish_log::Column::SubmissionId.eq(submission_id))
            .filter(publish_log::Column::Trigger.eq(trigger))
            .filter(publish_log::Column::Status.eq(Status::Pending))
            .filter(publish_log::Column::UpdatedAt.lt(updated_before))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn record_dead_letter(&self, input: NewDeadLetter) -> Result<dead_letter::Model> {
        insert_dead_letter(self.db(), input).await
    }

    /// Newest dead letters first.
    pub async fn list_dead_letters(&self, limit: u64) -> Result<Vec<dead_letter::Model>> {
        Ok(dead_letter::Entity::find()
            .order_by_desc(dead_letter::Column::Id)
            .limit(limit)
            .all(self.db())
            .await?)
    }
}

async fn patch_publish_log<C: ConnectionTrait>(
    db: &C,
    id: i32,
    patch: PublishLogPatch,
) -> Result<Option<publish_log::Model>> {
    let mut update = publish_log::ActiveModel {
        updated_at: Set(now() as i64),
        ..Default::default()
    };
    if let Some(status) = patch.status {
        update.status = Set(status);
    }
    if let Some(statuses) = &patch.relay_statuses {
        update.relay_statuses = Set(encode_statuses(statuses)?);
    }
    if let Some(retries) = patch.retries {
        update.retries = Set(retries as i32);
    }
    if let Some(last_error) = patch.last_error {
        update.last_error = Set(last_error);
    }
    if let Some(published_at) = patch.published_at {
        update.published_at = Set(Some(published_at));
    }

    let mut query = publish_log::Entity::update_many()
        .set(update)
        .filter(publish_log::Column::Id.eq(id))
        .filter(publish_log::Column::Status.eq(Status::Pending));
    if let Some(retries) = patch.retries {
        query = query.filter(publish_log::Column::Retries.lte(retries as i32));
    }
    let res = query.exec(db).await?;
    if res.rows_affected != 1 {
        return Ok(None);
    }
    Ok(publish_log::Entity::find_by_id(id).one(db).await?)
}

async fn insert_dead_letter<C: ConnectionTrait>(
    db: &C,
    input: NewDeadLetter,
) -> Result<dead_letter::Model> {
    if !input.payload.is_object() {
        return Err(Error::InvalidParam(
            "dead letter payload must be an object".to_owned(),
        ));
    }
    let model = dead_letter::ActiveModel {
        id: NotSet,
        submission_id: Set(input.submission_id),
        job_id: Set(input.job_id),
        payload: Set(serde_json::to_string(&input.payload)?),
        error: Set(input.error),
        retries: Set(input.retries as i32),
        created_at: Set(now() as i64),
    };
    Ok(model.insert(db).await?)
}
