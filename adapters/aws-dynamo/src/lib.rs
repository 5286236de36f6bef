//! DynamoDB adapter implementing the document `UserStore` port.
//!
//! - Each collection is a DynamoDB table with partition key `_id` (S). Items
//!   carry no enforced shape beyond that key.
//! - `_id` is a UUID generated here; `createdAt`/`updatedAt` are stamped from
//!   the adapter's clock as ISO-8601 strings.
//! - The SDK client is built lazily on first use and cached for the life of
//!   the repo (see [`connection::LazyConnection`]).
//!
//! Notes:
//! - The domain `UserStore` trait is synchronous. We bridge to the async AWS
//!   SDK using an internal `tokio::runtime::Runtime` and `block_on`, or
//!   `block_in_place` when already inside a runtime.
//! - SDK retries are disabled; every call is a single attempt bounded by the
//!   configured timeouts.

pub mod connection;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{
    Backend, Clock, ConnectionState, DeleteOutcome, NewUser, PatchableStore, RecordId,
    StoreError, StoreName, SystemClock, UserPatch, UserRecord, UserStore,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::LazyConnection;

const ID_ATTR: &str = "_id";
const CREATED_AT_ATTR: &str = "createdAt";
const UPDATED_AT_ATTR: &str = "updatedAt";

/// Client settings applied when the connection is first established.
#[derive(Clone, Debug)]
pub struct DynamoSettings {
    /// Override endpoint, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    pub connect_timeout: Duration,
    /// Upper bound for a single request attempt.
    pub operation_timeout: Duration,
}

impl Default for DynamoSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// Document store backed by AWS DynamoDB.
///
/// Supports both standalone mode (creates its own Tokio runtime) and server
/// mode (reuses the existing runtime via `Handle::current()`).
pub struct DynamoRepo {
    settings: DynamoSettings,
    conn: LazyConnection<Client>,
    clock: Arc<dyn Clock>,
    // Optional runtime - None when constructed inside an existing runtime
    rt: Option<Arc<tokio::runtime::Runtime>>,
}

impl DynamoRepo {
    /// Create a repo that connects on first use.
    pub fn new(settings: DynamoSettings) -> Result<Self, StoreError> {
        Self::with_clock(settings, SystemClock)
    }

    pub fn with_clock<C: Clock + 'static>(
        settings: DynamoSettings,
        clock: C,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            settings,
            conn: LazyConnection::new(),
            clock: Arc::new(clock),
            rt: Self::maybe_create_runtime()?,
        })
    }

    /// Create a repo around an already configured SDK client.
    pub fn with_client(client: Client) -> Result<Self, StoreError> {
        Ok(Self {
            settings: DynamoSettings::default(),
            conn: LazyConnection::ready(client),
            clock: Arc::new(SystemClock),
            rt: Self::maybe_create_runtime()?,
        })
    }

    /// Check if we're inside a Tokio runtime. If yes, return None (reuse existing).
    /// If no, create a new runtime.
    fn maybe_create_runtime() -> Result<Option<Arc<tokio::runtime::Runtime>>, StoreError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| StoreError::Connection(format!("tokio runtime init: {e}")))?;
            Ok(Some(Arc::new(rt)))
        }
    }

    /// Run an async future, using either our owned runtime or the current runtime.
    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        match &self.rt {
            Some(rt) => rt.block_on(fut),
            None => tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut)),
        }
    }

    async fn client(&self) -> Result<&Client, StoreError> {
        let settings = self.settings.clone();
        self.conn.get_or_connect(|| connect(settings)).await
    }

    /// Full scan of the collection, newest `createdAt` first. A missing table
    /// reads as an empty collection.
    pub async fn find_all(&self, collection: &StoreName) -> Result<Vec<UserRecord>, StoreError> {
        let client = self.client().await?;
        let mut docs = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let res = client
                .scan()
                .table_name(collection.as_str())
                .set_exclusive_start_key(start_key.take())
                .send()
                .await;
            let out = match res {
                Ok(out) => out,
                Err(e) if e.code() == Some("ResourceNotFoundException") => {
                    debug!(collection = %collection, "collection does not exist; empty result");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(map_sdk_err(e, StoreError::Query)),
            };
            docs.extend(out.items().iter().filter_map(|it| item_to_user(it).ok()));
            match out.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    /// Stamp timestamps, store the document, and return it as re-read from the
    /// table by its new `_id`.
    pub async fn insert_one(
        &self,
        collection: &StoreName,
        user: NewUser,
    ) -> Result<UserRecord, StoreError> {
        let client = self.client().await?;
        let id = Uuid::new_v4();
        let now = format_ts(self.clock.now());
        let item = new_item(&id, &user, &now);

        client
            .put_item()
            .table_name(collection.as_str())
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", ID_ATTR)
            .send()
            .await
            .map_err(|e| map_sdk_err(e, StoreError::Insert))?;

        let out = client
            .get_item()
            .table_name(collection.as_str())
            .key(ID_ATTR, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_err(e, StoreError::Insert))?;
        let item = out
            .item()
            .ok_or_else(|| StoreError::Insert(format!("document {id} missing on re-read")))?;
        item_to_user(item).map_err(|e| StoreError::Insert(e.to_string()))
    }

    /// Delete by `_id`; the outcome carries the deleted count (0 or 1).
    pub async fn delete_one(
        &self,
        collection: &StoreName,
        id: &RecordId,
    ) -> Result<DeleteOutcome, StoreError> {
        let key = parse_object_id(id)?;
        let client = self.client().await?;
        let res = client
            .delete_item()
            .table_name(collection.as_str())
            .key(ID_ATTR, AttributeValue::S(key.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await;
        let out = match res {
            Ok(out) => out,
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                return Ok(DeleteOutcome::Removed(0))
            }
            Err(e) => return Err(map_sdk_err(e, StoreError::Query)),
        };
        let removed = out.attributes().map_or(0, |old| u64::from(!old.is_empty()));
        Ok(DeleteOutcome::Removed(removed))
    }

    /// Merge the provided fields into an existing document and stamp
    /// `updatedAt`. Returns the matched count (0 or 1).
    pub async fn update_one(
        &self,
        collection: &StoreName,
        id: &RecordId,
        patch: UserPatch,
    ) -> Result<u64, StoreError> {
        let key = parse_object_id(id)?;
        let client = self.client().await?;
        let now = format_ts(self.clock.now());

        let mut sets = vec!["#updatedAt = :updatedAt"];
        let mut req = client
            .update_item()
            .table_name(collection.as_str())
            .key(ID_ATTR, AttributeValue::S(key.to_string()))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", ID_ATTR)
            .expression_attribute_names("#updatedAt", UPDATED_AT_ATTR)
            .expression_attribute_values(":updatedAt", AttributeValue::S(now));
        if let Some(name) = patch.name {
            sets.push("#name = :name");
            req = req
                .expression_attribute_names("#name", "name")
                .expression_attribute_values(":name", AttributeValue::S(name));
        }
        if let Some(email) = patch.email {
            sets.push("#email = :email");
            req = req
                .expression_attribute_names("#email", "email")
                .expression_attribute_values(":email", AttributeValue::S(email));
        }
        if let Some(age) = patch.age {
            sets.push("#age = :age");
            req = req
                .expression_attribute_names("#age", "age")
                .expression_attribute_values(":age", AttributeValue::N(age.to_string()));
        }

        match req
            .update_expression(format!("SET {}", sets.join(", ")))
            .send()
            .await
        {
            Ok(_) => Ok(1),
            Err(e)
                if matches!(
                    e.code(),
                    Some("ConditionalCheckFailedException") | Some("ResourceNotFoundException")
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(map_sdk_err(e, StoreError::Query)),
        }
    }
}

async fn connect(settings: DynamoSettings) -> Result<Client, StoreError> {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(settings.connect_timeout)
        .operation_attempt_timeout(settings.operation_timeout)
        .build();
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts);
    if let Some(url) = &settings.endpoint_url {
        loader = loader.endpoint_url(url.clone());
    }
    let conf = loader.load().await;
    if conf.region().is_none() {
        return Err(StoreError::Connection(
            "no AWS region configured (set AWS_REGION)".into(),
        ));
    }
    info!(endpoint = ?settings.endpoint_url, "document store client ready");
    Ok(Client::new(&conf))
}

impl UserStore for DynamoRepo {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    fn database(&self) -> &'static str {
        "DynamoDB"
    }

    fn fetch_all(&self, collection: &StoreName) -> Result<Vec<UserRecord>, StoreError> {
        self.block_on(self.find_all(collection))
    }

    fn insert(&self, collection: &StoreName, user: NewUser) -> Result<UserRecord, StoreError> {
        self.block_on(self.insert_one(collection, user))
    }

    fn delete(&self, collection: &StoreName, id: &RecordId) -> Result<DeleteOutcome, StoreError> {
        self.block_on(self.delete_one(collection, id))
    }

    fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }
}

impl PatchableStore for DynamoRepo {
    fn update(
        &self,
        collection: &StoreName,
        id: &RecordId,
        patch: UserPatch,
    ) -> Result<u64, StoreError> {
        self.block_on(self.update_one(collection, id, patch))
    }
}

fn map_sdk_err<E>(e: E, kind: fn(String) -> StoreError) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let code = e.code().unwrap_or("unknown").to_string();
    kind(format!("dynamo error ({code}): {}", DisplayErrorContext(&e)))
}

/// Native key conversion: the external identity must be a UUID.
fn parse_object_id(id: &RecordId) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id.as_str().trim())
        .map_err(|e| StoreError::IdentityFormat(format!("'{}' is not a valid object id: {e}", id)))
}

fn format_ts(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).into())
}

fn new_item(id: &Uuid, user: &NewUser, now: &str) -> HashMap<String, AttributeValue> {
    let mut m = HashMap::new();
    m.insert(ID_ATTR.into(), AttributeValue::S(id.to_string()));
    m.insert("name".into(), AttributeValue::S(user.name.clone()));
    m.insert("email".into(), AttributeValue::S(user.email.clone()));
    m.insert("age".into(), AttributeValue::N(user.age.to_string()));
    m.insert(CREATED_AT_ATTR.into(), AttributeValue::S(now.to_string()));
    m.insert(UPDATED_AT_ATTR.into(), AttributeValue::S(now.to_string()));
    m
}

fn item_to_user(item: &HashMap<String, AttributeValue>) -> Result<UserRecord, StoreError> {
    let text = |attr: &str| {
        item.get(attr)
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| StoreError::Query(format!("document missing {attr}")))
    };
    let id = text(ID_ATTR)?.to_string();
    let name = text("name")?.to_string();
    let email = text("email")?.to_string();
    let age = item
        .get("age")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(|| StoreError::Query("document missing age".into()))?;
    let created_at = parse_ts(text(CREATED_AT_ATTR)?)
        .ok_or_else(|| StoreError::Query("document has unreadable createdAt".into()))?;
    // Older documents may never have been stamped with updatedAt.
    let updated_at = item
        .get(UPDATED_AT_ATTR)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| parse_ts(s))
        .unwrap_or(created_at);

    Ok(UserRecord {
        id: RecordId::new(id),
        name,
        email,
        age,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::config::retry::RetryConfig;
    use aws_sdk_dynamodb::config::{Credentials, Region};
    use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_types::body::SdkBody;
    use serde_json::{json, Value};

    fn sample_user() -> NewUser {
        NewUser {
            name: "Ann".into(),
            email: "ann@x.com".into(),
            age: 40,
        }
    }

    fn offline_client() -> Client {
        let conf = aws_sdk_dynamodb::Config::builder()
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .region(aws_sdk_dynamodb::config::Region::new("us-east-1"))
            .build();
        Client::from_conf(conf)
    }

    fn users() -> StoreName {
        StoreName::new("users").unwrap()
    }

    /// Repo whose client answers with the given responses, in order.
    fn replay_repo(responses: Vec<(u16, Value)>) -> (DynamoRepo, StaticReplayClient) {
        let events = responses
            .into_iter()
            .map(|(status, body)| {
                ReplayEvent::new(
                    http::Request::builder()
                        .uri("https://dynamodb.us-east-1.amazonaws.com/")
                        .body(SdkBody::empty())
                        .unwrap(),
                    http::Response::builder()
                        .status(status)
                        .header("content-type", "application/x-amz-json-1.0")
                        .body(SdkBody::from(body.to_string()))
                        .unwrap(),
                )
            })
            .collect();
        let replay = StaticReplayClient::new(events);
        let conf = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("key", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .http_client(replay.clone())
            .build();
        (DynamoRepo::with_client(Client::from_conf(conf)).unwrap(), replay)
    }

    fn aws_error(code: &str) -> (u16, Value) {
        let kind = format!("com.amazonaws.dynamodb.v20120810#{code}");
        (400, json!({"__type": kind, "message": "rejected"}))
    }

    /// `(X-Amz-Target, JSON body)` of every request the client sent.
    fn sent(replay: &StaticReplayClient) -> Vec<(String, Value)> {
        replay
            .actual_requests()
            .map(|req| {
                let target = req.headers().get("x-amz-target").unwrap_or_default().to_string();
                let body = serde_json::from_slice(req.body().bytes().unwrap()).unwrap();
                (target, body)
            })
            .collect()
    }

    fn doc(id: &str, name: &str, created_at: &str) -> Value {
        json!({
            "_id": {"S": id},
            "name": {"S": name},
            "email": {"S": format!("{}@x.com", name.to_lowercase())},
            "age": {"N": "40"},
            "createdAt": {"S": created_at}
        })
    }

    #[test]
    fn item_mapping_keeps_fields() {
        let id = Uuid::new_v4();
        let now = format_ts(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));
        assert_eq!(now, "2023-11-14T22:13:20.123Z");

        let item = new_item(&id, &sample_user(), &now);
        let user = item_to_user(&item).unwrap();
        assert_eq!(user.id.as_str(), id.to_string());
        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.age, 40);
        assert_eq!(format_ts(user.created_at), now);
        assert_eq!(user.updated_at, user.created_at);
    }

    #[test]
    fn item_without_updated_at_falls_back_to_created_at() {
        let mut item = new_item(&Uuid::new_v4(), &sample_user(), "2024-05-01T10:00:00.000Z");
        item.remove(UPDATED_AT_ATTR);
        let user = item_to_user(&item).unwrap();
        assert_eq!(user.updated_at, user.created_at);
    }

    #[test]
    fn item_without_required_fields_is_rejected() {
        let mut item = new_item(&Uuid::new_v4(), &sample_user(), "2024-05-01T10:00:00.000Z");
        item.remove("email");
        assert!(matches!(item_to_user(&item), Err(StoreError::Query(_))));

        let mut item = new_item(&Uuid::new_v4(), &sample_user(), "2024-05-01T10:00:00.000Z");
        item.insert("age".into(), AttributeValue::S("forty".into()));
        assert!(item_to_user(&item).is_err());
    }

    #[test]
    fn object_id_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(parse_object_id(&RecordId::new(id.to_string())).unwrap(), id);
        for bad in ["", "42", "not-a-uuid", "zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"] {
            assert!(matches!(
                parse_object_id(&RecordId::new(bad)),
                Err(StoreError::IdentityFormat(_))
            ));
        }
    }

    #[test]
    fn malformed_identity_fails_before_connecting() {
        let repo = DynamoRepo::new(DynamoSettings::default()).unwrap();
        let users = StoreName::new("users").unwrap();
        let err = repo.delete(&users, &RecordId::new("123")).unwrap_err();
        assert!(matches!(err, StoreError::IdentityFormat(_)));
        let err = repo
            .update(&users, &RecordId::new("123"), UserPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::IdentityFormat(_)));
        assert_eq!(repo.connection_state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn provided_client_is_ready() {
        let repo = DynamoRepo::with_client(offline_client()).unwrap();
        assert_eq!(repo.connection_state(), ConnectionState::Ready);
        assert_eq!(repo.backend(), Backend::Document);
        assert_eq!(repo.database(), "DynamoDB");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_collection_reads_as_empty() {
        let (repo, _replay) = replay_repo(vec![aws_error("ResourceNotFoundException")]);
        // Through the sync port, which bridges onto the running runtime.
        assert!(repo.fetch_all(&users()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_follows_pages_and_sorts_newest_first() {
        let (repo, replay) = replay_repo(vec![
            (
                200,
                json!({
                    "Items": [
                        doc("a", "Ann", "2024-05-01T10:00:00.000Z"),
                        {"_id": {"S": "broken"}, "name": {"S": "NoEmail"}}
                    ],
                    "LastEvaluatedKey": {"_id": {"S": "a"}}
                }),
            ),
            (200, json!({"Items": [doc("b", "Bob", "2024-05-02T10:00:00.000Z")]})),
        ]);

        let docs = repo.find_all(&users()).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Bob", "Ann"]);

        let reqs = sent(&replay);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].0, "DynamoDB_20120810.Scan");
        assert_eq!(reqs[0].1["TableName"], "users");
        assert!(reqs[0].1.get("ExclusiveStartKey").is_none());
        assert_eq!(reqs[1].1["ExclusiveStartKey"], json!({"_id": {"S": "a"}}));
    }

    #[tokio::test]
    async fn scan_failure_is_a_query_error() {
        let (repo, _replay) = replay_repo(vec![aws_error("InternalServerError")]);
        match repo.find_all(&users()).await.unwrap_err() {
            StoreError::Query(msg) => assert!(msg.contains("InternalServerError")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_puts_conditionally_then_rereads_consistently() {
        let stored = doc("5b0c1a52-3c55-4f5e-9d0e-0f1f2a3b4c5d", "Ann", "2024-05-01T10:00:00.000Z");
        let (repo, replay) = replay_repo(vec![(200, json!({})), (200, json!({"Item": stored}))]);

        let user = repo.insert_one(&users(), sample_user()).await.unwrap();
        assert_eq!(user.id.as_str(), "5b0c1a52-3c55-4f5e-9d0e-0f1f2a3b4c5d");
        assert_eq!(user.email, "ann@x.com");

        let reqs = sent(&replay);
        assert_eq!(reqs[0].0, "DynamoDB_20120810.PutItem");
        let put = &reqs[0].1;
        assert_eq!(put["ConditionExpression"], "attribute_not_exists(#id)");
        assert_eq!(put["ExpressionAttributeNames"]["#id"], "_id");
        assert_eq!(put["Item"]["age"], json!({"N": "40"}));
        assert_eq!(put["Item"]["createdAt"], put["Item"]["updatedAt"]);
        let new_id = put["Item"]["_id"]["S"].as_str().unwrap();
        assert!(Uuid::parse_str(new_id).is_ok());

        assert_eq!(reqs[1].0, "DynamoDB_20120810.GetItem");
        assert_eq!(reqs[1].1["ConsistentRead"], true);
        assert_eq!(reqs[1].1["Key"]["_id"]["S"], new_id);
    }

    #[tokio::test]
    async fn insert_into_missing_collection_fails() {
        let (repo, replay) = replay_repo(vec![aws_error("ResourceNotFoundException")]);
        let err = repo.insert_one(&users(), sample_user()).await.unwrap_err();
        assert!(matches!(err, StoreError::Insert(_)));
        // No re-read after a rejected put.
        assert_eq!(sent(&replay).len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let id = Uuid::new_v4().to_string();
        let (repo, replay) = replay_repo(vec![
            (200, json!({"Attributes": doc(&id, "Ann", "2024-05-01T10:00:00.000Z")})),
            (200, json!({})),
            aws_error("ResourceNotFoundException"),
        ]);
        let rid = RecordId::new(id.clone());

        let first = repo.delete_one(&users(), &rid).await.unwrap();
        assert_eq!(first, DeleteOutcome::Removed(1));
        let again = repo.delete_one(&users(), &rid).await.unwrap();
        assert_eq!(again, DeleteOutcome::Removed(0));
        let no_table = repo.delete_one(&users(), &rid).await.unwrap();
        assert_eq!(no_table, DeleteOutcome::Removed(0));

        let reqs = sent(&replay);
        assert_eq!(reqs[0].0, "DynamoDB_20120810.DeleteItem");
        assert_eq!(reqs[0].1["ReturnValues"], "ALL_OLD");
        assert_eq!(reqs[0].1["Key"]["_id"]["S"], id.as_str());
    }

    #[tokio::test]
    async fn update_sets_only_provided_fields() {
        let id = RecordId::new(Uuid::new_v4().to_string());
        let (repo, replay) =
            replay_repo(vec![(200, json!({})), aws_error("ConditionalCheckFailedException")]);
        let patch = UserPatch {
            name: Some("Bo".into()),
            ..UserPatch::default()
        };

        assert_eq!(repo.update_one(&users(), &id, patch.clone()).await.unwrap(), 1);
        assert_eq!(repo.update_one(&users(), &id, patch).await.unwrap(), 0);

        let reqs = sent(&replay);
        let upd = &reqs[0].1;
        assert_eq!(reqs[0].0, "DynamoDB_20120810.UpdateItem");
        assert_eq!(upd["UpdateExpression"], "SET #updatedAt = :updatedAt, #name = :name");
        assert_eq!(upd["ConditionExpression"], "attribute_exists(#id)");
        assert_eq!(upd["ExpressionAttributeValues"][":name"], json!({"S": "Bo"}));
        assert!(upd["ExpressionAttributeNames"].get("#email").is_none());
    }
}
