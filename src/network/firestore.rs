use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::common::{ChatMessage, NewMessage, Timestamp};

use super::auth::SessionProvider;
use super::store::{
    Direction, MessageStore, RoomQuery, SnapshotResult, StoreError, Subscription,
};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Cloud Firestore over its REST surface. The live query is a poll of
/// `runQuery` that only reports changed result sets.
pub struct FirestoreStore {
    http: reqwest::Client,
    session: Arc<dyn SessionProvider>,
    database: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl FirestoreStore {
    pub fn new(
        http: reqwest::Client,
        session: Arc<dyn SessionProvider>,
        project_id: &str,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            session,
            database: format!("projects/{project_id}/databases/(default)"),
            poll_interval,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{FIRESTORE_URL}/{}/documents:{method}", self.database)
    }

    async fn commit(&self, message: NewMessage) -> Result<String, StoreError> {
        let token = self.session.id_token().await?;
        let id = Uuid::new_v4().simple().to_string();
        let body = commit_body(&self.database, &id, &message);

        let response = self
            .http
            .post(self.endpoint("commit"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        log::debug!("Appended message {id}");
        Ok(id)
    }
}

impl MessageStore for FirestoreStore {
    fn subscribe(&self, query: RoomQuery, sink: mpsc::Sender<SnapshotResult>) -> Subscription {
        let http = self.http.clone();
        let session = Arc::clone(&self.session);
        let url = self.endpoint("runQuery");
        let body = query_body(&query);
        let interval = self.poll_interval;

        Subscription::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Vec<ChatMessage>> = None;
            let mut failing = false;

            loop {
                ticker.tick().await;
                let result = run_query(&http, session.as_ref(), &url, &body).await;
                if let Err(err) = &result {
                    log::warn!("Message query failed: {err}");
                }
                let Some(outcome) = next_outcome(&mut last, &mut failing, result) else {
                    continue;
                };

                if sink.send(outcome).await.is_err() {
                    break;
                }
            }
            log::debug!("Message subscription closed");
        }))
    }

    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<String, StoreError>> {
        Box::pin(self.commit(message))
    }
}

/// Decides what one poll reports: changed lists, the first error of a failure
/// streak, and the first good list after a streak even when it is unchanged.
fn next_outcome(
    last: &mut Option<Vec<ChatMessage>>,
    failing: &mut bool,
    result: SnapshotResult,
) -> Option<SnapshotResult> {
    match result {
        Ok(messages) => {
            let recovered = std::mem::replace(failing, false);
            if !recovered && last.as_ref() == Some(&messages) {
                return None;
            }
            *last = Some(messages.clone());
            Some(Ok(messages))
        }
        Err(_) if *failing => None,
        Err(err) => {
            *failing = true;
            Some(Err(err))
        }
    }
}

async fn run_query(
    http: &reqwest::Client,
    session: &dyn SessionProvider,
    url: &str,
    body: &Value,
) -> Result<Vec<ChatMessage>, StoreError> {
    let token = session.id_token().await?;
    let response = http.post(url).bearer_auth(token).json(body).send().await?;
    let items: Vec<RunQueryItem> = check_status(response).await?.json().await?;
    decode_snapshot(items)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn query_body(query: &RoomQuery) -> Value {
    let direction = match query.direction {
        Direction::Ascending => "ASCENDING",
        Direction::Descending => "DESCENDING",
    };
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": query.collection }],
            "orderBy": [{
                "field": { "fieldPath": query.order_by },
                "direction": direction,
            }],
        }
    })
}

fn commit_body(database: &str, id: &str, message: &NewMessage) -> Value {
    let mut write = json!({
        "update": {
            "name": format!("{database}/documents/{}/{id}", super::store::MESSAGES_COLLECTION),
            "fields": {
                "uid": { "stringValue": message.uid },
                "displayName": optional_string(&message.display_name),
                "photoURL": optional_string(&message.photo_url),
                "text": { "stringValue": message.text },
            },
        },
        "currentDocument": { "exists": false },
    });
    match message.created_at {
        Timestamp::Pending => {
            write["updateTransforms"] =
                json!([{ "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" }]);
        }
        Timestamp::Resolved(at) => {
            write["update"]["fields"]["createdAt"] = json!({ "timestampValue": at.to_rfc3339() });
        }
    }
    json!({ "writes": [write] })
}

fn optional_string(value: &Option<String>) -> Value {
    match value {
        Some(value) => json!({ "stringValue": value }),
        None => json!({ "nullValue": null }),
    }
}

// runQuery answers with one item per document plus a trailing item that only
// carries `readTime`.
fn decode_snapshot(items: Vec<RunQueryItem>) -> Result<Vec<ChatMessage>, StoreError> {
    items
        .into_iter()
        .filter_map(|item| item.document)
        .map(decode_document)
        .collect()
}

fn decode_document(document: Document) -> Result<ChatMessage, StoreError> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let fields = &document.fields;

    Ok(ChatMessage {
        uid: string_field(fields, "uid").unwrap_or_default(),
        display_name: string_field(fields, "displayName"),
        photo_url: string_field(fields, "photoURL"),
        text: string_field(fields, "text").unwrap_or_default(),
        created_at: timestamp_field(fields, "createdAt")?,
        id,
    })
}

fn string_field(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn timestamp_field(fields: &HashMap<String, Value>, key: &str) -> Result<Timestamp, StoreError> {
    let raw = fields
        .get(key)
        .and_then(|value| value.get("timestampValue"))
        .and_then(Value::as_str);
    match raw {
        None => Ok(Timestamp::Pending),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| Timestamp::Resolved(at.with_timezone(&Utc)))
            .map_err(|err| StoreError::Malformed(format!("{key} `{raw}`: {err}"))),
    }
}
