//! REST-backed [`DocStore`] implementation.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use threadsync_shared::{
    Annotation, ApiConfig, DiscussionId, DocStatus, NewWorkItem, Node, Result, StoreConfig,
    TargetRecord, ThreadSyncError, WorkCategory, WorkItem,
};

use crate::wire::{
    self, BlockObject, CommentObject, CreatedObject, DatabaseObject, ListEnvelope, PageObject,
    CATEGORY_PROP, DISCUSSION_PROP, STATUS_PROP,
};
use crate::{DocStore, Page};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("ThreadSync/", env!("CARGO_PKG_VERSION"));

/// Page size requested from listing endpoints.
const PAGE_SIZE: u32 = 100;

/// Title property names discovered from the target tables' schemas.
#[derive(Debug, Clone)]
struct TitleBinding {
    records: String,
    work_items: String,
}

/// HTTP implementation of [`DocStore`] against a Notion-style REST API.
pub struct HttpDocStore {
    client: Client,
    base: Url,
    api_version: String,
    records_table: String,
    work_items_table: String,
    /// Set exactly once by [`DocStore::validate_schema`]; writes refuse to
    /// proceed while unbound.
    titles: OnceLock<TitleBinding>,
}

impl HttpDocStore {
    /// Build a client for the configured API, authenticating with `token`.
    pub fn new(api: &ApiConfig, store: &StoreConfig, token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ThreadSyncError::config(format!("invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ThreadSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        let base = Url::parse(&api.base_url)
            .map_err(|e| ThreadSyncError::config(format!("invalid base_url: {e}")))?;

        Ok(Self {
            client,
            base,
            api_version: api.api_version.clone(),
            records_table: store.records_table.clone(),
            work_items_table: store.work_items_table.clone(),
            titles: OnceLock::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ThreadSyncError::Network(format!("bad endpoint {path}: {e}")))
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let response = self
            .client
            .get(url.clone())
            .header("Notion-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| ThreadSyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThreadSyncError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| ThreadSyncError::decode(format!("{url}: {e}")))
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request
            .header("Notion-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| ThreadSyncError::Network(format!("{context}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ThreadSyncError::Store(format!(
                "{context}: HTTP {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ThreadSyncError::decode(format!("{context}: {e}")))
    }

    async fn fetch_table_schema(&self, table_id: &str) -> Result<DatabaseObject> {
        let url = self.endpoint(&format!("/v1/databases/{table_id}"))?;
        let value = self.get_json(url).await?;
        serde_json::from_value(value)
            .map_err(|e| ThreadSyncError::decode(format!("database {table_id}: {e}")))
    }

    fn bound_titles(&self) -> Result<&TitleBinding> {
        self.titles.get().ok_or_else(|| {
            ThreadSyncError::schema("schema not validated; call validate_schema before writing")
        })
    }

    /// One page of a database query, driven by an optional cursor.
    async fn query_table_page(
        &self,
        table_id: &str,
        mut body: Value,
        cursor: Option<&str>,
    ) -> Result<ListEnvelope<PageObject>> {
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        let url = self.endpoint(&format!("/v1/databases/{table_id}/query"))?;
        let value = self
            .send_json(
                self.client.post(url).json(&body),
                &format!("query {table_id}"),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ThreadSyncError::decode(format!("query {table_id}: {e}")))
    }
}

impl DocStore for HttpDocStore {
    #[instrument(skip_all)]
    async fn validate_schema(&self) -> Result<()> {
        let records = self.fetch_table_schema(&self.records_table).await?;
        let records_title = wire::schema_property_of_type(&records, "title")
            .ok_or_else(|| {
                ThreadSyncError::schema("records table has no title-type property")
            })?
            .to_string();
        if wire::schema_property_type(&records, DISCUSSION_PROP) != Some("rich_text") {
            return Err(ThreadSyncError::schema(format!(
                "records table is missing rich_text property {DISCUSSION_PROP:?}"
            )));
        }

        let work = self.fetch_table_schema(&self.work_items_table).await?;
        let work_title = wire::schema_property_of_type(&work, "title")
            .ok_or_else(|| {
                ThreadSyncError::schema("work-item table has no title-type property")
            })?
            .to_string();
        for prop in [STATUS_PROP, CATEGORY_PROP] {
            if wire::schema_property_type(&work, prop) != Some("select") {
                return Err(ThreadSyncError::schema(format!(
                    "work-item table is missing select property {prop:?}"
                )));
            }
        }

        debug!(
            records_title = %records_title,
            work_title = %work_title,
            "schema validated, title properties bound"
        );
        let _ = self.titles.set(TitleBinding {
            records: records_title,
            work_items: work_title,
        });
        Ok(())
    }

    async fn list_children(&self, node_id: &str, cursor: Option<String>) -> Result<Page<Node>> {
        let mut url = self.endpoint(&format!("/v1/blocks/{node_id}/children"))?;
        url.query_pairs_mut()
            .append_pair("page_size", &PAGE_SIZE.to_string());
        if let Some(cursor) = &cursor {
            url.query_pairs_mut().append_pair("start_cursor", cursor);
        }

        let value = self.get_json(url).await?;
        let envelope: ListEnvelope<BlockObject> = serde_json::from_value(value)
            .map_err(|e| ThreadSyncError::decode(format!("children of {node_id}: {e}")))?;

        Ok(Page {
            items: envelope.results.iter().map(Node::from).collect(),
            next_cursor: envelope.next_cursor,
            has_more: envelope.has_more,
        })
    }

    async fn list_annotations(&self, node_id: &str) -> Result<Vec<Annotation>> {
        let mut annotations = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.endpoint("/v1/comments")?;
            url.query_pairs_mut()
                .append_pair("block_id", node_id)
                .append_pair("page_size", &PAGE_SIZE.to_string());
            if let Some(cursor) = &cursor {
                url.query_pairs_mut().append_pair("start_cursor", cursor);
            }

            let value = self.get_json(url).await?;
            let envelope: ListEnvelope<CommentObject> = serde_json::from_value(value)
                .map_err(|e| ThreadSyncError::decode(format!("comments of {node_id}: {e}")))?;

            annotations.extend(envelope.results.iter().map(Annotation::from));

            if !envelope.has_more {
                break;
            }
            cursor = envelope.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(annotations)
    }

    #[instrument(skip_all)]
    async fn existing_discussions(&self) -> Result<HashSet<DiscussionId>> {
        let mut ids = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let envelope = self
                .query_table_page(&self.records_table, serde_json::json!({}), cursor.as_deref())
                .await?;

            for page in &envelope.results {
                let key = wire::prop_plain_text(&page.properties, DISCUSSION_PROP);
                if !key.is_empty() {
                    ids.insert(DiscussionId(key));
                }
            }

            if !envelope.has_more {
                break;
            }
            cursor = envelope.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        debug!(count = ids.len(), "loaded existing discussion keys");
        Ok(ids)
    }

    async fn create_record(&self, record: &TargetRecord) -> Result<String> {
        let titles = self.bound_titles()?;
        let payload = wire::record_create_payload(&self.records_table, &titles.records, record);
        let url = self.endpoint("/v1/pages")?;
        let value = self
            .send_json(
                self.client.post(url).json(&payload),
                &format!("create record {}", record.discussion_id),
            )
            .await?;
        let created: CreatedObject = serde_json::from_value(value)
            .map_err(|e| ThreadSyncError::decode(format!("create record: {e}")))?;
        Ok(created.id)
    }

    async fn update_document_status(&self, document_id: &str, status: DocStatus) -> Result<()> {
        let payload = wire::status_update_payload(status);
        let url = self.endpoint(&format!("/v1/pages/{document_id}"))?;
        self.send_json(
            self.client.patch(url).json(&payload),
            &format!("update status of {document_id}"),
        )
        .await?;
        Ok(())
    }

    async fn open_work_items(&self, category: WorkCategory) -> Result<Vec<WorkItem>> {
        let envelope = self
            .query_table_page(
                &self.work_items_table,
                wire::open_work_items_query(category),
                None,
            )
            .await?;

        Ok(envelope
            .results
            .iter()
            .map(|page| wire::work_item_from_page(page, category))
            .collect())
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> Result<String> {
        let titles = self.bound_titles()?;
        let payload =
            wire::work_item_create_payload(&self.work_items_table, &titles.work_items, item);
        let url = self.endpoint("/v1/pages")?;
        let value = self
            .send_json(
                self.client.post(url).json(&payload),
                &format!("create work item ({})", item.category),
            )
            .await?;
        let created: CreatedObject = serde_json::from_value(value)
            .map_err(|e| ThreadSyncError::decode(format!("create work item: {e}")))?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store(server_uri: &str) -> HttpDocStore {
        let api = ApiConfig {
            base_url: server_uri.to_string(),
            token_env: "unused".into(),
            api_version: "2022-06-28".into(),
        };
        let store = StoreConfig {
            records_table: "db-records".into(),
            work_items_table: "db-work".into(),
        };
        HttpDocStore::new(&api, &store, "secret-token").expect("client builds")
    }

    fn records_schema() -> serde_json::Value {
        json!({
            "id": "db-records",
            "properties": {
                "标题": { "type": "title", "title": {} },
                "Discussion": { "type": "rich_text", "rich_text": {} },
            },
        })
    }

    fn work_schema() -> serde_json::Value {
        json!({
            "id": "db-work",
            "properties": {
                "Name": { "type": "title", "title": {} },
                "Status": { "type": "select", "select": {} },
                "Category": { "type": "select", "select": {} },
            },
        })
    }

    async fn mount_schemas(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/databases/db-records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(records_schema()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/db-work"))
            .respond_with(ResponseTemplate::new(200).set_body_json(work_schema()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn children_pagination_follows_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/blocks/root/children"))
            .and(query_param("start_cursor", "cur-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "b2",
                    "type": "paragraph",
                    "has_children": false,
                    "paragraph": { "rich_text": [{ "plain_text": "second" }] },
                }],
                "next_cursor": null,
                "has_more": false,
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/blocks/root/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "b1",
                    "type": "heading_2",
                    "has_children": true,
                    "heading_2": { "rich_text": [{ "plain_text": "first" }] },
                }],
                "next_cursor": "cur-1",
                "has_more": true,
            })))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());

        let first = store.list_children("root", None).await.expect("page 1");
        assert!(first.has_more);
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.items[0].text, "first");

        let second = store
            .list_children("root", first.next_cursor)
            .await
            .expect("page 2");
        assert!(!second.has_more);
        assert_eq!(second.items[0].id, "b2");
    }

    #[tokio::test]
    async fn schema_validation_binds_discovered_title() {
        let server = MockServer::start().await;
        mount_schemas(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "rec-1" })))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        store.validate_schema().await.expect("schema ok");

        let record = TargetRecord {
            title: "t".into(),
            discussion_id: DiscussionId::from("d1"),
            source_document: threadsync_shared::DocumentRef {
                id: "doc".into(),
                name: "FAQ".into(),
            },
            blocks: vec![],
        };
        let id = store.create_record(&record).await.expect("created");
        assert_eq!(id, "rec-1");

        // The create payload used the schema-discovered title property.
        let requests = server.received_requests().await.expect("requests");
        let create = requests
            .iter()
            .find(|r| r.url.path() == "/v1/pages")
            .expect("create request");
        let body: serde_json::Value = serde_json::from_slice(&create.body).expect("json body");
        assert!(body["properties"]["标题"].is_object());
    }

    #[tokio::test]
    async fn writes_refuse_without_schema_validation() {
        let server = MockServer::start().await;
        let store = test_store(&server.uri());

        let record = TargetRecord {
            title: "t".into(),
            discussion_id: DiscussionId::from("d1"),
            source_document: threadsync_shared::DocumentRef {
                id: "doc".into(),
                name: "FAQ".into(),
            },
            blocks: vec![],
        };
        let err = store.create_record(&record).await.unwrap_err();
        assert!(matches!(err, ThreadSyncError::Schema { .. }));
    }

    #[tokio::test]
    async fn schema_validation_rejects_missing_title() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/databases/db-records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "db-records",
                "properties": {
                    "Discussion": { "type": "rich_text", "rich_text": {} },
                },
            })))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let err = store.validate_schema().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("title"));
    }

    #[tokio::test]
    async fn existing_discussions_paginates_and_collects_keys() {
        let server = MockServer::start().await;
        mount_schemas(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-records/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {
                        "id": "p1",
                        "properties": {
                            "Discussion": { "type": "rich_text", "rich_text": [{ "plain_text": "d1" }] },
                        },
                    },
                    {
                        "id": "p2",
                        "properties": {
                            "Discussion": { "type": "rich_text", "rich_text": [] },
                        },
                    },
                ],
                "next_cursor": null,
                "has_more": false,
            })))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let ids = store.existing_discussions().await.expect("query ok");
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&DiscussionId::from("d1")));
    }

    #[tokio::test]
    async fn open_work_items_parses_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-work/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "w1",
                    "created_time": "2024-05-01T08:00:00Z",
                    "properties": {
                        "Name": { "type": "title", "title": [{ "plain_text": "待整理" }] },
                        "Status": { "type": "select", "select": { "name": "In progress" } },
                    },
                }],
                "has_more": false,
            })))
            .mount(&server)
            .await;

        let store = test_store(&server.uri());
        let items = store
            .open_work_items(WorkCategory::ThreadBacklog)
            .await
            .expect("query ok");
        assert_eq!(items.len(), 1);
        assert!(items[0].status.is_unresolved());
        assert_eq!(items[0].title, "待整理");
    }
}
