//! Source-shaped adapter: partition/sort-key storage with a
//! `LastEvaluatedKey`-style pagination cursor, index or scan-and-filter
//! reads, and a 25-item transactional batch-update cap. Grounded on
//! `migration_utility/db_clients/dynamodb/dynamodb_client.py`.

use crate::{
    error::StoreError,
    traits::{ReadResult, Store, WriteResult},
};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    types::{AttributeValue, TransactWriteItem, Update, WriteRequest, builders::PutRequestBuilder},
};
use model::{Cursor, Document, FieldQuery, QueryOp, Value};
use rust_decimal::Decimal;
use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{info, warn};

const TRANSACT_WRITE_ITEM_CAP: usize = 25;

pub struct DynamoStore {
    client: Client,
    last_cursor: Mutex<Option<Cursor>>,
    update_retry_base_delay: Duration,
}

impl DynamoStore {
    pub fn new(client: Client) -> Self {
        DynamoStore {
            client,
            last_cursor: Mutex::new(None),
            update_retry_base_delay: Duration::from_secs(60),
        }
    }

    /// Shortens the `batch_update` retry delay — spec §4.4: "implementations
    /// may shorten waits in test mode."
    pub fn with_update_retry_base_delay(mut self, delay: Duration) -> Self {
        self.update_retry_base_delay = delay;
        self
    }

    async fn exclusive_start_key(&self) -> Option<HashMap<String, AttributeValue>> {
        let cursor = self.last_cursor.lock().await;
        cursor.as_ref().map(cursor_to_key)
    }

    fn operator_symbol(op: QueryOp) -> &'static str {
        match op {
            QueryOp::Eq => "=",
            QueryOp::Gt => ">",
            QueryOp::Gte => ">=",
            QueryOp::Lt => "<",
            QueryOp::Lte => "<=",
        }
    }

    fn build_condition(
        queries: &[FieldQuery],
    ) -> (String, HashMap<String, String>, HashMap<String, AttributeValue>) {
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut clauses = Vec::new();

        for (i, q) in queries.iter().enumerate() {
            let name_placeholder = format!("#f{i}");
            let value_placeholder = format!(":v{i}");
            names.insert(name_placeholder.clone(), q.field_name.clone());
            values.insert(value_placeholder.clone(), value_to_attribute(&q.value));
            clauses.push(format!(
                "{name_placeholder} {} {value_placeholder}",
                Self::operator_symbol(q.operation)
            ));
        }

        (clauses.join(" AND "), names, values)
    }
}

#[async_trait]
impl Store for DynamoStore {
    async fn find(
        &self,
        collection: &str,
        queries: &[FieldQuery],
        index_name: Option<&str>,
        batch_size: usize,
        find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        let (condition, mut names, values) = Self::build_condition(queries);

        let mut documents = Vec::new();
        let mut exclusive_start_key = self.exclusive_start_key().await;
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let remaining = batch_size.saturating_sub(documents.len());
            if remaining == 0 {
                break;
            }

            let filter = if !find_all {
                names.insert("#migrated".to_string(), "is_migrated".to_string());
                Some("attribute_not_exists(#migrated) OR #migrated <> :true".to_string())
            } else {
                None
            };

            let mut values = values.clone();
            if filter.is_some() {
                values.insert(":true".to_string(), AttributeValue::Bool(true));
            }

            let result = if let Some(index_name) = index_name {
                let mut req = self
                    .client
                    .query()
                    .table_name(collection)
                    .index_name(index_name)
                    .key_condition_expression(&condition)
                    .set_expression_attribute_names(Some(names.clone()))
                    .set_expression_attribute_values(Some(values))
                    .limit(remaining as i32)
                    .scan_index_forward(true);
                if let Some(filter) = &filter {
                    req = req.filter_expression(filter);
                }
                if let Some(key) = &exclusive_start_key {
                    req = req.set_exclusive_start_key(Some(key.clone()));
                }
                req.send().await.map_err(|err| StoreError::RetryableFetching {
                    collection: collection.to_string(),
                    message: err.to_string(),
                })?
            } else {
                let scan_filter = match &filter {
                    Some(f) if !condition.is_empty() => format!("({condition}) AND ({f})"),
                    Some(f) => f.clone(),
                    None => condition.clone(),
                };
                let mut req = self
                    .client
                    .scan()
                    .table_name(collection)
                    .filter_expression(scan_filter)
                    .set_expression_attribute_names(Some(names.clone()))
                    .set_expression_attribute_values(Some(values))
                    .limit(remaining as i32);
                if let Some(key) = &exclusive_start_key {
                    req = req.set_exclusive_start_key(Some(key.clone()));
                }
                req.send().await.map_err(|err| StoreError::RetryableFetching {
                    collection: collection.to_string(),
                    message: err.to_string(),
                })?
            };

            let items = result.items.unwrap_or_default();
            info!(collection, fetched = items.len(), "fetched batch from dynamo-shaped source");
            documents.extend(items.iter().map(item_to_document));

            last_evaluated_key = result.last_evaluated_key;
            exclusive_start_key = last_evaluated_key.clone();

            if last_evaluated_key.is_none() {
                break;
            }
        }

        let has_more = last_evaluated_key.is_some();
        let cursor = last_evaluated_key.as_ref().map(key_to_cursor);
        *self.last_cursor.lock().await = cursor.clone();

        Ok(ReadResult {
            documents,
            has_more,
            cursor,
        })
    }

    async fn set_last_document(&self, cursor: Option<Cursor>) {
        *self.last_cursor.lock().await = cursor;
    }

    async fn last_fetched_key(&self) -> Option<Cursor> {
        self.last_cursor.lock().await.clone()
    }

    async fn batch_write(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<WriteResult, StoreError> {
        let mut requests = Vec::with_capacity(documents.len());
        for doc in &documents {
            let item = document_to_item(doc);
            let put = PutRequestBuilder::default()
                .set_item(Some(item))
                .build()
                .map_err(|err| StoreError::MissingRequiredConfigurationParam(err.to_string()))?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }

        let response = self
            .client
            .batch_write_item()
            .request_items(collection, requests)
            .send()
            .await
            .map_err(|err| StoreError::FetchingTerminated {
                collection: collection.to_string(),
                message: err.to_string(),
            })?;

        let unprocessed: Vec<Document> = response
            .unprocessed_items
            .unwrap_or_default()
            .remove(collection)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|wr| wr.put_request.map(|p| item_to_document(&p.item)))
            .collect();

        if unprocessed.is_empty() {
            let accepted_ids: Vec<String> = documents
                .iter()
                .filter_map(|d| model::value::document_id(d).map(str::to_string))
                .collect();
            return Ok(WriteResult {
                processed_count: accepted_ids.len(),
                accepted_ids,
            });
        }

        let unprocessed_ids: Vec<&str> = unprocessed
            .iter()
            .filter_map(|d| model::value::document_id(d))
            .collect();
        let (inserted, cancelled): (Vec<Document>, Vec<Document>) =
            documents.into_iter().partition(|d| {
                model::value::document_id(d)
                    .map(|id| !unprocessed_ids.contains(&id))
                    .unwrap_or(false)
            });

        Err(StoreError::InsertionWasCancelled {
            collection: collection.to_string(),
            exception_details: format!("{} unprocessed item(s)", cancelled.len()),
            cancelled_documents: cancelled,
            inserted_documents: inserted,
        })
    }

    /// `transact_write_items` caps at 25 items per call, so the batch is
    /// partitioned and each partition retried independently (spec §4.2,
    /// §4.4 "Update retry").
    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<Document>,
    ) -> Result<(), StoreError> {
        for (i, partition) in updates.chunks(TRANSACT_WRITE_ITEM_CAP).enumerate() {
            info!(collection, partition = i, "updating transact-write partition");
            self.transact_update_partition(collection, partition).await?;
        }
        Ok(())
    }

    async fn update(&self, collection: &str, single: Document) -> Result<(), StoreError> {
        self.batch_update(collection, vec![single]).await
    }

    async fn find_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let response = self
            .client
            .get_item()
            .table_name(collection)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|err| StoreError::FetchingTerminated {
                collection: collection.to_string(),
                message: err.to_string(),
            })?;

        Ok(response.item.map(|item| item_to_document(&item)))
    }
}

impl DynamoStore {
    async fn transact_update_partition(
        &self,
        collection: &str,
        partition: &[Document],
    ) -> Result<(), StoreError> {
        let items = Self::build_transact_items(collection, partition)?;

        let mut attempt = 0usize;
        loop {
            let result = self
                .client
                .transact_write_items()
                .set_transact_items(Some(items.clone()))
                .send()
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(err) => {
                    let message = err.to_string();
                    let is_validation = message.contains("ValidationException");
                    if is_validation {
                        return Err(StoreError::ValidationFailed {
                            collection: collection.to_string(),
                            message,
                        });
                    }

                    attempt += 1;
                    if attempt >= 3 {
                        warn!(collection, attempt, "transact_write_items exhausted retries");
                        return Err(StoreError::TransactionalUpdate {
                            collection: collection.to_string(),
                            message,
                        });
                    }

                    tokio::time::sleep(self.update_retry_base_delay * attempt as u32).await;
                }
            }
        }
    }

    fn build_transact_items(
        collection: &str,
        partition: &[Document],
    ) -> Result<Vec<TransactWriteItem>, StoreError> {
        let mut items = Vec::with_capacity(partition.len());
        for update in partition {
            let Some(id) = model::value::document_id(update) else {
                return Err(StoreError::MissingRequiredConfigurationParam(
                    "update is missing an id field".to_string(),
                ));
            };

            let mut set_clauses = Vec::new();
            let mut names = HashMap::new();
            let mut values = HashMap::new();
            for (i, (k, v)) in update.iter().filter(|(k, _)| *k != "id").enumerate() {
                let name_ph = format!("#u{i}");
                let value_ph = format!(":u{i}");
                names.insert(name_ph.clone(), k.clone());
                values.insert(value_ph.clone(), value_to_attribute(v));
                set_clauses.push(format!("{name_ph}={value_ph}"));
            }

            let update_builder = Update::builder()
                .table_name(collection)
                .key("id", AttributeValue::S(id.to_string()))
                .update_expression(format!("set {}", set_clauses.join(",")))
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(Some(values))
                .build()
                .map_err(|err| StoreError::MissingRequiredConfigurationParam(err.to_string()))?;

            items.push(TransactWriteItem::builder().update(update_builder).build());
        }
        Ok(items)
    }
}

fn cursor_to_key(cursor: &Cursor) -> HashMap<String, AttributeValue> {
    cursor
        .as_map()
        .iter()
        .map(|(k, v)| (k.clone(), value_to_attribute(v)))
        .collect()
}

fn key_to_cursor(key: &HashMap<String, AttributeValue>) -> Cursor {
    let mut cursor = Cursor::none();
    for (k, v) in key {
        cursor.insert(k.clone(), attribute_to_value(v));
    }
    cursor
}

fn document_to_item(doc: &Document) -> HashMap<String, AttributeValue> {
    doc.iter().map(|(k, v)| (k.clone(), value_to_attribute(v))).collect()
}

fn item_to_document(item: &HashMap<String, AttributeValue>) -> Document {
    item.iter().map(|(k, v)| (k.clone(), attribute_to_value(v))).collect()
}

fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Number(d) => AttributeValue::N(d.to_string()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Null => AttributeValue::Null(true),
        Value::Array(items) => AttributeValue::L(items.iter().map(value_to_attribute).collect()),
        Value::Object(doc) => AttributeValue::M(document_to_item(doc)),
    }
}

fn attribute_to_value(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Decimal::from_str(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_value).collect()),
        AttributeValue::M(map) => Value::Object(item_to_document(map)),
        _ => Value::Null,
    }
}

pub async fn connect(region: Option<&str>) -> Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_sdk_dynamodb::config::Region::new(region.to_string()));
    }
    let config = loader.load().await;
    Client::new(&config)
}

pub fn store(client: Client) -> Arc<DynamoStore> {
    Arc::new(DynamoStore::new(client))
}
