//! Destination/internal-shaped adapter: `_id`-keyed collections, bulk
//! insert with a partial-failure split reported via
//! `BulkWriteError::write_errors`, and `$set` upserts. Grounded on
//! `migration_utility/db_clients/mongodb/mongodb_client.py`.

use crate::{
    error::StoreError,
    keymodel,
    traits::{ReadResult, Store, WriteResult},
};
use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument, doc};
use model::{Cursor, Document, FieldQuery, QueryOp, Value};
use mongodb::{Client, Collection, error::ErrorKind, options::FindOptions};
use rust_decimal::Decimal;
use std::{str::FromStr, sync::Arc};
use tokio::sync::Mutex;
use tracing::warn;

pub struct MongoStore {
    client: Client,
    database: String,
    last_cursor: Mutex<Option<Cursor>>,
}

impl MongoStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        MongoStore {
            client,
            database: database.into(),
            last_cursor: Mutex::new(None),
        }
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.client.database(&self.database).collection(name)
    }

    fn operator_key(op: QueryOp) -> &'static str {
        match op {
            QueryOp::Eq => "$eq",
            QueryOp::Gt => "$gt",
            QueryOp::Gte => "$gte",
            QueryOp::Lt => "$lt",
            QueryOp::Lte => "$lte",
        }
    }

    fn build_filter(queries: &[FieldQuery], find_all: bool) -> BsonDocument {
        let mut filter = BsonDocument::new();
        for q in queries {
            let field = if q.field_name == "id" { "_id" } else { &q.field_name };
            filter.insert(field, doc! { Self::operator_key(q.operation): value_to_bson(&q.value) });
        }
        if !find_all {
            filter.insert("is_migrated", doc! { "$ne": true });
        }
        filter
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn find(
        &self,
        collection: &str,
        queries: &[FieldQuery],
        index_name: Option<&str>,
        batch_size: usize,
        find_all: bool,
    ) -> Result<ReadResult, StoreError> {
        let filter = Self::build_filter(queries, find_all);

        let skip = {
            let cursor = self.last_cursor.lock().await;
            cursor
                .as_ref()
                .and_then(|c| c.get("skip"))
                .and_then(Value::as_number)
                .and_then(|d| d.to_string().parse::<u64>().ok())
                .unwrap_or(0)
        };

        let mut options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .skip(skip)
            .limit((batch_size + 1) as i64)
            .build();
        if let Some(index_name) = index_name {
            options.hint = Some(mongodb::options::Hint::Name(index_name.to_string()));
        }

        let mut cursor = self
            .collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|err| StoreError::RetryableFetching {
                collection: collection.to_string(),
                message: err.to_string(),
            })?;

        let mut documents = Vec::new();
        use futures_util::TryStreamExt;
        while let Some(bson_doc) = cursor.try_next().await.map_err(|err| StoreError::RetryableFetching {
            collection: collection.to_string(),
            message: err.to_string(),
        })? {
            documents.push(bson_to_document(&bson_doc));
            if documents.len() >= batch_size {
                break;
            }
        }

        let has_more = documents.len() as u64 == batch_size as u64
            && cursor.try_next().await.ok().flatten().is_some();

        let next_cursor = if has_more {
            let mut c = Cursor::none();
            c.insert("skip", Value::Number((skip + documents.len() as u64).into()));
            Some(c)
        } else {
            None
        };

        *self.last_cursor.lock().await = next_cursor.clone();

        Ok(ReadResult {
            documents,
            has_more,
            cursor: next_cursor,
        })
    }

    async fn set_last_document(&self, cursor: Option<Cursor>) {
        *self.last_cursor.lock().await = cursor;
    }

    async fn last_fetched_key(&self) -> Option<Cursor> {
        self.last_cursor.lock().await.clone()
    }

    /// Mirrors `mongodb_client.py::batch_write`: injects `_id` from `id`,
    /// attempts an ordered `insert_many`, and on a `BulkWriteError` reads
    /// `nInserted`/`writeErrors` to split accepted from cancelled documents.
    async fn batch_write(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<WriteResult, StoreError> {
        let with_ids: Vec<Document> = documents
            .into_iter()
            .map(|d| keymodel::inject_primary_key(d, "_id"))
            .collect();
        let bson_docs: Vec<BsonDocument> = with_ids.iter().map(document_to_bson).collect();

        match self.collection(collection).insert_many(bson_docs).ordered(false).await {
            Ok(result) => {
                let accepted_ids: Vec<String> = with_ids
                    .iter()
                    .filter_map(|d| model::value::document_id(d).map(str::to_string))
                    .collect();
                Ok(WriteResult {
                    processed_count: result.inserted_ids.len(),
                    accepted_ids,
                })
            }
            Err(err) => match *err.kind {
                ErrorKind::BulkWrite(ref failure) => {
                    let failed_indexes: Vec<usize> = failure
                        .write_errors
                        .iter()
                        .flat_map(|errs| errs.iter().map(|e| e.index))
                        .collect();

                    let mut inserted = Vec::new();
                    let mut cancelled = Vec::new();
                    for (i, doc) in with_ids.into_iter().enumerate() {
                        if failed_indexes.contains(&i) {
                            cancelled.push(doc);
                        } else {
                            inserted.push(doc);
                        }
                    }

                    warn!(collection, inserted = inserted.len(), cancelled = cancelled.len(), "partial bulk write");

                    Err(StoreError::InsertionWasCancelled {
                        collection: collection.to_string(),
                        exception_details: err.to_string(),
                        cancelled_documents: cancelled,
                        inserted_documents: inserted,
                    })
                }
                _ => Err(StoreError::FetchingTerminated {
                    collection: collection.to_string(),
                    message: err.to_string(),
                }),
            },
        }
    }

    async fn batch_update(
        &self,
        collection: &str,
        updates: Vec<Document>,
    ) -> Result<(), StoreError> {
        for update in updates {
            self.update(collection, update).await?;
        }
        Ok(())
    }

    /// `update_one({_id}, {$set: rest}, upsert=True)` with `_id` popped out
    /// of the `$set` payload, mirroring `mongodb_client.py::update`.
    async fn update(&self, collection: &str, single: Document) -> Result<(), StoreError> {
        let single = keymodel::inject_primary_key(single, "_id");
        let Some(id) = model::value::document_id(&single) else {
            return Err(StoreError::MissingRequiredConfigurationParam(
                "document is missing an id field".to_string(),
            ));
        };

        let mut set_fields = document_to_bson(&single);
        set_fields.remove("_id");

        self.collection(collection)
            .update_one(doc! { "_id": id }, doc! { "$set": set_fields })
            .upsert(true)
            .await
            .map_err(|err| StoreError::TransactionalUpdate {
                collection: collection.to_string(),
                message: err.to_string(),
            })?;

        Ok(())
    }

    async fn find_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let result = self
            .collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|err| StoreError::FetchingTerminated {
                collection: collection.to_string(),
                message: err.to_string(),
            })?;

        Ok(result.map(|d| bson_to_document(&d)))
    }
}

fn document_to_bson(doc: &Document) -> BsonDocument {
    let mut out = BsonDocument::new();
    for (k, v) in doc {
        out.insert(k.clone(), value_to_bson(v));
    }
    out
}

fn bson_to_document(doc: &BsonDocument) -> Document {
    doc.iter().map(|(k, v)| (k.clone(), bson_to_value(v))).collect()
}

fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::String(s) => Bson::String(s.clone()),
        Value::Number(d) => Bson::Decimal128(
            bson::Decimal128::from_str(&d.to_string()).unwrap_or(bson::Decimal128::from_str("0").unwrap()),
        ),
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Null => Bson::Null,
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Object(doc) => Bson::Document(document_to_bson(doc)),
    }
}

fn bson_to_value(value: &Bson) -> Value {
    match value {
        Bson::String(s) => Value::String(s.clone()),
        Bson::Decimal128(d) => Decimal::from_str(&d.to_string()).map(Value::Number).unwrap_or(Value::Null),
        Bson::Int32(n) => Value::Number(Decimal::from(*n)),
        Bson::Int64(n) => Value::Number(Decimal::from(*n)),
        Bson::Double(n) => Decimal::from_str(&n.to_string()).map(Value::Number).unwrap_or(Value::Null),
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Null => Value::Null,
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_value).collect()),
        Bson::Document(doc) => Value::Object(bson_to_document(doc)),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => Value::String(other.to_string()),
    }
}

pub async fn connect(connection_string: &str) -> Result<Client, StoreError> {
    Client::with_uri_str(connection_string)
        .await
        .map_err(|err| StoreError::MissingRequiredConfigurationParam(err.to_string()))
}

pub fn store(client: Client, database: impl Into<String>) -> Arc<MongoStore> {
    Arc::new(MongoStore::new(client, database))
}
