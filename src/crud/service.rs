use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config;
use crate::error::ServiceError;
use crate::filter::{parse_find_and_count, FilterCompiler, FilterExpression, PaginationArgs};
use crate::ident;
use crate::mapping;
use crate::restrict::{EnforceOptions, RestrictionEngine, RestrictionRegistry};
use crate::store::DocumentStore;

use super::events::{CrudEvent, CrudOperation, EventSink};
use super::options::ServiceOptions;

/// Entity-specific wiring for one [`CrudService`] instance.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    /// Backing collection name.
    pub collection: String,
    /// Registry key for restriction lookups.
    pub type_name: String,
    /// Fields one-way hashed during input preparation.
    pub password_fields: Vec<String>,
    /// Fields removed unconditionally during output preparation.
    pub secret_fields: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(collection: impl Into<String>, type_name: impl Into<String>) -> Self {
        let cfg = &config::CONFIG.crud;
        Self {
            collection: collection.into(),
            type_name: type_name.into(),
            password_fields: cfg.password_fields.clone(),
            secret_fields: cfg.secret_fields.clone(),
        }
    }

    pub fn password_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.password_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn secret_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secret_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A find argument: either a declarative filter tree to compile, or an
/// already-built predicate document passed through untouched.
pub enum FindQuery {
    Filter(FilterExpression),
    Predicate(Value),
}

impl From<FilterExpression> for FindQuery {
    fn from(expr: FilterExpression) -> Self {
        FindQuery::Filter(expr)
    }
}

impl From<Value> for FindQuery {
    fn from(predicate: Value) -> Self {
        FindQuery::Predicate(predicate)
    }
}

/// Windowed result with the pagination summary from the same store round
/// trip, so items and total can never disagree.
#[derive(Debug, Clone)]
pub struct FindAndCountResult<U> {
    pub items: Vec<U>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// One-way hash for password-like fields; stored values are never
/// reversible or echoed back.
pub fn hash_secret(plain: &str) -> String {
    format!("{:x}", Sha256::digest(plain.as_bytes()))
}

/// Generic CRUD orchestration over one entity type.
///
/// Every operation runs the same stage order, each stage individually
/// skippable: input restriction, input preparation, record resolution and
/// authorization (update/delete), the backend call, output preparation,
/// output restriction. `_force` variants skip the authorization stages,
/// `_raw` variants additionally skip preparation and mapping.
pub struct CrudService<T> {
    descriptor: EntityDescriptor,
    store: Arc<dyn DocumentStore>,
    engine: RestrictionEngine,
    compiler: FilterCompiler,
    events: Option<Arc<dyn EventSink>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> CrudService<T>
where
    T: DeserializeOwned + Send + Sync,
{
    pub fn new(
        descriptor: EntityDescriptor,
        store: Arc<dyn DocumentStore>,
        registry: Arc<RestrictionRegistry>,
    ) -> Self {
        Self {
            descriptor,
            store,
            engine: RestrictionEngine::new(registry),
            compiler: FilterCompiler::new(),
            events: None,
            _entity: PhantomData,
        }
    }

    pub fn with_compiler(mut self, compiler: FilterCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    // --- create ---

    pub async fn create(&self, input: Value, options: &ServiceOptions<'_>) -> Result<T, ServiceError> {
        let record = self.create_value(input, options).await?;
        self.materialize(record)
    }

    pub async fn create_force(
        &self,
        input: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<T, ServiceError> {
        self.create(input, &options.clone().force()).await
    }

    pub async fn create_raw(
        &self,
        input: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        self.warn_raw("create");
        self.create_value(input, &options.clone().raw()).await
    }

    async fn create_value(
        &self,
        input: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        let input = if options.skip_authorization() {
            input
        } else {
            self.check_required_roles(options)?;
            self.restrict_input(input, options, None, true)?
        };
        let input = if options.raw {
            input
        } else {
            self.prepare_input(input, options, true)
        };

        let stored = self
            .store
            .insert_one(&self.descriptor.collection, input)
            .await?;

        let record = self.finish_output(stored, options)?;
        self.publish(CrudOperation::Create, &record).await;
        Ok(record)
    }

    // --- get ---

    pub async fn get(&self, id: &str, options: &ServiceOptions<'_>) -> Result<T, ServiceError> {
        let record = self.get_value(id, options).await?;
        self.materialize(record)
    }

    pub async fn get_force(&self, id: &str, options: &ServiceOptions<'_>) -> Result<T, ServiceError> {
        self.get(id, &options.clone().force()).await
    }

    pub async fn get_raw(&self, id: &str, options: &ServiceOptions<'_>) -> Result<Value, ServiceError> {
        self.warn_raw("get");
        self.get_value(id, &options.clone().raw()).await
    }

    async fn get_value(
        &self,
        id: &str,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        if !options.skip_authorization() {
            self.check_required_roles(options)?;
        }
        let record = self.fetch_by_id(id).await?;
        self.finish_output(record, options)
    }

    // --- find ---

    pub async fn find(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<Vec<T>, ServiceError> {
        let rows = self.find_value(query.into(), args, options).await?;
        rows.into_iter().map(|r| self.materialize(r)).collect()
    }

    pub async fn find_force(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<Vec<T>, ServiceError> {
        self.find(query, args, &options.clone().force()).await
    }

    pub async fn find_raw(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<Vec<Value>, ServiceError> {
        self.warn_raw("find");
        self.find_value(query.into(), args, &options.clone().raw()).await
    }

    async fn find_value(
        &self,
        query: FindQuery,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<Vec<Value>, ServiceError> {
        if !options.skip_authorization() {
            self.check_required_roles(options)?;
        }
        let predicate = self.compile_query(query)?;
        let find_options = self.compiler.find_options(args)?;
        let rows = self
            .store
            .find(&self.descriptor.collection, &predicate, Some(&find_options))
            .await?;
        rows.into_iter()
            .map(|row| self.finish_output(row, options))
            .collect()
    }

    // --- findAndCount ---

    pub async fn find_and_count(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<FindAndCountResult<T>, ServiceError> {
        let result = self
            .find_and_count_value(query.into(), args, options)
            .await?;
        Ok(FindAndCountResult {
            items: result
                .items
                .into_iter()
                .map(|r| self.materialize(r))
                .collect::<Result<_, _>>()?,
            total_count: result.total_count,
            limit: result.limit,
            offset: result.offset,
        })
    }

    pub async fn find_and_count_force(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<FindAndCountResult<T>, ServiceError> {
        self.find_and_count(query, args, &options.clone().force()).await
    }

    pub async fn find_and_count_raw(
        &self,
        query: impl Into<FindQuery>,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<FindAndCountResult<Value>, ServiceError> {
        self.warn_raw("findAndCount");
        self.find_and_count_value(query.into(), args, &options.clone().raw())
            .await
    }

    async fn find_and_count_value(
        &self,
        query: FindQuery,
        args: &PaginationArgs,
        options: &ServiceOptions<'_>,
    ) -> Result<FindAndCountResult<Value>, ServiceError> {
        if !options.skip_authorization() {
            self.check_required_roles(options)?;
        }
        let predicate = self.compile_query(query)?;
        let pipeline = self.compiler.find_and_count_pipeline(&predicate, args)?;
        let rows = self
            .store
            .aggregate(&self.descriptor.collection, &pipeline)
            .await?;
        let (items, total_count) = parse_find_and_count(&rows);
        let summary = self.compiler.find_options(args)?;

        let items = items
            .into_iter()
            .map(|row| self.finish_output(row, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FindAndCountResult {
            items,
            total_count,
            limit: summary.limit,
            offset: summary.skip.unwrap_or(0),
        })
    }

    // --- update ---

    pub async fn update(
        &self,
        id: &str,
        patch: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<T, ServiceError> {
        let record = self.update_value(id, patch, options).await?;
        self.materialize(record)
    }

    pub async fn update_force(
        &self,
        id: &str,
        patch: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<T, ServiceError> {
        self.update(id, patch, &options.clone().force()).await
    }

    pub async fn update_raw(
        &self,
        id: &str,
        patch: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        self.warn_raw("update");
        self.update_value(id, patch, &options.clone().raw()).await
    }

    async fn update_value(
        &self,
        id: &str,
        patch: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        // The existing record serves as the companion for membership and
        // creator checks, and as the merge base.
        let existing = self.fetch_by_id(id).await?;

        let patch = if options.skip_authorization() {
            patch
        } else {
            self.check_required_roles(options)?;
            self.check_record_access(&existing, options, "update")?;
            self.restrict_input(patch, options, Some(&existing), false)?
        };
        let patch = if options.raw {
            patch
        } else {
            self.prepare_input(patch, options, false)
        };

        let updated = self
            .store
            .update_one(
                &self.descriptor.collection,
                &self.id_predicate(id),
                &json!({ "$set": patch }),
            )
            .await?
            .ok_or_else(|| self.not_found(id))?;

        let record = self.finish_output(updated, options)?;
        self.publish(CrudOperation::Update, &record).await;
        Ok(record)
    }

    // --- delete ---

    pub async fn delete(&self, id: &str, options: &ServiceOptions<'_>) -> Result<T, ServiceError> {
        let record = self.delete_value(id, options).await?;
        self.materialize(record)
    }

    pub async fn delete_force(
        &self,
        id: &str,
        options: &ServiceOptions<'_>,
    ) -> Result<T, ServiceError> {
        self.delete(id, &options.clone().force()).await
    }

    pub async fn delete_raw(
        &self,
        id: &str,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        self.warn_raw("delete");
        self.delete_value(id, &options.clone().raw()).await
    }

    async fn delete_value(
        &self,
        id: &str,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        let existing = self.fetch_by_id(id).await?;

        if !options.skip_authorization() {
            self.check_required_roles(options)?;
            self.check_record_access(&existing, options, "delete")?;
        }

        let removed = self
            .store
            .delete_one(&self.descriptor.collection, &self.id_predicate(id))
            .await?;
        if !removed {
            return Err(self.not_found(id));
        }

        // The pre-deletion record is the response.
        let record = self.finish_output(existing, options)?;
        self.publish(CrudOperation::Delete, &record).await;
        Ok(record)
    }

    // --- stages ---

    fn check_required_roles(&self, options: &ServiceOptions<'_>) -> Result<(), ServiceError> {
        if options.required_roles.is_empty() {
            return Ok(());
        }
        match options.user {
            Some(user) if user.has_any_role(&options.required_roles) => Ok(()),
            _ => Err(ServiceError::unauthorized(format!(
                "operation on {} requires one of roles {:?}",
                self.descriptor.type_name, options.required_roles
            ))),
        }
    }

    fn check_record_access(
        &self,
        existing: &Value,
        options: &ServiceOptions<'_>,
        operation: &str,
    ) -> Result<(), ServiceError> {
        let enforce = EnforceOptions::input(&self.descriptor.type_name).db_object(existing);
        if self.engine.subject_allowed(existing, options.user, &enforce) {
            Ok(())
        } else {
            Err(ServiceError::unauthorized(format!(
                "not allowed to {operation} this {}",
                self.descriptor.type_name
            )))
        }
    }

    fn restrict_input(
        &self,
        input: Value,
        options: &ServiceOptions<'_>,
        companion: Option<&Value>,
        creating: bool,
    ) -> Result<Value, ServiceError> {
        // On create the caller is the record's creator; nothing is stamped
        // yet, so the engine is told explicitly.
        let mut enforce =
            EnforceOptions::input(&self.descriptor.type_name).assume_creatorship(creating);
        if let Some(db) = companion.or(options.db_object.as_ref()) {
            enforce = enforce.db_object(db);
        }
        Ok(self.engine.enforce(input, options.user, &enforce)?)
    }

    fn prepare_input(
        &self,
        mut input: Value,
        options: &ServiceOptions<'_>,
        creating: bool,
    ) -> Value {
        // Absent and null keys must never clear stored fields.
        mapping::strip_nulls(&mut input);
        if let Value::Object(map) = &mut input {
            for field in &self.descriptor.password_fields {
                if let Some(Value::String(plain)) = map.get(field) {
                    let hashed = hash_secret(plain);
                    map.insert(field.clone(), Value::String(hashed));
                }
            }
            let now = Utc::now().to_rfc3339();
            if creating {
                map.insert("createdAt".to_string(), Value::String(now.clone()));
                if let Some(user) = options.user {
                    map.insert("createdBy".to_string(), Value::String(user.id.clone()));
                }
            }
            map.insert("updatedAt".to_string(), Value::String(now));
            if let Some(user) = options.user {
                map.insert("updatedBy".to_string(), Value::String(user.id.clone()));
            }
        }
        input
    }

    /// OUTPUT-PREPARE then OUTPUT-RESTRICT, honoring the raw/force flags.
    fn finish_output(
        &self,
        record: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        let record = if options.raw {
            record
        } else {
            self.prepare_output(record, options)
        };
        if options.skip_authorization() {
            Ok(record)
        } else {
            self.restrict_output(record, options)
        }
    }

    fn prepare_output(&self, mut record: Value, options: &ServiceOptions<'_>) -> Value {
        mapping::omit(&mut record, &self.descriptor.secret_fields);
        if let Some(select) = &options.select {
            record = mapping::pick(&record, select);
        }
        record
    }

    fn restrict_output(
        &self,
        record: Value,
        options: &ServiceOptions<'_>,
    ) -> Result<Value, ServiceError> {
        // The record itself is the membership companion unless the caller
        // supplied one.
        let companion = options
            .db_object
            .clone()
            .unwrap_or_else(|| record.clone());
        let enforce = EnforceOptions::output(&self.descriptor.type_name).db_object(&companion);
        Ok(self.engine.enforce(record, options.user, &enforce)?)
    }

    // --- plumbing ---

    async fn fetch_by_id(&self, id: &str) -> Result<Value, ServiceError> {
        self.store
            .find_one(&self.descriptor.collection, &self.id_predicate(id))
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    fn id_predicate(&self, id: &str) -> Value {
        let id_value = ident::to_query_value(&Value::String(id.to_string()));
        json!({ "id": { "$eq": id_value } })
    }

    fn not_found(&self, id: &str) -> ServiceError {
        ServiceError::not_found(format!("{} {} not found", self.descriptor.type_name, id))
    }

    fn compile_query(&self, query: FindQuery) -> Result<Value, ServiceError> {
        match query {
            FindQuery::Filter(expr) => Ok(self.compiler.compile(&expr)?),
            FindQuery::Predicate(predicate) => Ok(predicate),
        }
    }

    fn materialize(&self, record: Value) -> Result<T, ServiceError> {
        mapping::from_document(record).map_err(|e| {
            ServiceError::validation(
                format!("failed to map {} record: {e}", self.descriptor.type_name),
                HashMap::new(),
            )
        })
    }

    fn warn_raw(&self, operation: &str) {
        if config::CONFIG.crud.enable_audit_logging {
            tracing::warn!(
                collection = %self.descriptor.collection,
                operation,
                "raw variant bypasses restriction and preparation"
            );
        }
    }

    async fn publish(&self, operation: CrudOperation, record: &Value) {
        if let Some(events) = &self.events {
            events
                .publish(CrudEvent {
                    operation,
                    collection: self.descriptor.collection.clone(),
                    record: record.clone(),
                })
                .await;
        }
    }
}
