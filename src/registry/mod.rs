// ============================================================================
// Generic Persistence Registry
// ============================================================================
//
// One `Registry<E>` per entity type. Every operation:
// - compiles its filter against `E::schema()` before touching the store
// - runs inside a transaction (an implicit one for the plain variants)
// - loads requested relations in one batched read per relation
// - queues change notifications on the transaction's commit hooks, each
//   flushing the row's latest recorded payload
//
// ============================================================================

mod paging;
mod read;
mod write;

use crate::core::{
    RegistryError, Relation, RelationKind, Result, ResultExt, Row, TableSchema, Value, audit_columns,
};
use crate::entity::Entity;
use crate::facade::Database;
use crate::filter::{Filter, SortField};
use crate::notify::{TopicFn, TopicScheme};
use crate::query::QueryEngine;
use crate::storage::{StoreQuery, Visibility};
use crate::transaction::Transaction;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Maps an entity to its public projection.
pub type ResourceFn<E> = Arc<dyn Fn(&E) -> <E as Entity>::Response + Send + Sync>;

/// Which relations a read loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Preload {
    /// The registry's default list.
    #[default]
    Default,
    /// No relations.
    None,
    /// Exactly these relations.
    Only(Vec<String>),
}

impl Preload {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }
}

/// Everything a registry is built from.
pub struct RegistryParams<E: Entity> {
    pub database: Database,
    pub preloads: Vec<String>,
    pub resource: ResourceFn<E>,
    pub created: Option<TopicFn<E>>,
    pub updated: Option<TopicFn<E>>,
    pub deleted: Option<TopicFn<E>>,
}

impl<E: Entity> RegistryParams<E> {
    pub fn new(
        database: Database,
        resource: impl Fn(&E) -> E::Response + Send + Sync + 'static,
    ) -> Self {
        Self {
            database,
            preloads: Vec::new(),
            resource: Arc::new(resource),
            created: None,
            updated: None,
            deleted: None,
        }
    }

    pub fn preloads<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preloads = names.into_iter().map(Into::into).collect();
        self
    }

    /// Publishes create, update and delete under the scheme's topics.
    pub fn topics(mut self, scheme: TopicScheme<E>) -> Self {
        let (created, updated, deleted) = scheme.into_fns();
        self.created = Some(created);
        self.updated = Some(updated);
        self.deleted = Some(deleted);
        self
    }

    pub fn created(mut self, topics: TopicFn<E>) -> Self {
        self.created = Some(topics);
        self
    }

    pub fn updated(mut self, topics: TopicFn<E>) -> Self {
        self.updated = Some(topics);
        self
    }

    pub fn deleted(mut self, topics: TopicFn<E>) -> Self {
        self.deleted = Some(topics);
        self
    }
}

/// Typed CRUD, query and notification operations for one entity type.
pub struct Registry<E: Entity> {
    db: Database,
    preloads: Vec<String>,
    resource: ResourceFn<E>,
    created: Option<TopicFn<E>>,
    updated: Option<TopicFn<E>>,
    deleted: Option<TopicFn<E>>,
}

impl<E: Entity> Registry<E> {
    /// Registers the entity's table with the store and validates the default preloads.
    pub async fn new(params: RegistryParams<E>) -> Result<Self> {
        let schema = E::schema();
        for name in &params.preloads {
            relation_of(schema, name)?;
        }
        params
            .database
            .store()
            .ensure_table(schema)
            .await
            .context("register", schema.name())?;

        Ok(Self {
            db: params.database,
            preloads: params.preloads,
            resource: params.resource,
            created: params.created,
            updated: params.updated,
            deleted: params.deleted,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn schema(&self) -> &'static TableSchema {
        E::schema()
    }

    pub fn name(&self) -> &'static str {
        E::schema().name()
    }

    pub fn default_preloads(&self) -> &[String] {
        &self.preloads
    }

    // ------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------

    /// `None` in, `None` out; the resource function never sees a missing entity.
    pub fn to_model(&self, entity: Option<&E>) -> Option<E::Response> {
        entity.map(|e| (self.resource)(e))
    }

    pub fn to_models(&self, entities: &[E]) -> Vec<E::Response> {
        entities.iter().map(|e| (self.resource)(e)).collect()
    }

    /// Decodes a JSON request payload.
    pub fn decode_request(&self, body: &str) -> Result<E::Request> {
        serde_json::from_str(body).map_err(|err| {
            RegistryError::Validation(format!(
                "malformed {} request payload: {}",
                self.name(),
                err
            ))
        })
    }

    // ------------------------------------------------------------------
    // Internals shared by read, write and paging
    // ------------------------------------------------------------------

    fn engine(&self) -> &QueryEngine {
        self.db.engine()
    }

    fn base_query(&self) -> StoreQuery {
        StoreQuery::new(self.name())
    }

    fn filtered(&self, filter: &Filter, visibility: Visibility) -> Result<StoreQuery> {
        let predicate = filter.compile(E::schema())?;
        Ok(self.base_query().filter(predicate).visibility(visibility))
    }

    /// Runs `operation` inside a span and tags its error with the operation and target.
    async fn traced<T>(
        &self,
        operation: &'static str,
        target: impl fmt::Display,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let target = target.to_string();
        let span = info_span!("registry", operation, entity = self.name(), target = %target);
        work.instrument(span).await.context(operation, target)
    }

    fn relations_for(&self, preload: &Preload) -> Result<Vec<&'static Relation>> {
        let schema = E::schema();
        match preload {
            Preload::None => Ok(Vec::new()),
            Preload::Default => self
                .preloads
                .iter()
                .map(|name| relation_of(schema, name))
                .collect(),
            Preload::Only(names) => names.iter().map(|name| relation_of(schema, name)).collect(),
        }
    }

    /// Turns rows into entities and attaches the requested relations.
    async fn hydrate(
        &self,
        rows: Vec<Row>,
        preload: &Preload,
        tx: Option<&Transaction>,
    ) -> Result<Vec<E>> {
        let relations = self.relations_for(preload)?;
        let mut entities = rows
            .iter()
            .map(E::from_row)
            .collect::<Result<Vec<E>>>()?;
        if entities.is_empty() || relations.is_empty() {
            return Ok(entities);
        }

        // One batched read per relation, all in flight together.
        let rows = &rows;
        let loads = relations.iter().map(|relation| async move {
            let related = match &relation.kind {
                RelationKind::BelongsTo { local_key } => {
                    let keys = rows
                        .iter()
                        .filter_map(|row| row.value(local_key).as_uuid())
                        .collect();
                    self.load_related(&relation.table, audit_columns::ID, keys, tx)
                        .await?
                }
                RelationKind::HasMany { foreign_key } => {
                    let keys = rows.iter().filter_map(Row::id).collect();
                    self.load_related(&relation.table, foreign_key, keys, tx)
                        .await?
                }
            };
            Ok::<_, RegistryError>((*relation, related))
        });

        for (relation, mut related) in try_join_all(loads).await? {
            match &relation.kind {
                RelationKind::BelongsTo { local_key } => {
                    for (entity, row) in entities.iter_mut().zip(rows) {
                        let attached = row
                            .value(local_key)
                            .as_uuid()
                            .and_then(|key| related.get(&key))
                            .cloned()
                            .unwrap_or_default();
                        entity.attach(&relation.name, attached)?;
                    }
                }
                RelationKind::HasMany { .. } => {
                    for entity in entities.iter_mut() {
                        let attached = related.remove(&entity.id()).unwrap_or_default();
                        entity.attach(&relation.name, attached)?;
                    }
                }
            }
        }
        Ok(entities)
    }

    /// One read of `table` for every live row whose `column` is in `keys`, grouped by that column.
    async fn load_related(
        &self,
        table: &str,
        column: &str,
        keys: HashSet<Uuid>,
        tx: Option<&Transaction>,
    ) -> Result<HashMap<Uuid, Vec<Row>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let view = tx.map(Transaction::view).transpose()?;
        let name = column.to_string();
        let query = StoreQuery::new(table)
            .where_fn(move |row| {
                row.value(&name)
                    .as_uuid()
                    .is_some_and(|key| keys.contains(&key))
            })
            .sort(vec![
                SortField::asc(audit_columns::CREATED_AT),
                SortField::asc(audit_columns::ID),
            ]);
        let rows = self.engine().store().select(&query, view.as_ref()).await?;

        let mut grouped: HashMap<Uuid, Vec<Row>> = HashMap::new();
        for row in rows {
            if let Some(key) = row.value(column).as_uuid() {
                grouped.entry(key).or_default().push(row);
            }
        }
        Ok(grouped)
    }

    fn publishes(&self) -> bool {
        self.created.is_some() || self.updated.is_some() || self.deleted.is_some()
    }

    /// Records the entity's projection as the row's latest payload and, when
    /// `topics` is set, publishes the row's payload as of commit once `tx` commits.
    fn queue_notification(
        &self,
        tx: &Transaction,
        topics: Option<&TopicFn<E>>,
        entity: &E,
    ) -> Result<()> {
        let dispatcher = self.db.dispatcher();
        if !dispatcher.is_enabled() || !self.publishes() {
            return Ok(());
        }
        let payload = serde_json::to_value((self.resource)(entity))?;
        let slot = tx.latest_payload(self.name(), entity.id(), payload)?;
        let Some(topics) = topics else {
            return Ok(());
        };

        let topics = topics(entity);
        let dispatcher = dispatcher.clone();
        tx.on_commit(move || {
            let payload = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
            dispatcher.publish_detached(topics, payload)
        })
    }
}

fn relation_of<'a>(schema: &'a TableSchema, name: &str) -> Result<&'a Relation> {
    schema.get_relation(name).ok_or_else(|| {
        RegistryError::Validation(format!(
            "Unknown relation '{}' on '{}'",
            name,
            schema.name()
        ))
    })
}

fn missing_id<E: Entity>(id: Uuid) -> RegistryError {
    RegistryError::not_found(E::schema().name(), format!("id {}", id))
}

fn as_i64(value: Option<Value>) -> Result<i64> {
    match value {
        None => Ok(0),
        Some(value) => value.as_i64().ok_or_else(|| {
            RegistryError::Validation(format!("expected an integer aggregate, got {}", value))
        }),
    }
}

impl<E: Entity> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entity", &self.name())
            .field("preloads", &self.preloads)
            .finish()
    }
}
