use crate::entity::Entity;
use std::fmt;
use std::sync::Arc;

pub type Topics = Vec<String>;

/// Computes the topics a mutation of one entity is published on.
pub type TopicFn<E> = Arc<dyn Fn(&E) -> Topics + Send + Sync>;

type ScopeKey<E> = Arc<dyn Fn(&E) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the conventional topic set for an entity type:
///
/// ```text
/// bank.create
/// bank.create.<id>
/// bank.create.branch.<branch_id>
/// ```
pub struct TopicScheme<E> {
    prefix: String,
    scopes: Vec<(String, ScopeKey<E>)>,
}

impl<E: Entity> TopicScheme<E> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            scopes: Vec::new(),
        }
    }

    /// Adds a `<prefix>.<action>.<name>.<key>` topic; skipped when `key` yields `None`.
    pub fn scope<K, F>(mut self, name: impl Into<String>, key: F) -> Self
    where
        K: fmt::Display,
        F: Fn(&E) -> Option<K> + Send + Sync + 'static,
    {
        let key: ScopeKey<E> = Arc::new(move |entity| key(entity).map(|k| k.to_string()));
        self.scopes.push((name.into(), key));
        self
    }

    pub fn topics(&self, action: Action, entity: &E) -> Topics {
        let base = format!("{}.{}", self.prefix, action);
        let mut topics = vec![base.clone(), format!("{}.{}", base, entity.id())];
        for (name, key) in &self.scopes {
            if let Some(value) = key(entity) {
                topics.push(format!("{}.{}.{}", base, name, value));
            }
        }
        topics
    }

    pub fn topic_fn(self: &Arc<Self>, action: Action) -> TopicFn<E> {
        let scheme = Arc::clone(self);
        Arc::new(move |entity| scheme.topics(action, entity))
    }

    /// `(created, updated, deleted)` topic functions.
    pub fn into_fns(self) -> (TopicFn<E>, TopicFn<E>, TopicFn<E>) {
        let scheme = Arc::new(self);
        (
            scheme.topic_fn(Action::Create),
            scheme.topic_fn(Action::Update),
            scheme.topic_fn(Action::Delete),
        )
    }
}
