use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    auth::Principal,
    repository::{Resource, ResourceStore, StoreError, UserDirectory},
};

/// InMemoryStore
///
/// Process-local implementation of `ResourceStore`, used by the test-suite and for
/// exercising the HTTP layer without PostgreSQL. Ids start at 1 and are never reused,
/// matching a `BIGSERIAL` column. Writes take the lock for their whole duration, so
/// conflicting operations on one id are serialized.
pub struct InMemoryStore<R: Resource> {
    inner: RwLock<Collection<R>>,
}

struct Collection<R> {
    next_id: i64,
    records: BTreeMap<i64, R>,
}

impl<R: Resource> InMemoryStore<R> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Collection {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<R: Resource> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> ResourceStore<R> for InMemoryStore<R> {
    async fn create(&self, new: R::New) -> Result<R, StoreError> {
        let mut collection = self.inner.write().await;
        let id = collection.next_id;
        collection.next_id += 1;

        let record = R::from_new(id, Utc::now(), new);
        collection.records.insert(id, record.clone());
        tracing::debug!(collection = R::COLLECTION, id, "record created");
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<R, StoreError> {
        self.inner
            .read()
            .await
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<R>, StoreError> {
        // BTreeMap iteration follows id order, which is creation order.
        Ok(self.inner.read().await.records.values().cloned().collect())
    }

    async fn update(&self, id: i64, patch: R::Patch) -> Result<R, StoreError> {
        let mut collection = self.inner.write().await;
        let record = collection.records.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.apply(patch);
        debug_assert_eq!(record.id(), id);
        Ok(record.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut collection = self.inner.write().await;
        match collection.records.remove(&id) {
            Some(_) => {
                tracing::debug!(collection = R::COLLECTION, id, "record deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

/// InMemoryDirectory
///
/// Mutable user/group directory. Membership edits are visible to the very next
/// `find_principal` call.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<i64, DirectoryUser>>,
}

struct DirectoryUser {
    username: String,
    active: bool,
    groups: BTreeSet<String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an active user with the given groups.
    pub async fn add_user<G>(&self, id: i64, username: &str, groups: G)
    where
        G: IntoIterator,
        G::Item: Into<String>,
    {
        self.users.write().await.insert(
            id,
            DirectoryUser {
                username: username.to_string(),
                active: true,
                groups: groups.into_iter().map(Into::into).collect(),
            },
        );
    }

    /// Returns false when the user is unknown.
    pub async fn add_to_group(&self, id: i64, group: &str) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.groups.insert(group.to_string());
                true
            }
            None => false,
        }
    }

    /// Returns false when the user is unknown or was not a member.
    pub async fn remove_from_group(&self, id: i64, group: &str) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => user.groups.remove(group),
            None => false,
        }
    }

    pub async fn set_active(&self, id: i64, active: bool) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_principal(&self, user_id: i64) -> Result<Option<Principal>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .filter(|user| user.active)
            .map(|user| Principal::new(user_id, user.username.clone(), user.groups.iter().cloned())))
    }
}
