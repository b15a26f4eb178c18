//! The key/value abstraction the persistent store's typed accessors sit on
//! top of. The reference deployment hard-codes DynamoDB; this trait is the
//! seam that lets this implementation use Postgres instead (see
//! [`postgres::PostgresBackend`]) while keeping an in-memory mock
//! ([`memory::MemoryBackend`]) available for tests, without either choice
//! leaking into the command executors above the store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{ApplicationInstance, Cluster, ClusterPatch, Group, GroupPatch, Secret, Summary, User, UserPatch};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("name already in use")]
    NameConflict,
    #[error("backend failure: {0}")]
    Failure(#[from] anyhow::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Single source of truth for every entity. Implementors only need to
/// provide correct reads-after-writes for a single item; the persistent
/// store layered on top owns caching and cross-entity orchestration.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn create_user(&self, user: User) -> BackendResult<User>;
    async fn get_user(&self, id: Uuid) -> BackendResult<Option<User>>;
    async fn get_user_by_token(&self, token: &str) -> BackendResult<Option<User>>;
    async fn get_user_by_external_id(&self, external_id: &str) -> BackendResult<Option<User>>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> BackendResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> BackendResult<bool>;
    async fn list_users(&self) -> BackendResult<Vec<Summary>>;

    async fn create_group(&self, group: Group) -> BackendResult<Group>;
    async fn get_group(&self, id: Uuid) -> BackendResult<Option<Group>>;
    async fn get_group_by_name(&self, name: &str) -> BackendResult<Option<Group>>;
    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> BackendResult<Option<Group>>;
    async fn delete_group(&self, id: Uuid) -> BackendResult<bool>;
    async fn list_groups(&self) -> BackendResult<Vec<Summary>>;

    async fn add_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()>;
    async fn remove_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()>;
    async fn list_group_members(&self, group: Uuid) -> BackendResult<Vec<Uuid>>;
    async fn list_user_groups(&self, user: Uuid) -> BackendResult<Vec<Uuid>>;

    async fn create_cluster(&self, cluster: Cluster) -> BackendResult<Cluster>;
    async fn get_cluster(&self, id: Uuid) -> BackendResult<Option<Cluster>>;
    async fn get_cluster_by_name(&self, name: &str) -> BackendResult<Option<Cluster>>;
    async fn update_cluster(&self, id: Uuid, patch: ClusterPatch) -> BackendResult<Option<Cluster>>;
    async fn delete_cluster(&self, id: Uuid) -> BackendResult<bool>;
    async fn list_clusters(&self) -> BackendResult<Vec<Summary>>;
    async fn list_clusters_owned_by(&self, group: Uuid) -> BackendResult<Vec<Uuid>>;

    async fn grant_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()>;
    async fn revoke_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()>;
    async fn list_cluster_allowed_groups(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>>;

    async fn grant_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()>;
    async fn revoke_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()>;
    async fn list_cluster_group_apps(&self, cluster: Uuid, group: Uuid) -> BackendResult<Vec<String>>;

    async fn create_instance(&self, instance: ApplicationInstance) -> BackendResult<ApplicationInstance>;
    async fn get_instance(&self, id: Uuid) -> BackendResult<Option<ApplicationInstance>>;
    async fn get_instance_by_name(&self, name: &str) -> BackendResult<Option<ApplicationInstance>>;
    async fn delete_instance(&self, id: Uuid) -> BackendResult<bool>;
    async fn list_instances(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>>;
    async fn list_instances_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>>;

    async fn create_secret(&self, secret: Secret) -> BackendResult<Secret>;
    async fn get_secret(&self, id: Uuid) -> BackendResult<Option<Secret>>;
    async fn delete_secret(&self, id: Uuid) -> BackendResult<bool>;
    async fn list_secrets(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>>;
    async fn list_secrets_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>>;
}
