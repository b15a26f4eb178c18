use std::sync::Arc;

use meridian_store::Store;
use meridian_store::entities::{Cluster, ClusterPatch, group_namespace};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cascade::{self, CascadeTask};
use crate::error::{ApiError, ApiResult};
use crate::executors::{instances, secrets};
use crate::kube;
use crate::models::{ClusterView, CreateClusterMetadata, UpdateClusterMetadata};

pub async fn create_cluster(store: &Store, caller: &AuthUser, meta: CreateClusterMetadata) -> ApiResult<ClusterView> {
    let owning_group = store
        .get_group_by_name(&meta.group)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or_else(|| ApiError::BadRequest("unknown group".to_string()))?;
    caller.may_act_on_group(store, owning_group.id).await?;

    let cluster = Cluster {
        id: Uuid::new_v4(),
        name: meta.name,
        owning_group: owning_group.id,
        organization: meta.organization,
        kubeconfig: meta.kubeconfig,
        system_namespace: group_namespace(&owning_group.name),
        locations: meta.locations,
    };

    let created = store
        .create_cluster(cluster)
        .await
        .map_err(|e| match e.downcast::<meridian_store::BackendError>() {
            Ok(meridian_store::BackendError::NameConflict) => ApiError::Conflict("a cluster with that name already exists".to_string()),
            Ok(other) => ApiError::StoreFailure(other.into()),
            Err(other) => ApiError::StoreFailure(other),
        })?;
    Ok(ClusterView::from(created))
}

async fn owning_group_or_admin(store: &Store, caller: &AuthUser, cluster: Uuid) -> ApiResult<Cluster> {
    let cluster = store.get_cluster(cluster).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    caller.may_act_on_group(store, cluster.owning_group).await?;
    Ok(cluster)
}

pub async fn get_cluster(store: &Store, id: Uuid) -> ApiResult<ClusterView> {
    let cluster = store.get_cluster(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(ClusterView::from(cluster))
}

pub async fn update_cluster(store: &Store, caller: &AuthUser, id: Uuid, meta: UpdateClusterMetadata) -> ApiResult<()> {
    owning_group_or_admin(store, caller, id).await?;
    let patch = ClusterPatch {
        organization: meta.organization,
        kubeconfig: meta.kubeconfig,
        locations: meta.locations,
    };
    store.update_cluster(id, patch).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(())
}

pub async fn list_clusters(store: &Store) -> ApiResult<Vec<meridian_store::entities::Summary>> {
    store.list_clusters().await.map_err(ApiError::StoreFailure)
}

pub async fn grant_cluster_access(store: &Store, caller: &AuthUser, cluster: Uuid, group: Uuid) -> ApiResult<()> {
    owning_group_or_admin(store, caller, cluster).await?;
    store.grant_cluster_access(cluster, group).await.map_err(ApiError::StoreFailure)
}

pub async fn revoke_cluster_access(store: &Store, caller: &AuthUser, cluster: Uuid, group: Uuid) -> ApiResult<()> {
    owning_group_or_admin(store, caller, cluster).await?;
    store.revoke_cluster_access(cluster, group).await.map_err(ApiError::StoreFailure)
}

pub async fn list_cluster_allowed_groups(store: &Store, caller: &AuthUser, cluster: Uuid) -> ApiResult<Vec<Uuid>> {
    let cluster = owning_group_or_admin(store, caller, cluster).await?;
    store.list_cluster_allowed_groups(cluster.id).await.map_err(ApiError::StoreFailure)
}

pub async fn list_cluster_group_apps(store: &Store, caller: &AuthUser, cluster: Uuid, group: Uuid) -> ApiResult<Vec<String>> {
    owning_group_or_admin(store, caller, cluster).await?;
    store.list_cluster_group_apps(cluster, group).await.map_err(ApiError::StoreFailure)
}

pub async fn grant_app(store: &Store, caller: &AuthUser, cluster: Uuid, group: Uuid, app: &str) -> ApiResult<()> {
    owning_group_or_admin(store, caller, cluster).await?;
    store.grant_app(cluster, group, app).await.map_err(ApiError::StoreFailure)
}

pub async fn revoke_app(store: &Store, caller: &AuthUser, cluster: Uuid, group: Uuid, app: &str) -> ApiResult<()> {
    owning_group_or_admin(store, caller, cluster).await?;
    store.revoke_app(cluster, group, app).await.map_err(ApiError::StoreFailure)
}

/// Cluster cascade delete (§4.5.3). Owned instances and secrets are torn
/// down with bounded concurrency before the cluster record disappears, then
/// the group's namespace on this cluster is removed, since both instance
/// and secret teardown live inside it. No caller to authorize against here;
/// used both by the authorized entry point below and by group cascade
/// delete, which has already authorized the whole subtree.
pub(crate) async fn teardown(store: &Arc<Store>, cluster: Cluster, max_concurrency: usize) -> Result<(), anyhow::Error> {
    let mut owned_instances = Vec::new();
    for instance_id in store.list_instances_on_cluster(cluster.id).await? {
        if let Some(instance) = store.get_instance(instance_id).await? {
            owned_instances.push(instance);
        }
    }
    let mut owned_secrets = Vec::new();
    for secret_id in store.list_secrets_on_cluster(cluster.id).await? {
        if let Some(secret) = store.get_secret(secret_id).await? {
            owned_secrets.push(secret);
        }
    }

    store.delete_cluster(cluster.id).await?;

    let mut tasks: Vec<CascadeTask<()>> = Vec::new();
    for instance in owned_instances {
        let store = store.clone();
        tasks.push(Box::pin(async move { instances::teardown(&store, &instance, true).await.map(|_| ()) }));
    }
    for secret in owned_secrets {
        let store = store.clone();
        tasks.push(Box::pin(async move { secrets::teardown(&store, &secret).await }));
    }

    let results = cascade::fan_out(max_concurrency, tasks).await;
    for result in &results {
        if let Err(err) = result {
            tracing::warn!(cluster = %cluster.id, %err, "cascade delete step failed");
        }
    }

    if let Ok(kubeconfig) = store.kubeconfig_handle(cluster.id).await
        && let Ok(Some(group)) = store.get_group(cluster.owning_group).await
    {
        let namespace = group_namespace(&group.name);
        let _ = kube::kubectl_delete_namespace(&kubeconfig, &namespace).await;
    }

    Ok(())
}

pub async fn delete_cluster(store: Arc<Store>, caller: &AuthUser, id: Uuid, max_concurrency: usize) -> ApiResult<()> {
    let cluster = owning_group_or_admin(&store, caller, id).await?;
    teardown(&store, cluster, max_concurrency).await.map_err(ApiError::StoreFailure)
}
