use std::collections::HashSet;
use std::sync::Arc;

use meridian_store::Store;
use meridian_store::entities::{Group, GroupPatch, group_namespace};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cascade::{self, CascadeTask};
use crate::error::{ApiError, ApiResult};
use crate::executors::{clusters, instances, secrets};
use crate::kube;
use crate::models::{CreateGroupMetadata, GroupView, UpdateGroupMetadata};

const RESERVED_NAME_PREFIXES: &[&str] = &["slate-", "kube-"];
const MAX_GROUP_NAME_LEN: usize = 54;

fn validate_group_name(name: &str) -> ApiResult<()> {
    if name.is_empty() || name.len() > MAX_GROUP_NAME_LEN {
        return Err(ApiError::BadRequest(format!("group name must be 1-{MAX_GROUP_NAME_LEN} characters")));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(ApiError::BadRequest("group name must be DNS-safe (lowercase alphanumerics and '-')".to_string()));
    }
    if name.ends_with('-') {
        return Err(ApiError::BadRequest("group name must not end in '-'".to_string()));
    }
    if RESERVED_NAME_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Err(ApiError::BadRequest("group name uses a reserved prefix".to_string()));
    }
    Ok(())
}

pub async fn create_group(store: &Store, meta: CreateGroupMetadata) -> ApiResult<GroupView> {
    validate_group_name(&meta.name)?;

    let group = Group {
        id: Uuid::new_v4(),
        name: meta.name,
        email: meta.email,
        phone: meta.phone,
        field_of_science: meta.science_field,
        description: meta.description,
    };

    let created = store
        .create_group(group)
        .await
        .map_err(|e| match e.downcast::<meridian_store::BackendError>() {
            Ok(meridian_store::BackendError::NameConflict) => ApiError::Conflict("a group with that name already exists".to_string()),
            Ok(other) => ApiError::StoreFailure(other.into()),
            Err(other) => ApiError::StoreFailure(other),
        })?;
    Ok(GroupView::from(created))
}

pub async fn get_group(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<GroupView> {
    caller.may_act_on_group(store, id).await?;
    let group = store.get_group(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(GroupView::from(group))
}

pub async fn update_group(store: &Store, caller: &AuthUser, id: Uuid, meta: UpdateGroupMetadata) -> ApiResult<()> {
    caller.may_act_on_group(store, id).await?;
    let patch = GroupPatch {
        email: meta.email,
        phone: meta.phone,
        field_of_science: meta.science_field,
        description: meta.description,
    };
    store.update_group(id, patch).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    Ok(())
}

pub async fn list_groups(store: &Store) -> ApiResult<Vec<meridian_store::entities::Summary>> {
    store.list_groups().await.map_err(ApiError::StoreFailure)
}

pub async fn list_group_members(store: &Store, caller: &AuthUser, group: Uuid) -> ApiResult<Vec<Uuid>> {
    caller.may_act_on_group(store, group).await?;
    store.list_group_members(group).await.map_err(ApiError::StoreFailure)
}

/// Group cascade delete (§4.5.3): remove the record first so new references
/// cannot accumulate, tear down everything it owns with bounded
/// concurrency (every owned instance and secret, plus a best-effort
/// namespace deletion on every cluster the group is known to have touched),
/// then recurse into owned clusters. Takes `Arc<Store>` rather than
/// `&Store` because the fan-out tasks it dispatches must outlive this
/// call's stack frame.
pub async fn delete_group(store: Arc<Store>, caller: &AuthUser, id: Uuid, max_concurrency: usize) -> ApiResult<()> {
    caller.may_act_on_group(&store, id).await?;

    let group = store.get_group(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    store.delete_group(id).await.map_err(ApiError::StoreFailure)?;

    let mut owned_instances = Vec::new();
    for summary in store.list_instances(Some(id)).await.map_err(ApiError::StoreFailure)? {
        if let Some(instance) = store.get_instance(summary.id).await.map_err(ApiError::StoreFailure)? {
            owned_instances.push(instance);
        }
    }
    let mut owned_secrets = Vec::new();
    for summary in store.list_secrets(Some(id)).await.map_err(ApiError::StoreFailure)? {
        if let Some(secret) = store.get_secret(summary.id).await.map_err(ApiError::StoreFailure)? {
            owned_secrets.push(secret);
        }
    }

    let owned_clusters = store.list_clusters_owned_by(id).await.map_err(ApiError::StoreFailure)?;
    let known_clusters: HashSet<Uuid> = owned_instances
        .iter()
        .map(|i| i.cluster)
        .chain(owned_secrets.iter().map(|s| s.cluster))
        .chain(owned_clusters.iter().copied())
        .collect();

    let namespace = group_namespace(&group.name);
    let mut tasks: Vec<CascadeTask<()>> = Vec::new();
    for instance in owned_instances {
        let store = store.clone();
        tasks.push(Box::pin(async move { instances::teardown(&store, &instance, true).await.map(|_| ()) }));
    }
    for secret in owned_secrets {
        let store = store.clone();
        tasks.push(Box::pin(async move { secrets::teardown(&store, &secret).await }));
    }
    for cluster in known_clusters {
        let store = store.clone();
        let namespace = namespace.clone();
        tasks.push(Box::pin(async move {
            let kubeconfig = store.kubeconfig_handle(cluster).await?;
            kube::kubectl_delete_namespace(&kubeconfig, &namespace).await
        }));
    }

    let results = cascade::fan_out(max_concurrency, tasks).await;
    for result in &results {
        if let Err(err) = result {
            tracing::warn!(group = %id, %err, "cascade delete step failed");
        }
    }

    for cluster_id in owned_clusters {
        let Some(cluster) = store.get_cluster(cluster_id).await.map_err(ApiError::StoreFailure)? else {
            continue;
        };
        if let Err(err) = clusters::teardown(&store, cluster, max_concurrency).await {
            tracing::warn!(cluster = %cluster_id, %err, "failed to delete cluster owned by deleted group");
        }
    }

    Ok(())
}
