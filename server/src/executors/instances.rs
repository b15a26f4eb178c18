//! Application instance inspect/list/logs/scale/restart/delete (§4.5.2,
//! §4.5.5).

use anyhow::{Result, bail};
use uuid::Uuid;

use meridian_store::Store;
use meridian_store::entities::{ApplicationInstance, Summary, group_namespace};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::kube;
use crate::models::InstanceView;

async fn fetch(store: &Store, id: Uuid) -> ApiResult<ApplicationInstance> {
    store.get_instance(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)
}

pub async fn get_instance(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<InstanceView> {
    let instance = fetch(store, id).await?;
    caller.may_act_on_owning_group(store, instance.owning_group).await?;
    Ok(InstanceView::from(instance))
}

/// Any authenticated user may list instances; `group` only narrows the view
/// and carries no extra authorization requirement of its own.
pub async fn list_instances(store: &Store, group: Option<Uuid>) -> ApiResult<Vec<Summary>> {
    store.list_instances(group).await.map_err(ApiError::StoreFailure)
}

/// Idempotent instance delete (§4.5.2). Success is read from the `helm`
/// output, not just its exit code, so "already gone" counts as success. When
/// `force` is set, a Kubernetes/Helm failure still removes the store record;
/// `Ok(Some(message))` carries that failure as informational context rather
/// than failing the call. Used directly (with `force = true`) by group/
/// cluster cascade delete, where there is no caller to authorize against.
pub async fn teardown(store: &Store, instance: &ApplicationInstance, force: bool) -> Result<Option<String>> {
    let kubeconfig = store.kubeconfig_handle(instance.cluster).await?;
    let outcome = kube::helm_delete_purge(&kubeconfig, &instance.name).await;

    let helm_succeeded = matches!(&outcome, Ok(out) if kube::helm_delete_succeeded(&instance.name, out));

    if helm_succeeded || force {
        store.delete_instance(instance.id).await?;
        if helm_succeeded {
            return Ok(None);
        }
        let message = match outcome {
            Ok(out) => out.first_error_line().unwrap_or("helm delete failed").to_string(),
            Err(err) => err.to_string(),
        };
        return Ok(Some(message));
    }

    let message = match outcome {
        Ok(out) => out.first_error_line().unwrap_or("helm delete failed").to_string(),
        Err(err) => err.to_string(),
    };
    bail!(message)
}

pub async fn delete_instance(store: &Store, caller: &AuthUser, id: Uuid, force: bool) -> ApiResult<Option<String>> {
    let instance = fetch(store, id).await?;
    caller.may_act_on_owning_group(store, instance.owning_group).await?;
    teardown(store, &instance, force).await.map_err(|e| ApiError::UpstreamFailure(e.to_string()))
}

pub async fn logs(
    store: &Store,
    caller: &AuthUser,
    id: Uuid,
    max_lines: Option<u32>,
    container: Option<&str>,
    previous: bool,
) -> ApiResult<String> {
    let instance = fetch(store, id).await?;
    caller.may_act_on_owning_group(store, instance.owning_group).await?;

    let kubeconfig = store.kubeconfig_handle(instance.cluster).await.map_err(ApiError::StoreFailure)?;
    let namespace = namespace_of(store, &instance).await?;
    let out = kube::kubectl_logs(&kubeconfig, &namespace, &instance.name, container, max_lines, previous)
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() {
        return Err(ApiError::UpstreamFailure(out.first_error_line().unwrap_or("kubectl logs failed").to_string()));
    }
    Ok(out.stdout)
}

pub async fn scale(store: &Store, caller: &AuthUser, id: Uuid, deployment: &str, replicas: u32) -> ApiResult<()> {
    let instance = fetch(store, id).await?;
    caller.may_act_on_owning_group(store, instance.owning_group).await?;

    let kubeconfig = store.kubeconfig_handle(instance.cluster).await.map_err(ApiError::StoreFailure)?;
    let namespace = namespace_of(store, &instance).await?;
    let out = kube::kubectl_scale(&kubeconfig, &namespace, deployment, replicas)
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() {
        return Err(ApiError::UpstreamFailure(out.first_error_line().unwrap_or("kubectl scale failed").to_string()));
    }
    Ok(())
}

pub async fn restart(store: &Store, caller: &AuthUser, id: Uuid, deployment: &str) -> ApiResult<()> {
    let instance = fetch(store, id).await?;
    caller.may_act_on_owning_group(store, instance.owning_group).await?;

    let kubeconfig = store.kubeconfig_handle(instance.cluster).await.map_err(ApiError::StoreFailure)?;
    let namespace = namespace_of(store, &instance).await?;
    let out = kube::kubectl_rollout_restart(&kubeconfig, &namespace, deployment)
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() {
        return Err(ApiError::UpstreamFailure(out.first_error_line().unwrap_or("kubectl rollout restart failed").to_string()));
    }
    Ok(())
}

async fn namespace_of(store: &Store, instance: &meridian_store::entities::ApplicationInstance) -> ApiResult<String> {
    let group = store
        .get_group(instance.owning_group)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or(ApiError::NotFound)?;
    Ok(group_namespace(&group.name))
}
