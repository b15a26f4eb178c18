//! Secret create/copy/delete/list (§4.5.4, §4.5.5).

use std::collections::BTreeMap;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use meridian_store::Store;
use meridian_store::entities::{Secret, Summary, group_namespace};

use crate::auth::AuthUser;
use crate::crypto;
use crate::error::{ApiError, ApiResult};
use crate::kube;
use crate::models::{CreateSecretMetadata, SecretView};

const MAX_KEY_NAME_LEN: usize = 253;

fn validate_key_name(key: &str) -> ApiResult<()> {
    let ok = !key.is_empty() && key.len() <= MAX_KEY_NAME_LEN && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !ok {
        return Err(ApiError::BadRequest(format!("secret key '{key}' is not a valid Kubernetes data key")));
    }
    Ok(())
}

#[derive(Serialize)]
struct SecretManifest {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    #[serde(rename = "type")]
    secret_type: &'static str,
    metadata: SecretManifestMetadata,
    data: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SecretManifestMetadata {
    name: String,
    namespace: String,
}

fn build_manifest(name: &str, namespace: &str, contents: &BTreeMap<String, String>) -> ApiResult<String> {
    let data = contents.iter().map(|(k, v)| (k.clone(), BASE64.encode(v.as_bytes()))).collect();
    let manifest = SecretManifest {
        api_version: "v1",
        kind: "Secret",
        secret_type: "Opaque",
        metadata: SecretManifestMetadata { name: name.to_string(), namespace: namespace.to_string() },
        data,
    };
    serde_yaml::to_string(&manifest).map_err(|e| ApiError::StoreFailure(anyhow::anyhow!(e)))
}

async fn resolve_destination(store: &Store, caller: &AuthUser, meta: &CreateSecretMetadata) -> ApiResult<(meridian_store::entities::Group, meridian_store::entities::Cluster)> {
    let group = store
        .get_group_by_name(&meta.group)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or_else(|| ApiError::BadRequest("unknown group".to_string()))?;
    caller.may_act_on_group(store, group.id).await?;
    let cluster = store
        .get_cluster_by_name(&meta.cluster)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or_else(|| ApiError::BadRequest("unknown cluster".to_string()))?;
    Ok((group, cluster))
}

async fn install_and_record(
    store: &Store,
    password: &str,
    name: &str,
    group_id: Uuid,
    cluster_id: Uuid,
    namespace: &str,
    manifest: &str,
    plaintext: &[u8],
) -> ApiResult<SecretView> {
    let ciphertext = crypto::seal(plaintext, password).map_err(ApiError::StoreFailure)?;
    let secret = Secret {
        id: Uuid::new_v4(),
        name: name.to_string(),
        owning_group: group_id,
        cluster: cluster_id,
        created_at: Utc::now().timestamp(),
        ciphertext,
    };
    let created = store
        .create_secret(secret)
        .await
        .map_err(|e| match e.downcast::<meridian_store::BackendError>() {
            Ok(meridian_store::BackendError::NameConflict) => ApiError::Conflict(format!("a secret named '{name}' already exists")),
            Ok(other) => ApiError::StoreFailure(other.into()),
            Err(other) => ApiError::StoreFailure(other),
        })?;

    let kubeconfig = store.kubeconfig_handle(cluster_id).await.map_err(ApiError::StoreFailure)?;
    match kube::kubectl_apply(&kubeconfig, manifest).await {
        Ok(out) if out.success() => Ok(SecretView::from(created)),
        Ok(out) => {
            let message = out.first_error_line().unwrap_or("kubectl apply failed").to_string();
            if let Err(err) = store.delete_secret(created.id).await {
                tracing::warn!(%err, "failed to remove secret record after failed kubectl apply");
            }
            Err(ApiError::UpstreamFailure(message))
        }
        Err(err) => {
            if let Err(err) = store.delete_secret(created.id).await {
                tracing::warn!(%err, "failed to remove secret record after failed kubectl apply");
            }
            Err(ApiError::UpstreamFailure(err.to_string()))
        }
    }
}

/// `POST /secrets` (§4.5.4): validate key names, seal the contents map,
/// install the resulting Kubernetes `Secret`, and roll the store record back
/// if `kubectl` fails so "stored ⇒ installed" never breaks.
pub async fn create_secret(
    store: &Store,
    caller: &AuthUser,
    password: &str,
    meta: CreateSecretMetadata,
    contents: BTreeMap<String, String>,
) -> ApiResult<SecretView> {
    for key in contents.keys() {
        validate_key_name(key)?;
    }
    let (group, cluster) = resolve_destination(store, caller, &meta).await?;
    let namespace = group_namespace(&group.name);
    let manifest = build_manifest(&meta.name, &namespace, &contents)?;
    let plaintext = serde_json::to_vec(&contents).map_err(|e| ApiError::StoreFailure(anyhow::anyhow!(e)))?;
    install_and_record(store, password, &meta.name, group.id, cluster.id, &namespace, &manifest, &plaintext).await
}

/// `POST /secrets/{id}/copy`: re-decrypts the source contents and installs
/// them under a (possibly different) name/group/cluster, reusing the
/// existing ciphertext bytes rather than re-encrypting.
pub async fn copy_secret(store: &Store, caller: &AuthUser, password: &str, source_id: Uuid, meta: CreateSecretMetadata) -> ApiResult<SecretView> {
    let source = store.get_secret(source_id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    caller.may_act_on_owning_group(store, source.owning_group).await?;

    let plaintext = crypto::open(&source.ciphertext, password).map_err(ApiError::StoreFailure)?;
    let contents: BTreeMap<String, String> = serde_json::from_slice(&plaintext).map_err(|e| ApiError::StoreFailure(anyhow::anyhow!(e)))?;

    let (group, cluster) = resolve_destination(store, caller, &meta).await?;
    let namespace = group_namespace(&group.name);
    let manifest = build_manifest(&meta.name, &namespace, &contents)?;
    install_and_record(store, password, &meta.name, group.id, cluster.id, &namespace, &manifest, &plaintext).await
}

pub async fn get_secret(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<SecretView> {
    let secret = store.get_secret(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    caller.may_act_on_owning_group(store, secret.owning_group).await?;
    Ok(SecretView::from(secret))
}

pub async fn list_secrets(store: &Store, caller: &AuthUser, group: Option<Uuid>) -> ApiResult<Vec<Summary>> {
    match group {
        Some(g) => {
            caller.may_act_on_group(store, g).await?;
            store.list_secrets(Some(g)).await.map_err(ApiError::StoreFailure)
        }
        None => {
            caller.require_admin()?;
            store.list_secrets(None).await.map_err(ApiError::StoreFailure)
        }
    }
}

/// Best-effort secret teardown used by group/cluster cascade delete: removes
/// the Kubernetes object if it can, always removes the store record. There
/// is no caller to authorize against here; the group/cluster record is
/// already gone by the time cascade reaches its children.
pub async fn teardown(store: &Store, secret: &Secret) -> Result<()> {
    if let Some(group) = store.get_group(secret.owning_group).await?
        && let Ok(kubeconfig) = store.kubeconfig_handle(secret.cluster).await
    {
        let namespace = group_namespace(&group.name);
        if let Err(err) = kube::kubectl_delete_secret(&kubeconfig, &namespace, &secret.name).await {
            tracing::warn!(%err, secret = %secret.id, "failed to delete underlying kubernetes secret during cascade");
        }
    }
    store.delete_secret(secret.id).await?;
    Ok(())
}

pub async fn delete_secret(store: &Store, caller: &AuthUser, id: Uuid) -> ApiResult<()> {
    let secret = store.get_secret(id).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    caller.may_act_on_owning_group(store, secret.owning_group).await?;

    let group = store.get_group(secret.owning_group).await.map_err(ApiError::StoreFailure)?.ok_or(ApiError::NotFound)?;
    let namespace = group_namespace(&group.name);
    let kubeconfig = store.kubeconfig_handle(secret.cluster).await.map_err(ApiError::StoreFailure)?;
    kube::kubectl_delete_secret(&kubeconfig, &namespace, &secret.name)
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;

    store.delete_secret(id).await.map_err(ApiError::StoreFailure)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_key_name_rejects_slashes() {
        assert!(validate_key_name("a/b").is_err());
    }

    #[test]
    fn validate_key_name_accepts_dns_label_alphabet() {
        assert!(validate_key_name("tls.crt").is_ok());
        assert!(validate_key_name("DB_PASSWORD-1").is_ok());
    }

    #[test]
    fn manifest_base64_encodes_values() {
        let mut contents = BTreeMap::new();
        contents.insert("password".to_string(), "hunter2".to_string());
        let manifest = build_manifest("db-creds", "slate-group-g1", &contents).unwrap();
        assert!(manifest.contains("aHVudGVyMg==")); // base64("hunter2")
        assert!(manifest.contains("name: db-creds"));
        assert!(manifest.contains("namespace: slate-group-g1"));
    }
}
