//! Application catalog browsing and install (§4.5.1, §4.5.5, §9 resolved
//! open question on catalog search).

use std::io::Write as _;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use meridian_store::Store;
use meridian_store::entities::{ApplicationInstance, group_namespace};
use meridian_store::kubeconfig::FileHandle;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::kube::{self, Repository};
use crate::models::{ApplicationView, InstallApplicationRequest, InstanceView};

const MAX_INSTANCE_NAME_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub chart_version: String,
    pub app_version: String,
    pub description: String,
}

impl From<Application> for ApplicationView {
    fn from(a: Application) -> Self {
        Self {
            name: a.name,
            chart_version: a.chart_version,
            app_version: a.app_version,
            description: a.description,
        }
    }
}

fn parse_search_line(repo: Repository, line: &str) -> Option<Application> {
    let mut cols = line.split('\t').map(str::trim);
    let raw_name = cols.next()?;
    let chart_version = cols.next().unwrap_or_default().to_string();
    let app_version = cols.next().unwrap_or_default().to_string();
    let description = cols.next().unwrap_or_default().to_string();
    let name = raw_name.strip_prefix(&format!("{}/", repo.helm_name()))?.to_string();
    Some(Application { name, chart_version, app_version, description })
}

/// `GET /apps[?dev][&test]` (§6). `helm search <repo>/` lists everything in
/// the selected catalog.
pub async fn list_applications(repo: Repository) -> ApiResult<Vec<Application>> {
    let out = kube::helm_search(repo).await.map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() {
        return Err(ApiError::UpstreamFailure(out.first_error_line().unwrap_or("helm search failed").to_string()));
    }
    Ok(out.stdout.lines().skip(1).filter_map(|l| parse_search_line(repo, l)).collect())
}

/// Substring search followed by a mandatory exact-match filter (§9 resolved
/// open question): `helm search` itself matches on substrings, so a
/// shared-prefix false positive must never survive this step.
async fn resolve_application(repo: Repository, name: &str) -> ApiResult<Application> {
    let out = kube::helm_search_one(repo, name).await.map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() {
        return Err(ApiError::NotFound);
    }
    out.stdout
        .lines()
        .skip(1)
        .filter_map(|l| parse_search_line(repo, l))
        .find(|a| a.name == name)
        .ok_or(ApiError::NotFound)
}

/// `GET /apps/{name}` — the chart's default values, used both as a response
/// body and as the fallback source for an instance tag.
pub async fn inspect_application(repo: Repository, name: &str) -> ApiResult<String> {
    resolve_application(repo, name).await?;
    let out = kube::helm_inspect_values(repo, name).await.map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
    if !out.success() || out.stdout.contains("Error") {
        return Err(ApiError::NotFound);
    }
    Ok(out.stdout)
}

/// Scans every document in a multi-document YAML blob for a top-level
/// `Instance` scalar key (§4.5.1 step 2).
fn extract_instance_tag(yaml: &str) -> ApiResult<Option<String>> {
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| ApiError::BadRequest(format!("invalid configuration YAML: {e}")))?;
        if let serde_yaml::Value::Mapping(map) = value
            && let Some(v) = map.get(serde_yaml::Value::String("Instance".to_string()))
            && let Some(s) = v.as_str()
        {
            return Ok(Some(s.to_string()));
        }
    }
    Ok(None)
}

fn validate_tag(tag: &str) -> ApiResult<()> {
    let is_dns_safe = !tag.is_empty() && tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !is_dns_safe || tag.ends_with('-') {
        return Err(ApiError::BadRequest("instance tag must be lowercase alphanumerics and '-', and must not end in '-'".to_string()));
    }
    Ok(())
}

/// Strips comment lines and trailing whitespace; not a full YAML
/// normalization, just enough to avoid storing byte-identical noise across
/// otherwise-identical installs.
fn canonicalize_config(raw: &str) -> String {
    raw.lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn rollback_failed_install(store: &Store, kubeconfig: &FileHandle, release: &str, instance_id: Uuid) {
    if let Err(err) = store.delete_instance(instance_id).await {
        tracing::warn!(%err, "failed to remove instance record after failed install");
    }
    if let Err(err) = kube::helm_delete_purge(kubeconfig, release).await {
        tracing::warn!(%err, "failed to clean up partially installed release after failed install");
    }
}

/// `POST /apps/{name}` (§4.5.1): the full install flow, store-then-helm with
/// rollback on any Kubernetes/Helm failure.
pub async fn install_application(
    store: &Store,
    caller: &AuthUser,
    repo: Repository,
    app_name: &str,
    req: InstallApplicationRequest,
) -> ApiResult<InstanceView> {
    if app_name.contains('\'') {
        return Err(ApiError::BadRequest("application name must not contain a quote".to_string()));
    }
    let application = resolve_application(repo, app_name).await?;

    let group = store
        .get_group_by_name(&req.group)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or_else(|| ApiError::BadRequest("unknown group".to_string()))?;
    let cluster = store
        .get_cluster_by_name(&req.cluster)
        .await
        .map_err(ApiError::StoreFailure)?
        .ok_or_else(|| ApiError::BadRequest("unknown cluster".to_string()))?;
    caller.may_install_on_cluster(store, group.id, cluster.id, &application.name).await?;

    let tag = match extract_instance_tag(&req.configuration)? {
        Some(tag) => tag,
        None => {
            let defaults = kube::helm_inspect_values(repo, &application.name)
                .await
                .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;
            extract_instance_tag(&defaults.stdout)?.ok_or_else(|| ApiError::BadRequest("could not determine an instance tag".to_string()))?
        }
    };
    validate_tag(&tag)?;

    let name = format!("{}-{}-{}", group.name, application.name, tag);
    if name.len() > MAX_INSTANCE_NAME_LEN {
        return Err(ApiError::BadRequest(format!("instance name '{name}' exceeds {MAX_INSTANCE_NAME_LEN} characters")));
    }
    if store.get_instance_by_name(&name).await.map_err(ApiError::StoreFailure)?.is_some() {
        return Err(ApiError::Conflict(format!("an instance named '{name}' already exists")));
    }

    let namespace = group_namespace(&group.name);
    let kubeconfig = store.kubeconfig_handle(cluster.id).await.map_err(ApiError::StoreFailure)?;
    kube::kubectl_ensure_namespace(&kubeconfig, &namespace)
        .await
        .map_err(|e| ApiError::UpstreamFailure(e.to_string()))?;

    let instance = ApplicationInstance {
        id: Uuid::new_v4(),
        name: name.clone(),
        application: application.name.clone(),
        owning_group: group.id,
        cluster: cluster.id,
        created_at: Utc::now().timestamp(),
        config: canonicalize_config(&req.configuration),
    };
    let created = store
        .create_instance(instance)
        .await
        .map_err(|e| match e.downcast::<meridian_store::BackendError>() {
            Ok(meridian_store::BackendError::NameConflict) => ApiError::Conflict(format!("an instance named '{name}' already exists")),
            Ok(other) => ApiError::StoreFailure(other.into()),
            Err(other) => ApiError::StoreFailure(other),
        })?;

    let mut values_file = tempfile::NamedTempFile::new().map_err(|e| ApiError::UpstreamFailure(format!("failed to stage values file: {e}")))?;
    if let Err(e) = values_file.write_all(req.configuration.as_bytes()) {
        rollback_failed_install(store, &kubeconfig, &name, created.id).await;
        return Err(ApiError::UpstreamFailure(format!("failed to stage values file: {e}")));
    }

    match kube::helm_install(&kubeconfig, repo, &application.name, &name, &namespace, values_file.path()).await {
        Ok(out) if out.success() && out.stdout.contains("STATUS: DEPLOYED") => Ok(InstanceView::from(created)),
        Ok(out) => {
            let message = out.first_error_line().unwrap_or("helm install failed").to_string();
            rollback_failed_install(store, &kubeconfig, &name, created.id).await;
            Err(ApiError::UpstreamFailure(message))
        }
        Err(err) => {
            rollback_failed_install(store, &kubeconfig, &name, created.id).await;
            Err(ApiError::UpstreamFailure(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_search_row() {
        let app = parse_search_line(Repository::Main, "slate/nginx\t1.2.3\t1.19\tweb server").unwrap();
        assert_eq!(app.name, "nginx");
        assert_eq!(app.chart_version, "1.2.3");
        assert_eq!(app.app_version, "1.19");
        assert_eq!(app.description, "web server");
    }

    #[test]
    fn rejects_a_row_from_a_different_repo() {
        assert!(parse_search_line(Repository::Main, "slate-dev/nginx\t1.2.3\t1.19\tweb server").is_none());
    }

    #[test]
    fn extracts_the_instance_tag_from_any_document_in_a_multi_doc_config() {
        let yaml = "replicas: 2\n---\nInstance: web\nimage: nginx\n";
        assert_eq!(extract_instance_tag(yaml).unwrap(), Some("web".to_string()));
    }

    #[test]
    fn absent_instance_tag_is_none_not_an_error() {
        assert_eq!(extract_instance_tag("replicas: 2\n").unwrap(), None);
    }

    #[test]
    fn validate_tag_rejects_trailing_dash() {
        assert!(validate_tag("web-").is_err());
    }

    #[test]
    fn validate_tag_rejects_uppercase() {
        assert!(validate_tag("Web").is_err());
    }

    #[test]
    fn validate_tag_accepts_lowercase_alnum_and_dash() {
        assert!(validate_tag("web-01").is_ok());
    }

    #[test]
    fn canonicalize_strips_comments_and_trailing_whitespace() {
        let raw = "replicas: 2   \n# a comment\nimage: nginx\n";
        assert_eq!(canonicalize_config(raw), "replicas: 2\nimage: nginx");
    }
}
