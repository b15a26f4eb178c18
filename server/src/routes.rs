//! HTTP routing (§6): the public surface is versioned under `/v1alpha3/…`,
//! with the prior `/v1alpha1/…` prefix mounted alongside it for callers that
//! have not migrated. Handlers are thin translations between axum
//! extractors and the executor functions in [`crate::executors`]; all
//! authorization and business logic lives there, not here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use meridian_store::entities::Summary;

use crate::app::App;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::executors::{apps, clusters, groups, instances, secrets, users};
use crate::kube::Repository;
use crate::models::*;

pub fn build_router(app: App) -> Router {
    let api = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/groups", get(list_user_groups))
        .route("/users/{id}/groups/{gid}", put(add_user_to_group))
        .route("/find_user", get(find_user_by_globus_id))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", get(get_group).put(update_group).delete(delete_group))
        .route("/groups/{id}/members", get(list_group_members))
        .route("/clusters", get(list_clusters).post(create_cluster))
        .route("/clusters/{id}", put(update_cluster).delete(delete_cluster))
        .route(
            "/clusters/{id}/allowed_groups/{gid}",
            get(list_cluster_allowed_groups).put(grant_cluster_access).delete(revoke_cluster_access),
        )
        .route(
            "/clusters/{id}/allowed_groups/{gid}/applications/{app}",
            get(list_cluster_group_apps).put(grant_app).delete(revoke_app),
        )
        .route("/apps", get(list_applications))
        .route("/apps/{name}", get(inspect_application).post(install_application))
        .route("/instances", get(list_instances))
        .route("/instances/{id}", get(get_instance).delete(delete_instance))
        .route("/instances/{id}/logs", get(instance_logs))
        .route("/instances/{id}/scale", put(scale_instance))
        .route("/instances/{id}/restart", put(restart_instance))
        .route("/secrets", get(list_secrets).post(create_secret))
        .route("/secrets/{id}", get(get_secret).delete(delete_secret))
        .route("/secrets/{id}/copy", post(copy_secret))
        .with_state(app);

    Router::new()
        .nest("/v1alpha3", api.clone())
        .nest("/v1alpha1", api)
}

fn summary_envelope(kind: &'static str, items: Vec<Summary>) -> impl IntoResponse {
    Json(summary_items(kind, items))
}

// ---- users ----

async fn list_users(State(app): State<App>, caller: AuthUser) -> ApiResult<impl IntoResponse> {
    let items = users::list_users(&app.store, &caller).await?;
    Ok(summary_envelope("User", items))
}

async fn create_user(State(app): State<App>, caller: AuthUser, Json(req): Json<CreateUserRequest>) -> ApiResult<impl IntoResponse> {
    let view = users::create_user(&app.store, &caller, req.metadata).await?;
    Ok(Json(Envelope::new("User", view)))
}

async fn get_user(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("User_", &id)?;
    let view = users::get_user(&app.store, &caller, id).await?;
    Ok(Json(Envelope::new("User", view)))
}

async fn update_user(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("User_", &id)?;
    users::update_user(&app.store, &caller, id, req.metadata).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn delete_user(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("User_", &id)?;
    users::delete_user(&app.store, &caller, id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn list_user_groups(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("User_", &id)?;
    let groups = users::list_user_groups(&app.store, &caller, id).await?;
    Ok(Json(groups.into_iter().map(|g| format!("Group_{g}")).collect::<Vec<_>>()))
}

async fn add_user_to_group(
    State(app): State<App>,
    caller: AuthUser,
    Path((_uid, gid)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let group = parse_id("Group_", &gid)?;
    let user = parse_id("User_", &_uid)?;
    users::add_user_to_group(&app.store, &caller, group, user).await?;
    Ok(axum::http::StatusCode::OK)
}

#[derive(Deserialize)]
struct FindUserQuery {
    globus_id: String,
}

async fn find_user_by_globus_id(State(app): State<App>, caller: AuthUser, Query(q): Query<FindUserQuery>) -> ApiResult<impl IntoResponse> {
    let view = users::find_user_by_globus_id(&app.store, &caller, &q.globus_id).await?;
    Ok(Json(Envelope::new("User", view)))
}

fn parse_id(prefix: &str, raw: &str) -> ApiResult<Uuid> {
    parse_entity_id(prefix, raw).ok_or_else(|| ApiError::BadRequest(format!("malformed id: {raw}")))
}

// ---- groups ----

async fn list_groups(State(app): State<App>, _caller: AuthUser) -> ApiResult<impl IntoResponse> {
    let items = groups::list_groups(&app.store).await?;
    Ok(summary_envelope("Group", items))
}

async fn create_group(State(app): State<App>, _caller: AuthUser, Json(req): Json<CreateGroupRequest>) -> ApiResult<impl IntoResponse> {
    let view = groups::create_group(&app.store, req.metadata).await?;
    Ok(Json(Envelope::new("Group", view)))
}

async fn get_group(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Group_", &id)?;
    let view = groups::get_group(&app.store, &caller, id).await?;
    Ok(Json(Envelope::new("Group", view)))
}

async fn update_group(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Group_", &id)?;
    groups::update_group(&app.store, &caller, id, req.metadata).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn delete_group(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Group_", &id)?;
    groups::delete_group(Arc::clone(&app.store), &caller, id, app.cascade_max_concurrency).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn list_group_members(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Group_", &id)?;
    let members = groups::list_group_members(&app.store, &caller, id).await?;
    Ok(Json(members.into_iter().map(|u| format!("User_{u}")).collect::<Vec<_>>()))
}

// ---- clusters ----

async fn list_clusters(State(app): State<App>, _caller: AuthUser) -> ApiResult<impl IntoResponse> {
    let items = clusters::list_clusters(&app.store).await?;
    Ok(summary_envelope("Cluster", items))
}

async fn create_cluster(State(app): State<App>, caller: AuthUser, Json(req): Json<CreateClusterRequest>) -> ApiResult<impl IntoResponse> {
    let view = clusters::create_cluster(&app.store, &caller, req.metadata).await?;
    Ok(Json(Envelope::new("Cluster", view)))
}

async fn update_cluster(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateClusterRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    clusters::update_cluster(&app.store, &caller, id, req.metadata).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn delete_cluster(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    clusters::delete_cluster(Arc::clone(&app.store), &caller, id, app.cascade_max_concurrency).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn list_cluster_allowed_groups(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, _gid)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let groups = clusters::list_cluster_allowed_groups(&app.store, &caller, id).await?;
    Ok(Json(groups.into_iter().map(|g| format!("Group_{g}")).collect::<Vec<_>>()))
}

async fn grant_cluster_access(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, gid)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let gid = parse_id("Group_", &gid)?;
    clusters::grant_cluster_access(&app.store, &caller, id, gid).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn revoke_cluster_access(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, gid)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let gid = parse_id("Group_", &gid)?;
    clusters::revoke_cluster_access(&app.store, &caller, id, gid).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn list_cluster_group_apps(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, gid, _app)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let gid = parse_id("Group_", &gid)?;
    let apps = clusters::list_cluster_group_apps(&app.store, &caller, id, gid).await?;
    Ok(Json(apps))
}

async fn grant_app(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, gid, name)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let gid = parse_id("Group_", &gid)?;
    clusters::grant_app(&app.store, &caller, id, gid, &name).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn revoke_app(
    State(app): State<App>,
    caller: AuthUser,
    Path((id, gid, name)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Cluster_", &id)?;
    let gid = parse_id("Group_", &gid)?;
    clusters::revoke_app(&app.store, &caller, id, gid, &name).await?;
    Ok(axum::http::StatusCode::OK)
}

// ---- application catalog ----

async fn list_applications(_caller: AuthUser, Query(q): Query<AppRepoQuery>) -> ApiResult<impl IntoResponse> {
    let repo = Repository::from_query(q.dev, q.test);
    let items: Vec<ApplicationView> = apps::list_applications(repo).await?.into_iter().map(ApplicationView::from).collect();
    Ok(Json(ListEnvelope::new(items)))
}

async fn inspect_application(_caller: AuthUser, Path(name): Path<String>, Query(q): Query<AppRepoQuery>) -> ApiResult<impl IntoResponse> {
    let repo = Repository::from_query(q.dev, q.test);
    let values = apps::inspect_application(repo, &name).await?;
    Ok(values)
}

async fn install_application(
    State(app): State<App>,
    caller: AuthUser,
    Path(name): Path<String>,
    Query(q): Query<AppRepoQuery>,
    Json(req): Json<InstallApplicationRequest>,
) -> ApiResult<impl IntoResponse> {
    let repo = Repository::from_query(q.dev, q.test);
    let view = apps::install_application(&app.store, &caller, repo, &name, req).await?;
    Ok(Json(Envelope::new("Instance", view)))
}

// ---- instances ----

async fn list_instances(State(app): State<App>, _caller: AuthUser, Query(q): Query<InstanceListQuery>) -> ApiResult<impl IntoResponse> {
    let group = q.group.as_deref().map(|g| parse_id("Group_", g)).transpose()?;
    let items = instances::list_instances(&app.store, group).await?;
    Ok(summary_envelope("Instance", items))
}

async fn get_instance(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Instance_", &id)?;
    let view = instances::get_instance(&app.store, &caller, id).await?;
    Ok(Json(Envelope::new("Instance", view)))
}

async fn delete_instance(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Query(q): Query<DeleteInstanceQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Instance_", &id)?;
    instances::delete_instance(&app.store, &caller, id, q.force).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn instance_logs(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Query(q): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Instance_", &id)?;
    let logs = instances::logs(&app.store, &caller, id, q.max_lines, q.container.as_deref(), q.previous).await?;
    Ok(logs)
}

async fn scale_instance(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Instance_", &id)?;
    instances::scale(&app.store, &caller, id, &req.deployment, req.replicas).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn restart_instance(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<RestartRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Instance_", &id)?;
    instances::restart(&app.store, &caller, id, &req.deployment).await?;
    Ok(axum::http::StatusCode::OK)
}

// ---- secrets ----

async fn list_secrets(State(app): State<App>, caller: AuthUser, Query(q): Query<SecretListQuery>) -> ApiResult<impl IntoResponse> {
    let group = q.group.as_deref().map(|g| parse_id("Group_", g)).transpose()?;
    let items = secrets::list_secrets(&app.store, &caller, group).await?;
    Ok(summary_envelope("Secret", items))
}

async fn create_secret(State(app): State<App>, caller: AuthUser, Json(req): Json<CreateSecretRequest>) -> ApiResult<impl IntoResponse> {
    let view = secrets::create_secret(&app.store, &caller, &app.secret_encryption_password, req.metadata, req.contents).await?;
    Ok(Json(Envelope::new("Secret", view)))
}

async fn get_secret(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Secret_", &id)?;
    let view = secrets::get_secret(&app.store, &caller, id).await?;
    Ok(Json(Envelope::new("Secret", view)))
}

async fn delete_secret(State(app): State<App>, caller: AuthUser, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Secret_", &id)?;
    secrets::delete_secret(&app.store, &caller, id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn copy_secret(
    State(app): State<App>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CopySecretRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id("Secret_", &id)?;
    let view = secrets::copy_secret(&app.store, &caller, &app.secret_encryption_password, id, req.metadata).await?;
    Ok(Json(Envelope::new("Secret", view)))
}
