//! Production backend. Schema and query shape mirror a conventional
//! deadpool-postgres service: explicit `CREATE TABLE IF NOT EXISTS`
//! migrations run at startup, dynamic `SET` clauses for partial updates, and
//! plain two-column join tables for the group/cluster/application relations
//! rather than array columns.

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use postgres_types::Json;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use super::{BackendError, BackendResult, StoreBackend};
use crate::entities::{
    ApplicationInstance, Cluster, ClusterPatch, GeoLocation, Group, GroupPatch, Secret, Summary,
    User, UserPatch,
};

pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await.context("failed to get db connection")?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    phone TEXT,
                    institution TEXT,
                    token TEXT NOT NULL UNIQUE,
                    external_id TEXT UNIQUE,
                    admin BOOLEAN NOT NULL DEFAULT FALSE
                );

                CREATE TABLE IF NOT EXISTS groups (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    email TEXT,
                    phone TEXT,
                    field_of_science TEXT NOT NULL,
                    description TEXT
                );

                CREATE TABLE IF NOT EXISTS clusters (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    owning_group UUID NOT NULL REFERENCES groups(id) ON DELETE RESTRICT,
                    organization TEXT NOT NULL,
                    kubeconfig TEXT NOT NULL,
                    system_namespace TEXT NOT NULL,
                    locations JSONB NOT NULL DEFAULT '[]'
                );

                CREATE TABLE IF NOT EXISTS application_instances (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    application TEXT NOT NULL,
                    owning_group UUID NOT NULL REFERENCES groups(id) ON DELETE RESTRICT,
                    cluster UUID NOT NULL REFERENCES clusters(id) ON DELETE RESTRICT,
                    created_at BIGINT NOT NULL,
                    config TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS secrets (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    owning_group UUID NOT NULL REFERENCES groups(id) ON DELETE RESTRICT,
                    cluster UUID NOT NULL REFERENCES clusters(id) ON DELETE RESTRICT,
                    created_at BIGINT NOT NULL,
                    ciphertext BYTEA NOT NULL
                );

                CREATE TABLE IF NOT EXISTS group_members (
                    group_id UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    PRIMARY KEY (group_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS cluster_access (
                    cluster_id UUID NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
                    group_id UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    PRIMARY KEY (cluster_id, group_id)
                );

                CREATE TABLE IF NOT EXISTS app_grants (
                    cluster_id UUID NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
                    group_id UUID NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    application TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, group_id, application)
                );
                "#,
            )
            .await
            .context("failed to create schema")?;

        tracing::info!("store schema initialized");
        Ok(())
    }
}

fn row_to_user(row: &tokio_postgres::Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        institution: row.get("institution"),
        token: row.get("token"),
        external_id: row.get("external_id"),
        admin: row.get("admin"),
    }
}

fn row_to_group(row: &tokio_postgres::Row) -> Group {
    Group {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        field_of_science: row.get("field_of_science"),
        description: row.get("description"),
    }
}

fn row_to_cluster(row: &tokio_postgres::Row) -> Cluster {
    let Json(locations): Json<Vec<GeoLocation>> = row.get("locations");
    Cluster {
        id: row.get("id"),
        name: row.get("name"),
        owning_group: row.get("owning_group"),
        organization: row.get("organization"),
        kubeconfig: row.get("kubeconfig"),
        system_namespace: row.get("system_namespace"),
        locations,
    }
}

fn row_to_instance(row: &tokio_postgres::Row) -> ApplicationInstance {
    ApplicationInstance {
        id: row.get("id"),
        name: row.get("name"),
        application: row.get("application"),
        owning_group: row.get("owning_group"),
        cluster: row.get("cluster"),
        created_at: row.get("created_at"),
        config: row.get("config"),
    }
}

fn row_to_secret(row: &tokio_postgres::Row) -> Secret {
    Secret {
        id: row.get("id"),
        name: row.get("name"),
        owning_group: row.get("owning_group"),
        cluster: row.get("cluster"),
        created_at: row.get("created_at"),
        ciphertext: row.get("ciphertext"),
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
}

#[async_trait]
impl StoreBackend for PostgresBackend {
    async fn create_user(&self, user: User) -> BackendResult<User> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_one(
                r#"
                INSERT INTO users (id, name, email, phone, institution, token, external_id, admin)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, name, email, phone, institution, token, external_id, admin
                "#,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.phone,
                    &user.institution,
                    &user.token,
                    &user.external_id,
                    &user.admin,
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BackendError::NameConflict
                } else {
                    BackendError::Failure(e.into())
                }
            })?;
        Ok(row_to_user(&row))
    }

    async fn get_user(&self, id: Uuid) -> BackendResult<Option<User>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, email, phone, institution, token, external_id, admin FROM users WHERE id = $1",
                &[&id],
            )
            .await
            .context("query user")?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_token(&self, token: &str) -> BackendResult<Option<User>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, email, phone, institution, token, external_id, admin FROM users WHERE token = $1",
                &[&token],
            )
            .await
            .context("query user by token")?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> BackendResult<Option<User>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, email, phone, institution, token, external_id, admin FROM users WHERE external_id = $1",
                &[&external_id],
            )
            .await
            .context("query user by external id")?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> BackendResult<Option<User>> {
        let client = self.pool.get().await.context("db connection")?;

        let mut set_clauses = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut idx = 1;

        if let Some(ref v) = patch.name {
            set_clauses.push(format!("name = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.email {
            set_clauses.push(format!("email = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.phone {
            set_clauses.push(format!("phone = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.institution {
            set_clauses.push(format!("institution = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.admin {
            set_clauses.push(format!("admin = ${idx}"));
            params.push(v);
            idx += 1;
        }

        if set_clauses.is_empty() {
            return self.get_user(id).await;
        }

        let query = format!(
            "UPDATE users SET {} WHERE id = ${idx} RETURNING id, name, email, phone, institution, token, external_id, admin",
            set_clauses.join(", ")
        );
        params.push(&id);

        let row = client.query_opt(&query, &params).await.context("update user")?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn delete_user(&self, id: Uuid) -> BackendResult<bool> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .execute("DELETE FROM users WHERE id = $1", &[&id])
            .await
            .context("delete user")?;
        Ok(rows > 0)
    }

    async fn list_users(&self) -> BackendResult<Vec<Summary>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id, name FROM users ORDER BY name ASC", &[])
            .await
            .context("list users")?;
        Ok(rows
            .iter()
            .map(|r| Summary {
                id: r.get("id"),
                name: r.get("name"),
                owning_group: Uuid::nil(),
            })
            .collect())
    }

    async fn create_group(&self, group: Group) -> BackendResult<Group> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_one(
                r#"
                INSERT INTO groups (id, name, email, phone, field_of_science, description)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, name, email, phone, field_of_science, description
                "#,
                &[
                    &group.id,
                    &group.name,
                    &group.email,
                    &group.phone,
                    &group.field_of_science,
                    &group.description,
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BackendError::NameConflict
                } else {
                    BackendError::Failure(e.into())
                }
            })?;
        Ok(row_to_group(&row))
    }

    async fn get_group(&self, id: Uuid) -> BackendResult<Option<Group>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, email, phone, field_of_science, description FROM groups WHERE id = $1",
                &[&id],
            )
            .await
            .context("query group")?;
        Ok(row.as_ref().map(row_to_group))
    }

    async fn get_group_by_name(&self, name: &str) -> BackendResult<Option<Group>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, email, phone, field_of_science, description FROM groups WHERE name = $1",
                &[&name],
            )
            .await
            .context("query group by name")?;
        Ok(row.as_ref().map(row_to_group))
    }

    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> BackendResult<Option<Group>> {
        let client = self.pool.get().await.context("db connection")?;

        let mut set_clauses = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut idx = 1;

        if let Some(ref v) = patch.email {
            set_clauses.push(format!("email = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.phone {
            set_clauses.push(format!("phone = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.field_of_science {
            set_clauses.push(format!("field_of_science = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.description {
            set_clauses.push(format!("description = ${idx}"));
            params.push(v);
            idx += 1;
        }

        if set_clauses.is_empty() {
            return self.get_group(id).await;
        }

        let query = format!(
            "UPDATE groups SET {} WHERE id = ${idx} RETURNING id, name, email, phone, field_of_science, description",
            set_clauses.join(", ")
        );
        params.push(&id);

        let row = client.query_opt(&query, &params).await.context("update group")?;
        Ok(row.as_ref().map(row_to_group))
    }

    async fn delete_group(&self, id: Uuid) -> BackendResult<bool> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .execute("DELETE FROM groups WHERE id = $1", &[&id])
            .await
            .context("delete group")?;
        Ok(rows > 0)
    }

    async fn list_groups(&self) -> BackendResult<Vec<Summary>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id, name FROM groups ORDER BY name ASC", &[])
            .await
            .context("list groups")?;
        Ok(rows
            .iter()
            .map(|r| Summary {
                id: r.get("id"),
                name: r.get("name"),
                owning_group: r.get("id"),
            })
            .collect())
    }

    async fn add_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                &[&group, &user],
            )
            .await
            .context("add group member")?;
        Ok(())
    }

    async fn remove_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "DELETE FROM group_members WHERE group_id = $1 AND user_id = $2",
                &[&group, &user],
            )
            .await
            .context("remove group member")?;
        Ok(())
    }

    async fn list_group_members(&self, group: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT user_id FROM group_members WHERE group_id = $1", &[&group])
            .await
            .context("list group members")?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn list_user_groups(&self, user: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT group_id FROM group_members WHERE user_id = $1", &[&user])
            .await
            .context("list user groups")?;
        Ok(rows.iter().map(|r| r.get("group_id")).collect())
    }

    async fn create_cluster(&self, cluster: Cluster) -> BackendResult<Cluster> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_one(
                r#"
                INSERT INTO clusters (id, name, owning_group, organization, kubeconfig, system_namespace, locations)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, name, owning_group, organization, kubeconfig, system_namespace, locations
                "#,
                &[
                    &cluster.id,
                    &cluster.name,
                    &cluster.owning_group,
                    &cluster.organization,
                    &cluster.kubeconfig,
                    &cluster.system_namespace,
                    &Json(&cluster.locations),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BackendError::NameConflict
                } else {
                    BackendError::Failure(e.into())
                }
            })?;
        Ok(row_to_cluster(&row))
    }

    async fn get_cluster(&self, id: Uuid) -> BackendResult<Option<Cluster>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, owning_group, organization, kubeconfig, system_namespace, locations FROM clusters WHERE id = $1",
                &[&id],
            )
            .await
            .context("query cluster")?;
        Ok(row.as_ref().map(row_to_cluster))
    }

    async fn get_cluster_by_name(&self, name: &str) -> BackendResult<Option<Cluster>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, owning_group, organization, kubeconfig, system_namespace, locations FROM clusters WHERE name = $1",
                &[&name],
            )
            .await
            .context("query cluster by name")?;
        Ok(row.as_ref().map(row_to_cluster))
    }

    async fn update_cluster(&self, id: Uuid, patch: ClusterPatch) -> BackendResult<Option<Cluster>> {
        let client = self.pool.get().await.context("db connection")?;

        let mut set_clauses = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut idx = 1;

        if let Some(ref v) = patch.organization {
            set_clauses.push(format!("organization = ${idx}"));
            params.push(v);
            idx += 1;
        }
        if let Some(ref v) = patch.kubeconfig {
            set_clauses.push(format!("kubeconfig = ${idx}"));
            params.push(v);
            idx += 1;
        }
        let locations_json = patch.locations.as_ref().map(Json);
        if let Some(ref v) = locations_json {
            set_clauses.push(format!("locations = ${idx}"));
            params.push(v);
            idx += 1;
        }

        if set_clauses.is_empty() {
            return self.get_cluster(id).await;
        }

        let query = format!(
            "UPDATE clusters SET {} WHERE id = ${idx} RETURNING id, name, owning_group, organization, kubeconfig, system_namespace, locations",
            set_clauses.join(", ")
        );
        params.push(&id);

        let row = client.query_opt(&query, &params).await.context("update cluster")?;
        Ok(row.as_ref().map(row_to_cluster))
    }

    async fn delete_cluster(&self, id: Uuid) -> BackendResult<bool> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .execute("DELETE FROM clusters WHERE id = $1", &[&id])
            .await
            .context("delete cluster")?;
        Ok(rows > 0)
    }

    async fn list_clusters(&self) -> BackendResult<Vec<Summary>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id, name, owning_group FROM clusters ORDER BY name ASC", &[])
            .await
            .context("list clusters")?;
        Ok(rows
            .iter()
            .map(|r| Summary {
                id: r.get("id"),
                name: r.get("name"),
                owning_group: r.get("owning_group"),
            })
            .collect())
    }

    async fn list_clusters_owned_by(&self, group: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id FROM clusters WHERE owning_group = $1", &[&group])
            .await
            .context("list clusters owned by")?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn grant_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "INSERT INTO cluster_access (cluster_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                &[&cluster, &group],
            )
            .await
            .context("grant cluster access")?;
        Ok(())
    }

    async fn revoke_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "DELETE FROM cluster_access WHERE cluster_id = $1 AND group_id = $2",
                &[&cluster, &group],
            )
            .await
            .context("revoke cluster access")?;
        Ok(())
    }

    async fn list_cluster_allowed_groups(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT group_id FROM cluster_access WHERE cluster_id = $1", &[&cluster])
            .await
            .context("list cluster allowed groups")?;
        Ok(rows.iter().map(|r| r.get("group_id")).collect())
    }

    async fn grant_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "INSERT INTO app_grants (cluster_id, group_id, application) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                &[&cluster, &group, &app],
            )
            .await
            .context("grant app")?;
        Ok(())
    }

    async fn revoke_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()> {
        let client = self.pool.get().await.context("db connection")?;
        client
            .execute(
                "DELETE FROM app_grants WHERE cluster_id = $1 AND group_id = $2 AND application = $3",
                &[&cluster, &group, &app],
            )
            .await
            .context("revoke app")?;
        Ok(())
    }

    async fn list_cluster_group_apps(&self, cluster: Uuid, group: Uuid) -> BackendResult<Vec<String>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query(
                "SELECT application FROM app_grants WHERE cluster_id = $1 AND group_id = $2",
                &[&cluster, &group],
            )
            .await
            .context("list cluster group apps")?;
        Ok(rows.iter().map(|r| r.get("application")).collect())
    }

    async fn create_instance(&self, instance: ApplicationInstance) -> BackendResult<ApplicationInstance> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_one(
                r#"
                INSERT INTO application_instances (id, name, application, owning_group, cluster, created_at, config)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, name, application, owning_group, cluster, created_at, config
                "#,
                &[
                    &instance.id,
                    &instance.name,
                    &instance.application,
                    &instance.owning_group,
                    &instance.cluster,
                    &instance.created_at,
                    &instance.config,
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    BackendError::NameConflict
                } else {
                    BackendError::Failure(e.into())
                }
            })?;
        Ok(row_to_instance(&row))
    }

    async fn get_instance(&self, id: Uuid) -> BackendResult<Option<ApplicationInstance>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, application, owning_group, cluster, created_at, config FROM application_instances WHERE id = $1",
                &[&id],
            )
            .await
            .context("query instance")?;
        Ok(row.as_ref().map(row_to_instance))
    }

    async fn get_instance_by_name(&self, name: &str) -> BackendResult<Option<ApplicationInstance>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, application, owning_group, cluster, created_at, config FROM application_instances WHERE name = $1",
                &[&name],
            )
            .await
            .context("query instance by name")?;
        Ok(row.as_ref().map(row_to_instance))
    }

    async fn delete_instance(&self, id: Uuid) -> BackendResult<bool> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .execute("DELETE FROM application_instances WHERE id = $1", &[&id])
            .await
            .context("delete instance")?;
        Ok(rows > 0)
    }

    async fn list_instances(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = match group {
            Some(g) => client
                .query(
                    "SELECT id, name, owning_group FROM application_instances WHERE owning_group = $1 ORDER BY name ASC",
                    &[&g],
                )
                .await
                .context("list instances for group")?,
            None => client
                .query("SELECT id, name, owning_group FROM application_instances ORDER BY name ASC", &[])
                .await
                .context("list instances")?,
        };
        Ok(rows
            .iter()
            .map(|r| Summary {
                id: r.get("id"),
                name: r.get("name"),
                owning_group: r.get("owning_group"),
            })
            .collect())
    }

    async fn list_instances_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id FROM application_instances WHERE cluster = $1", &[&cluster])
            .await
            .context("list instances on cluster")?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn create_secret(&self, secret: Secret) -> BackendResult<Secret> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_one(
                r#"
                INSERT INTO secrets (id, name, owning_group, cluster, created_at, ciphertext)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, name, owning_group, cluster, created_at, ciphertext
                "#,
                &[
                    &secret.id,
                    &secret.name,
                    &secret.owning_group,
                    &secret.cluster,
                    &secret.created_at,
                    &secret.ciphertext,
                ],
            )
            .await
            .context("create secret")?;
        Ok(row_to_secret(&row))
    }

    async fn get_secret(&self, id: Uuid) -> BackendResult<Option<Secret>> {
        let client = self.pool.get().await.context("db connection")?;
        let row = client
            .query_opt(
                "SELECT id, name, owning_group, cluster, created_at, ciphertext FROM secrets WHERE id = $1",
                &[&id],
            )
            .await
            .context("query secret")?;
        Ok(row.as_ref().map(row_to_secret))
    }

    async fn delete_secret(&self, id: Uuid) -> BackendResult<bool> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .execute("DELETE FROM secrets WHERE id = $1", &[&id])
            .await
            .context("delete secret")?;
        Ok(rows > 0)
    }

    async fn list_secrets(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = match group {
            Some(g) => client
                .query(
                    "SELECT id, name, owning_group FROM secrets WHERE owning_group = $1 ORDER BY name ASC",
                    &[&g],
                )
                .await
                .context("list secrets for group")?,
            None => client
                .query("SELECT id, name, owning_group FROM secrets ORDER BY name ASC", &[])
                .await
                .context("list secrets")?,
        };
        Ok(rows
            .iter()
            .map(|r| Summary {
                id: r.get("id"),
                name: r.get("name"),
                owning_group: r.get("owning_group"),
            })
            .collect())
    }

    async fn list_secrets_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        let client = self.pool.get().await.context("db connection")?;
        let rows = client
            .query("SELECT id FROM secrets WHERE cluster = $1", &[&cluster])
            .await
            .context("list secrets on cluster")?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }
}
