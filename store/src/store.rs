//! The persistent store: a [`StoreBackend`] plus the four cache tiers
//! described for it — by-id, by-name/token/external-id, relation multimaps,
//! and materialized kubeconfig files — kept consistent by a write-through
//! policy. Every mutator writes to the backend first; caches are only
//! touched once that write has succeeded.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use meridian_multimap::{TtlCache, TtlMultimap};
use metrics::counter;
use uuid::Uuid;

fn record_cache_lookup(tier: &'static str, hit: bool) {
    counter!("store_cache_lookups_total", "tier" => tier, "hit" => if hit { "true" } else { "false" }).increment(1);
}

use crate::args::StoreArgs;
use crate::backend::StoreBackend;
use crate::entities::{
    ApplicationInstance, Cluster, ClusterPatch, Group, GroupPatch, Secret, Summary, User, UserPatch,
};
use crate::kubeconfig::{FileHandle, KubeconfigPool};

/// TTLs for each cache tier. Distinct knobs because admin/federated-identity
/// lookups and hot relation checks have different staleness tolerances than
/// a cluster's full record.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub entity: Duration,
    pub index: Duration,
    pub relation: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            entity: Duration::from_secs(60),
            index: Duration::from_secs(300),
            relation: Duration::from_secs(30),
        }
    }
}

impl From<&StoreArgs> for CacheTtls {
    fn from(args: &StoreArgs) -> Self {
        Self {
            entity: Duration::from_secs(args.entity_cache_ttl_secs),
            index: Duration::from_secs(args.index_cache_ttl_secs),
            relation: Duration::from_secs(args.relation_cache_ttl_secs),
        }
    }
}

pub struct Store {
    backend: Arc<dyn StoreBackend>,
    kubeconfigs: KubeconfigPool,
    ttls: CacheTtls,

    users_by_id: TtlCache<Uuid, User>,
    users_by_token: TtlCache<String, Uuid>,
    users_by_external_id: TtlCache<String, Uuid>,

    groups_by_id: TtlCache<Uuid, Group>,
    groups_by_name: TtlCache<String, Uuid>,

    clusters_by_id: TtlCache<Uuid, Cluster>,
    clusters_by_name: TtlCache<String, Uuid>,

    instances_by_id: TtlCache<Uuid, ApplicationInstance>,
    instances_by_name: TtlCache<String, Uuid>,

    secrets_by_id: TtlCache<Uuid, Secret>,

    /// user -> groups it belongs to
    user_groups: TtlMultimap<Uuid, Uuid>,
    /// group -> member users
    group_members: TtlMultimap<Uuid, Uuid>,
    /// cluster -> groups allowed to use it
    cluster_allowed_groups: TtlMultimap<Uuid, Uuid>,
    /// group -> clusters it owns (reverse index)
    group_owned_clusters: TtlMultimap<Uuid, Uuid>,
    /// (cluster, group) -> applications that group may install on that cluster
    cluster_group_apps: TtlMultimap<(Uuid, Uuid), String>,
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>, kubeconfig_dir: impl Into<PathBuf>, ttls: CacheTtls, shard_count: usize) -> io::Result<Self> {
        Ok(Self {
            backend,
            kubeconfigs: KubeconfigPool::new(kubeconfig_dir)?,
            ttls,
            users_by_id: TtlCache::new(shard_count),
            users_by_token: TtlCache::new(shard_count),
            users_by_external_id: TtlCache::new(shard_count),
            groups_by_id: TtlCache::new(shard_count),
            groups_by_name: TtlCache::new(shard_count),
            clusters_by_id: TtlCache::new(shard_count),
            clusters_by_name: TtlCache::new(shard_count),
            instances_by_id: TtlCache::new(shard_count),
            instances_by_name: TtlCache::new(shard_count),
            secrets_by_id: TtlCache::new(shard_count),
            user_groups: TtlMultimap::new(shard_count),
            group_members: TtlMultimap::new(shard_count),
            cluster_allowed_groups: TtlMultimap::new(shard_count),
            group_owned_clusters: TtlMultimap::new(shard_count),
            cluster_group_apps: TtlMultimap::new(shard_count),
        })
    }

    pub fn from_args(backend: Arc<dyn StoreBackend>, args: &StoreArgs) -> io::Result<Self> {
        Self::new(backend, args.kubeconfig_dir.clone(), CacheTtls::from(args), args.cache_shards)
    }

    // ---- users ----

    fn cache_user(&self, user: &User) {
        self.users_by_id.put(user.id, user.clone(), self.ttls.entity);
        self.users_by_token.put(user.token.clone(), user.id, self.ttls.index);
        if let Some(ext) = &user.external_id {
            self.users_by_external_id.put(ext.clone(), user.id, self.ttls.index);
        }
    }

    pub async fn create_user(&self, user: User) -> Result<User> {
        let created = self.backend.create_user(user).await?;
        self.cache_user(&created);
        Ok(created)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        if let Some(user) = self.users_by_id.get(&id) {
            record_cache_lookup("users", true);
            return Ok(Some(user));
        }
        record_cache_lookup("users", false);
        let fetched = self.backend.get_user(id).await?;
        if let Some(user) = &fetched {
            self.cache_user(user);
        }
        Ok(fetched)
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        if let Some(id) = self.users_by_token.get(&token.to_string())
            && let Some(user) = self.get_user(id).await?
        {
            self.users_by_id.touch(&id, self.ttls.entity);
            return Ok(Some(user));
        }
        let fetched = self.backend.get_user_by_token(token).await?;
        if let Some(user) = &fetched {
            self.cache_user(user);
        }
        Ok(fetched)
    }

    pub async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        if let Some(id) = self.users_by_external_id.get(&external_id.to_string())
            && let Some(user) = self.get_user(id).await?
        {
            self.users_by_id.touch(&id, self.ttls.entity);
            return Ok(Some(user));
        }
        let fetched = self.backend.get_user_by_external_id(external_id).await?;
        if let Some(user) = &fetched {
            self.cache_user(user);
        }
        Ok(fetched)
    }

    pub async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>> {
        let updated = self.backend.update_user(id, patch).await?;
        if let Some(user) = &updated {
            self.cache_user(user);
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let existing = self.get_user(id).await?;
        let deleted = self.backend.delete_user(id).await?;
        if deleted {
            self.users_by_id.invalidate(&id);
            if let Some(user) = existing {
                self.users_by_token.invalidate(&user.token);
                if let Some(ext) = &user.external_id {
                    self.users_by_external_id.invalidate(ext);
                }
            }
            self.user_groups.erase(&id);
        }
        Ok(deleted)
    }

    pub async fn list_users(&self) -> Result<Vec<Summary>> {
        Ok(self.backend.list_users().await?)
    }

    // ---- groups ----

    fn cache_group(&self, group: &Group) {
        self.groups_by_id.put(group.id, group.clone(), self.ttls.entity);
        self.groups_by_name.put(group.name.clone(), group.id, self.ttls.index);
    }

    pub async fn create_group(&self, group: Group) -> Result<Group> {
        let created = self.backend.create_group(group).await?;
        self.cache_group(&created);
        Ok(created)
    }

    pub async fn get_group(&self, id: Uuid) -> Result<Option<Group>> {
        if let Some(group) = self.groups_by_id.get(&id) {
            record_cache_lookup("groups", true);
            return Ok(Some(group));
        }
        record_cache_lookup("groups", false);
        let fetched = self.backend.get_group(id).await?;
        if let Some(group) = &fetched {
            self.cache_group(group);
        }
        Ok(fetched)
    }

    pub async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        if let Some(id) = self.groups_by_name.get(&name.to_string())
            && let Some(group) = self.get_group(id).await?
        {
            self.groups_by_id.touch(&id, self.ttls.entity);
            return Ok(Some(group));
        }
        let fetched = self.backend.get_group_by_name(name).await?;
        if let Some(group) = &fetched {
            self.cache_group(group);
        }
        Ok(fetched)
    }

    pub async fn update_group(&self, id: Uuid, patch: GroupPatch) -> Result<Option<Group>> {
        let updated = self.backend.update_group(id, patch).await?;
        if let Some(group) = &updated {
            self.cache_group(group);
        }
        Ok(updated)
    }

    pub async fn delete_group(&self, id: Uuid) -> Result<bool> {
        let existing = self.get_group(id).await?;
        let deleted = self.backend.delete_group(id).await?;
        if deleted {
            self.groups_by_id.invalidate(&id);
            if let Some(group) = existing {
                self.groups_by_name.invalidate(&group.name);
            }
            self.group_members.erase(&id);
            self.group_owned_clusters.erase(&id);
        }
        Ok(deleted)
    }

    pub async fn list_groups(&self) -> Result<Vec<Summary>> {
        Ok(self.backend.list_groups().await?)
    }

    pub async fn add_group_member(&self, group: Uuid, user: Uuid) -> Result<()> {
        self.backend.add_group_member(group, user).await?;
        self.group_members.insert(group, user, self.ttls.relation);
        self.user_groups.insert(user, group, self.ttls.relation);
        Ok(())
    }

    pub async fn remove_group_member(&self, group: Uuid, user: Uuid) -> Result<()> {
        self.backend.remove_group_member(group, user).await?;
        self.group_members.erase_value(&group, &user);
        self.user_groups.erase_value(&user, &group);
        Ok(())
    }

    /// Whether `user` belongs to `group`, consulting the relation cache
    /// before falling back to the backend.
    pub async fn is_group_member(&self, group: Uuid, user: Uuid) -> Result<bool> {
        if self.group_members.contains_key(&group) {
            let found = self.group_members.contains(&group, &user);
            if found {
                self.group_members.update_expiration(&group, self.ttls.relation);
            }
            return Ok(found);
        }
        let members = self.backend.list_group_members(group).await?;
        for m in &members {
            self.group_members.insert(group, *m, self.ttls.relation);
        }
        Ok(members.contains(&user))
    }

    pub async fn list_group_members(&self, group: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_group_members(group).await?)
    }

    pub async fn list_user_groups(&self, user: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_user_groups(user).await?)
    }

    // ---- clusters ----

    fn cache_cluster(&self, cluster: &Cluster) {
        self.clusters_by_id.put(cluster.id, cluster.clone(), self.ttls.entity);
        self.clusters_by_name.put(cluster.name.clone(), cluster.id, self.ttls.index);
    }

    pub async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        let created = self.backend.create_cluster(cluster).await?;
        self.cache_cluster(&created);
        self.group_owned_clusters.insert(created.owning_group, created.id, self.ttls.relation);
        Ok(created)
    }

    pub async fn get_cluster(&self, id: Uuid) -> Result<Option<Cluster>> {
        if let Some(cluster) = self.clusters_by_id.get(&id) {
            return Ok(Some(cluster));
        }
        let fetched = self.backend.get_cluster(id).await?;
        if let Some(cluster) = &fetched {
            self.cache_cluster(cluster);
        }
        Ok(fetched)
    }

    pub async fn get_cluster_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        if let Some(id) = self.clusters_by_name.get(&name.to_string())
            && let Some(cluster) = self.get_cluster(id).await?
        {
            self.clusters_by_id.touch(&id, self.ttls.entity);
            return Ok(Some(cluster));
        }
        let fetched = self.backend.get_cluster_by_name(name).await?;
        if let Some(cluster) = &fetched {
            self.cache_cluster(cluster);
        }
        Ok(fetched)
    }

    pub async fn update_cluster(&self, id: Uuid, patch: ClusterPatch) -> Result<Option<Cluster>> {
        let updated = self.backend.update_cluster(id, patch).await?;
        if let Some(cluster) = &updated {
            self.cache_cluster(cluster);
            // Credentials may have changed; any live kubeconfig handle stays
            // valid for holders already using it, but new callers must see
            // the new contents, so drop our reference to the old file.
            self.kubeconfigs.forget(id);
        }
        Ok(updated)
    }

    pub async fn delete_cluster(&self, id: Uuid) -> Result<bool> {
        let existing = self.get_cluster(id).await?;
        let deleted = self.backend.delete_cluster(id).await?;
        if deleted {
            self.clusters_by_id.invalidate(&id);
            if let Some(cluster) = &existing {
                self.clusters_by_name.invalidate(&cluster.name);
                self.group_owned_clusters.erase_value(&cluster.owning_group, &id);
            }
            self.cluster_allowed_groups.erase(&id);
            self.kubeconfigs.forget(id);
        }
        Ok(deleted)
    }

    pub async fn list_clusters(&self) -> Result<Vec<Summary>> {
        Ok(self.backend.list_clusters().await?)
    }

    pub async fn list_clusters_owned_by(&self, group: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_clusters_owned_by(group).await?)
    }

    pub async fn list_cluster_allowed_groups(&self, cluster: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_cluster_allowed_groups(cluster).await?)
    }

    pub async fn grant_cluster_access(&self, cluster: Uuid, group: Uuid) -> Result<()> {
        self.backend.grant_cluster_access(cluster, group).await?;
        self.cluster_allowed_groups.insert(cluster, group, self.ttls.relation);
        Ok(())
    }

    pub async fn revoke_cluster_access(&self, cluster: Uuid, group: Uuid) -> Result<()> {
        self.backend.revoke_cluster_access(cluster, group).await?;
        self.cluster_allowed_groups.erase_value(&cluster, &group);
        Ok(())
    }

    /// Whether `group` may use `cluster`, either by direct grant or by
    /// owning it outright.
    pub async fn may_use_cluster(&self, cluster: Uuid, group: Uuid) -> Result<bool> {
        if let Some(c) = self.get_cluster(cluster).await?
            && c.owning_group == group
        {
            return Ok(true);
        }
        if self.cluster_allowed_groups.contains_key(&cluster) {
            let found = self.cluster_allowed_groups.contains(&cluster, &group);
            if found {
                self.cluster_allowed_groups.update_expiration(&cluster, self.ttls.relation);
            }
            return Ok(found);
        }
        let groups = self.backend.list_cluster_allowed_groups(cluster).await?;
        for g in &groups {
            self.cluster_allowed_groups.insert(cluster, *g, self.ttls.relation);
        }
        Ok(groups.contains(&group))
    }

    pub async fn grant_app(&self, cluster: Uuid, group: Uuid, app: &str) -> Result<()> {
        self.backend.grant_app(cluster, group, app).await?;
        self.cluster_group_apps
            .insert((cluster, group), app.to_string(), self.ttls.relation);
        Ok(())
    }

    pub async fn revoke_app(&self, cluster: Uuid, group: Uuid, app: &str) -> Result<()> {
        self.backend.revoke_app(cluster, group, app).await?;
        self.cluster_group_apps
            .erase_value(&(cluster, group), &app.to_string());
        Ok(())
    }

    /// Whether `group` may install `app` on `cluster`, honoring the
    /// wildcard-application grant.
    pub async fn may_install_app(&self, cluster: Uuid, group: Uuid, app: &str) -> Result<bool> {
        let key = (cluster, group);
        if self.cluster_group_apps.contains_key(&key) {
            let allowed = self.cluster_group_apps.contains(&key, &app.to_string())
                || self
                    .cluster_group_apps
                    .contains(&key, &crate::entities::WILDCARD_APPLICATION.to_string());
            if allowed {
                self.cluster_group_apps.update_expiration(&key, self.ttls.relation);
            }
            return Ok(allowed);
        }
        let apps = self.backend.list_cluster_group_apps(cluster, group).await?;
        for a in &apps {
            self.cluster_group_apps.insert(key, a.clone(), self.ttls.relation);
        }
        Ok(apps.iter().any(|a| a == app || a == crate::entities::WILDCARD_APPLICATION))
    }

    /// Materializes (or reuses) the on-disk kubeconfig for `cluster`.
    pub async fn kubeconfig_handle(&self, cluster: Uuid) -> Result<FileHandle> {
        let cluster = self
            .get_cluster(cluster)
            .await?
            .ok_or_else(|| anyhow::anyhow!("cluster {cluster} not found"))?;
        Ok(self.kubeconfigs.materialize(cluster.id, &cluster.kubeconfig)?)
    }

    // ---- application instances ----

    fn cache_instance(&self, instance: &ApplicationInstance) {
        self.instances_by_id.put(instance.id, instance.clone(), self.ttls.entity);
        self.instances_by_name.put(instance.name.clone(), instance.id, self.ttls.index);
    }

    pub async fn create_instance(&self, instance: ApplicationInstance) -> Result<ApplicationInstance> {
        let created = self.backend.create_instance(instance).await?;
        self.cache_instance(&created);
        Ok(created)
    }

    pub async fn get_instance(&self, id: Uuid) -> Result<Option<ApplicationInstance>> {
        if let Some(instance) = self.instances_by_id.get(&id) {
            return Ok(Some(instance));
        }
        let fetched = self.backend.get_instance(id).await?;
        if let Some(instance) = &fetched {
            self.cache_instance(instance);
        }
        Ok(fetched)
    }

    pub async fn get_instance_by_name(&self, name: &str) -> Result<Option<ApplicationInstance>> {
        if let Some(id) = self.instances_by_name.get(&name.to_string())
            && let Some(instance) = self.get_instance(id).await?
        {
            self.instances_by_id.touch(&id, self.ttls.entity);
            return Ok(Some(instance));
        }
        let fetched = self.backend.get_instance_by_name(name).await?;
        if let Some(instance) = &fetched {
            self.cache_instance(instance);
        }
        Ok(fetched)
    }

    pub async fn delete_instance(&self, id: Uuid) -> Result<bool> {
        let existing = self.get_instance(id).await?;
        let deleted = self.backend.delete_instance(id).await?;
        if deleted {
            self.instances_by_id.invalidate(&id);
            if let Some(instance) = existing {
                self.instances_by_name.invalidate(&instance.name);
            }
        }
        Ok(deleted)
    }

    pub async fn list_instances(&self, group: Option<Uuid>) -> Result<Vec<Summary>> {
        Ok(self.backend.list_instances(group).await?)
    }

    pub async fn list_instances_on_cluster(&self, cluster: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_instances_on_cluster(cluster).await?)
    }

    // ---- secrets ----

    pub async fn create_secret(&self, secret: Secret) -> Result<Secret> {
        let created = self.backend.create_secret(secret).await?;
        self.secrets_by_id.put(created.id, created.clone(), self.ttls.entity);
        Ok(created)
    }

    pub async fn get_secret(&self, id: Uuid) -> Result<Option<Secret>> {
        if let Some(secret) = self.secrets_by_id.get(&id) {
            return Ok(Some(secret));
        }
        let fetched = self.backend.get_secret(id).await?;
        if let Some(secret) = &fetched {
            self.secrets_by_id.put(secret.id, secret.clone(), self.ttls.entity);
        }
        Ok(fetched)
    }

    pub async fn delete_secret(&self, id: Uuid) -> Result<bool> {
        let deleted = self.backend.delete_secret(id).await?;
        if deleted {
            self.secrets_by_id.invalidate(&id);
        }
        Ok(deleted)
    }

    pub async fn list_secrets(&self, group: Option<Uuid>) -> Result<Vec<Summary>> {
        Ok(self.backend.list_secrets(group).await?)
    }

    pub async fn list_secrets_on_cluster(&self, cluster: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.backend.list_secrets_on_cluster(cluster).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::memory::MemoryBackend;
    use crate::entities::{Cluster, Group, User};

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()), tempfile::tempdir().unwrap().keep(), CacheTtls::default(), 4).unwrap()
    }

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{name}@example.org"),
            phone: None,
            institution: None,
            token: Uuid::new_v4().to_string(),
            external_id: None,
            admin: false,
        }
    }

    fn group(name: &str) -> Group {
        Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            phone: None,
            field_of_science: "Physics".to_string(),
            description: None,
        }
    }

    fn cluster(name: &str, owning_group: Uuid) -> Cluster {
        Cluster {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owning_group,
            organization: "Org".to_string(),
            kubeconfig: "apiVersion: v1\n".to_string(),
            system_namespace: "meridian-system".to_string(),
            locations: vec![],
        }
    }

    /// Create -> fetch -> update -> fetch -> delete -> fetch (§8 round-trip
    /// and idempotence property), run against the user entity.
    #[tokio::test]
    async fn user_round_trip_through_create_update_delete() {
        let store = store();
        let created = store.create_user(user("ada")).await.unwrap();

        let fetched = store.get_user(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "ada");

        store
            .update_user(created.id, UserPatch { name: Some("ada-lovelace".to_string()), ..Default::default() })
            .await
            .unwrap();
        let updated = store.get_user(created.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "ada-lovelace");

        assert!(store.delete_user(created.id).await.unwrap());
        assert!(store.get_user(created.id).await.unwrap().is_none());

        // Deleting again is a no-op, not an error (§8 idempotence).
        assert!(!store.delete_user(created.id).await.unwrap());
    }

    /// By-id cache must reflect an update immediately, even well inside the
    /// cache tier's TTL (§8 "cache coherency" scenario).
    #[tokio::test]
    async fn cluster_update_is_visible_before_ttl_elapses() {
        let store = store();
        let owner = store.create_group(group("g1")).await.unwrap();
        let created = store.create_cluster(cluster("c1", owner.id)).await.unwrap();

        // Warm the cache.
        store.get_cluster(created.id).await.unwrap();

        store
            .update_cluster(created.id, ClusterPatch { organization: Some("NewOrg".to_string()), ..Default::default() })
            .await
            .unwrap();

        let fetched = store.get_cluster(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.organization, "NewOrg");
    }

    /// For all (group, cluster) with an active access grant,
    /// `may_use_cluster` reports true, consulting the relation cache (§8
    /// quantified invariant).
    #[tokio::test]
    async fn access_grant_is_visible_through_the_relation_cache() {
        let store = store();
        let owner = store.create_group(group("owner")).await.unwrap();
        let guest = store.create_group(group("guest")).await.unwrap();
        let cluster = store.create_cluster(cluster("c1", owner.id)).await.unwrap();

        assert!(!store.may_use_cluster(cluster.id, guest.id).await.unwrap());

        store.grant_cluster_access(cluster.id, guest.id).await.unwrap();
        assert!(store.may_use_cluster(cluster.id, guest.id).await.unwrap());

        // Owning group always has access, grant or not.
        assert!(store.may_use_cluster(cluster.id, owner.id).await.unwrap());

        store.revoke_cluster_access(cluster.id, guest.id).await.unwrap();
        assert!(!store.may_use_cluster(cluster.id, guest.id).await.unwrap());
    }

    /// The wildcard application grant (`*`) permits every application, not
    /// just the one literally granted.
    #[tokio::test]
    async fn wildcard_app_grant_permits_any_application() {
        let store = store();
        let owner = store.create_group(group("owner")).await.unwrap();
        let cluster = store.create_cluster(cluster("c1", owner.id)).await.unwrap();

        store.grant_app(cluster.id, owner.id, crate::entities::WILDCARD_APPLICATION).await.unwrap();
        assert!(store.may_install_app(cluster.id, owner.id, "nginx").await.unwrap());
        assert!(store.may_install_app(cluster.id, owner.id, "postgres").await.unwrap());
    }

    /// A user's token index must resolve to exactly the user that owns that
    /// token, both fresh from the backend and warmed from cache.
    #[tokio::test]
    async fn token_lookup_resolves_through_cache_and_backend() {
        let store = store();
        let created = store.create_user(user("ada")).await.unwrap();

        let by_token = store.get_user_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(by_token.id, created.id);
        // Second lookup is served from the now-warm token/id caches.
        let by_token_again = store.get_user_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(by_token_again.id, created.id);
    }

    /// Materializing a cluster's kubeconfig surfaces the exact stored
    /// credential text (§8 "materialized cluster kubeconfig file" invariant).
    #[tokio::test]
    async fn kubeconfig_handle_materializes_exact_stored_contents() {
        let store = store();
        let owner = store.create_group(group("g1")).await.unwrap();
        let created = store.create_cluster(cluster("c1", owner.id)).await.unwrap();

        let handle = store.kubeconfig_handle(created.id).await.unwrap();
        let on_disk = std::fs::read_to_string(handle.path()).unwrap();
        assert_eq!(on_disk, created.kubeconfig);
    }

    /// Group creation enforces the name-uniqueness invariant; the by-name
    /// read-before-write in the memory backend surfaces it as a distinct
    /// conflict, matching what the Postgres backend reports.
    #[tokio::test]
    async fn duplicate_group_name_is_a_conflict_not_a_silent_overwrite() {
        let store = store();
        store.create_group(group("g1")).await.unwrap();
        let err = store.create_group(group("g1")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BackendError>(), Some(BackendError::NameConflict)));
    }
}
