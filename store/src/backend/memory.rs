//! In-process mock backend. Exercises the exact same trait the Postgres
//! backend does, so the round-trip/idempotence properties in the testable
//! properties list run in CI without a live database.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{BackendError, BackendResult, StoreBackend};
use crate::entities::{
    ApplicationInstance, Cluster, ClusterPatch, Group, GroupPatch, Secret, Summary, User, UserPatch,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    clusters: HashMap<Uuid, Cluster>,
    instances: HashMap<Uuid, ApplicationInstance>,
    secrets: HashMap<Uuid, Secret>,
    group_members: HashSet<(Uuid, Uuid)>, // (group, user)
    cluster_access: HashSet<(Uuid, Uuid)>, // (cluster, group)
    app_grants: HashSet<(Uuid, Uuid, String)>, // (cluster, group, app)
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn create_user(&self, user: User) -> BackendResult<User> {
        let mut t = self.tables.lock();
        if t.users.values().any(|u| u.token == user.token) {
            return Err(BackendError::NameConflict);
        }
        if let Some(ext) = &user.external_id
            && t.users.values().any(|u| u.external_id.as_deref() == Some(ext.as_str()))
        {
            return Err(BackendError::NameConflict);
        }
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> BackendResult<Option<User>> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn get_user_by_token(&self, token: &str) -> BackendResult<Option<User>> {
        Ok(self.tables.lock().users.values().find(|u| u.token == token).cloned())
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> BackendResult<Option<User>> {
        Ok(self
            .tables
            .lock()
            .users
            .values()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> BackendResult<Option<User>> {
        let mut t = self.tables.lock();
        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.name {
            user.name = v;
        }
        if let Some(v) = patch.email {
            user.email = v;
        }
        if let Some(v) = patch.phone {
            user.phone = Some(v);
        }
        if let Some(v) = patch.institution {
            user.institution = Some(v);
        }
        if let Some(v) = patch.admin {
            user.admin = v;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> BackendResult<bool> {
        let mut t = self.tables.lock();
        t.group_members.retain(|(_, u)| *u != id);
        Ok(t.users.remove(&id).is_some())
    }

    async fn list_users(&self) -> BackendResult<Vec<Summary>> {
        Ok(self
            .tables
            .lock()
            .users
            .values()
            .map(|u| Summary {
                id: u.id,
                name: u.name.clone(),
                owning_group: Uuid::nil(),
            })
            .collect())
    }

    async fn create_group(&self, group: Group) -> BackendResult<Group> {
        let mut t = self.tables.lock();
        if t.groups.values().any(|g| g.name == group.name) {
            return Err(BackendError::NameConflict);
        }
        t.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn get_group(&self, id: Uuid) -> BackendResult<Option<Group>> {
        Ok(self.tables.lock().groups.get(&id).cloned())
    }

    async fn get_group_by_name(&self, name: &str) -> BackendResult<Option<Group>> {
        Ok(self.tables.lock().groups.values().find(|g| g.name == name).cloned())
    }

    async fn update_group(&self, id: Uuid, patch: GroupPatch) -> BackendResult<Option<Group>> {
        let mut t = self.tables.lock();
        let Some(group) = t.groups.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.email {
            group.email = Some(v);
        }
        if let Some(v) = patch.phone {
            group.phone = Some(v);
        }
        if let Some(v) = patch.field_of_science {
            group.field_of_science = v;
        }
        if let Some(v) = patch.description {
            group.description = Some(v);
        }
        Ok(Some(group.clone()))
    }

    async fn delete_group(&self, id: Uuid) -> BackendResult<bool> {
        let mut t = self.tables.lock();
        t.group_members.retain(|(g, _)| *g != id);
        t.cluster_access.retain(|(_, g)| *g != id);
        t.app_grants.retain(|(_, g, _)| *g != id);
        Ok(t.groups.remove(&id).is_some())
    }

    async fn list_groups(&self) -> BackendResult<Vec<Summary>> {
        Ok(self
            .tables
            .lock()
            .groups
            .values()
            .map(|g| Summary {
                id: g.id,
                name: g.name.clone(),
                owning_group: g.id,
            })
            .collect())
    }

    async fn add_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()> {
        self.tables.lock().group_members.insert((group, user));
        Ok(())
    }

    async fn remove_group_member(&self, group: Uuid, user: Uuid) -> BackendResult<()> {
        self.tables.lock().group_members.remove(&(group, user));
        Ok(())
    }

    async fn list_group_members(&self, group: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .group_members
            .iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, u)| *u)
            .collect())
    }

    async fn list_user_groups(&self, user: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .group_members
            .iter()
            .filter(|(_, u)| *u == user)
            .map(|(g, _)| *g)
            .collect())
    }

    async fn create_cluster(&self, cluster: Cluster) -> BackendResult<Cluster> {
        let mut t = self.tables.lock();
        if t.clusters.values().any(|c| c.name == cluster.name) {
            return Err(BackendError::NameConflict);
        }
        t.clusters.insert(cluster.id, cluster.clone());
        Ok(cluster)
    }

    async fn get_cluster(&self, id: Uuid) -> BackendResult<Option<Cluster>> {
        Ok(self.tables.lock().clusters.get(&id).cloned())
    }

    async fn get_cluster_by_name(&self, name: &str) -> BackendResult<Option<Cluster>> {
        Ok(self.tables.lock().clusters.values().find(|c| c.name == name).cloned())
    }

    async fn update_cluster(&self, id: Uuid, patch: ClusterPatch) -> BackendResult<Option<Cluster>> {
        let mut t = self.tables.lock();
        let Some(cluster) = t.clusters.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.organization {
            cluster.organization = v;
        }
        if let Some(v) = patch.kubeconfig {
            cluster.kubeconfig = v;
        }
        if let Some(v) = patch.locations {
            cluster.locations = v;
        }
        Ok(Some(cluster.clone()))
    }

    async fn delete_cluster(&self, id: Uuid) -> BackendResult<bool> {
        let mut t = self.tables.lock();
        t.cluster_access.retain(|(c, _)| *c != id);
        t.app_grants.retain(|(c, _, _)| *c != id);
        Ok(t.clusters.remove(&id).is_some())
    }

    async fn list_clusters(&self) -> BackendResult<Vec<Summary>> {
        Ok(self
            .tables
            .lock()
            .clusters
            .values()
            .map(|c| Summary {
                id: c.id,
                name: c.name.clone(),
                owning_group: c.owning_group,
            })
            .collect())
    }

    async fn list_clusters_owned_by(&self, group: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .clusters
            .values()
            .filter(|c| c.owning_group == group)
            .map(|c| c.id)
            .collect())
    }

    async fn grant_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()> {
        self.tables.lock().cluster_access.insert((cluster, group));
        Ok(())
    }

    async fn revoke_cluster_access(&self, cluster: Uuid, group: Uuid) -> BackendResult<()> {
        self.tables.lock().cluster_access.remove(&(cluster, group));
        Ok(())
    }

    async fn list_cluster_allowed_groups(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .cluster_access
            .iter()
            .filter(|(c, _)| *c == cluster)
            .map(|(_, g)| *g)
            .collect())
    }

    async fn grant_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()> {
        self.tables
            .lock()
            .app_grants
            .insert((cluster, group, app.to_string()));
        Ok(())
    }

    async fn revoke_app(&self, cluster: Uuid, group: Uuid, app: &str) -> BackendResult<()> {
        self.tables
            .lock()
            .app_grants
            .remove(&(cluster, group, app.to_string()));
        Ok(())
    }

    async fn list_cluster_group_apps(&self, cluster: Uuid, group: Uuid) -> BackendResult<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .app_grants
            .iter()
            .filter(|(c, g, _)| *c == cluster && *g == group)
            .map(|(_, _, a)| a.clone())
            .collect())
    }

    async fn create_instance(&self, instance: ApplicationInstance) -> BackendResult<ApplicationInstance> {
        let mut t = self.tables.lock();
        if t.instances.values().any(|i| i.name == instance.name) {
            return Err(BackendError::NameConflict);
        }
        t.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get_instance(&self, id: Uuid) -> BackendResult<Option<ApplicationInstance>> {
        Ok(self.tables.lock().instances.get(&id).cloned())
    }

    async fn get_instance_by_name(&self, name: &str) -> BackendResult<Option<ApplicationInstance>> {
        Ok(self
            .tables
            .lock()
            .instances
            .values()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn delete_instance(&self, id: Uuid) -> BackendResult<bool> {
        Ok(self.tables.lock().instances.remove(&id).is_some())
    }

    async fn list_instances(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>> {
        Ok(self
            .tables
            .lock()
            .instances
            .values()
            .filter(|i| group.is_none_or(|g| i.owning_group == g))
            .map(|i| Summary {
                id: i.id,
                name: i.name.clone(),
                owning_group: i.owning_group,
            })
            .collect())
    }

    async fn list_instances_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .instances
            .values()
            .filter(|i| i.cluster == cluster)
            .map(|i| i.id)
            .collect())
    }

    async fn create_secret(&self, secret: Secret) -> BackendResult<Secret> {
        let mut t = self.tables.lock();
        t.secrets.insert(secret.id, secret.clone());
        Ok(secret)
    }

    async fn get_secret(&self, id: Uuid) -> BackendResult<Option<Secret>> {
        Ok(self.tables.lock().secrets.get(&id).cloned())
    }

    async fn delete_secret(&self, id: Uuid) -> BackendResult<bool> {
        Ok(self.tables.lock().secrets.remove(&id).is_some())
    }

    async fn list_secrets(&self, group: Option<Uuid>) -> BackendResult<Vec<Summary>> {
        Ok(self
            .tables
            .lock()
            .secrets
            .values()
            .filter(|s| group.is_none_or(|g| s.owning_group == g))
            .map(|s| Summary {
                id: s.id,
                name: s.name.clone(),
                owning_group: s.owning_group,
            })
            .collect())
    }

    async fn list_secrets_on_cluster(&self, cluster: Uuid) -> BackendResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .secrets
            .values()
            .filter(|s| s.cluster == cluster)
            .map(|s| s.id)
            .collect())
    }
}
