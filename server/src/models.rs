//! Request/response envelopes for the HTTP surface (§6). Every entity comes
//! back wrapped as `{apiVersion, kind, metadata}`; every list comes back as
//! `{apiVersion, items:[…]}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meridian_store::entities::{ApplicationInstance, Cluster, GeoLocation, Group, Secret, Summary, User};

const API_VERSION: &str = "v1alpha3";

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(rename = "apiVersion")]
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(kind: &'static str, metadata: T) -> Self {
        Self {
            api_version: API_VERSION,
            kind,
            metadata,
        }
    }
}

#[derive(Serialize)]
pub struct ListEnvelope<T: Serialize> {
    #[serde(rename = "apiVersion")]
    pub api_version: &'static str,
    pub items: Vec<T>,
}

impl<T: Serialize> ListEnvelope<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            api_version: API_VERSION,
            items,
        }
    }
}

#[derive(Serialize)]
pub struct SummaryItem {
    pub kind: &'static str,
    pub metadata: Summary,
}

pub fn summary_items(kind: &'static str, summaries: Vec<Summary>) -> ListEnvelope<SummaryItem> {
    ListEnvelope::new(summaries.into_iter().map(|metadata| SummaryItem { kind, metadata }).collect())
}

// ---- users ----

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub metadata: CreateUserMetadata,
}

#[derive(Deserialize)]
pub struct CreateUserMetadata {
    #[serde(rename = "globusID")]
    pub globus_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub institution: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub institution: Option<String>,
    pub admin: bool,
    /// Only present on creation; the opaque bearer token callers must save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: format!("User_{}", u.id),
            name: u.name,
            email: u.email,
            phone: u.phone,
            institution: u.institution,
            admin: u.admin,
            access_token: None,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub metadata: UpdateUserMetadata,
}

#[derive(Deserialize, Default)]
pub struct UpdateUserMetadata {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub institution: Option<String>,
    pub admin: Option<bool>,
}

// ---- groups ----

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub metadata: CreateGroupMetadata,
}

#[derive(Deserialize)]
pub struct CreateGroupMetadata {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "scienceField")]
    pub science_field: String,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "scienceField")]
    pub science_field: String,
    pub description: Option<String>,
}

impl From<Group> for GroupView {
    fn from(g: Group) -> Self {
        Self {
            id: format!("Group_{}", g.id),
            name: g.name,
            email: g.email,
            phone: g.phone,
            science_field: g.field_of_science,
            description: g.description,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateGroupRequest {
    pub metadata: UpdateGroupMetadata,
}

#[derive(Deserialize, Default)]
pub struct UpdateGroupMetadata {
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "scienceField")]
    pub science_field: Option<String>,
    pub description: Option<String>,
}

// ---- clusters ----

#[derive(Deserialize)]
pub struct CreateClusterRequest {
    pub metadata: CreateClusterMetadata,
}

#[derive(Deserialize)]
pub struct CreateClusterMetadata {
    pub name: String,
    pub group: String,
    pub organization: String,
    pub kubeconfig: String,
    #[serde(default)]
    pub locations: Vec<GeoLocation>,
}

#[derive(Serialize)]
pub struct ClusterView {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub locations: Vec<GeoLocation>,
}

impl From<Cluster> for ClusterView {
    fn from(c: Cluster) -> Self {
        Self {
            id: format!("Cluster_{}", c.id),
            name: c.name,
            organization: c.organization,
            locations: c.locations,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateClusterRequest {
    pub metadata: UpdateClusterMetadata,
}

#[derive(Deserialize, Default)]
pub struct UpdateClusterMetadata {
    pub organization: Option<String>,
    pub kubeconfig: Option<String>,
    pub locations: Option<Vec<GeoLocation>>,
}

// ---- application catalog ----

#[derive(Deserialize, Default)]
pub struct AppRepoQuery {
    #[serde(default)]
    pub dev: bool,
    #[serde(default)]
    pub test: bool,
}

#[derive(Serialize)]
pub struct ApplicationView {
    pub name: String,
    #[serde(rename = "chartVersion")]
    pub chart_version: String,
    #[serde(rename = "appVersion")]
    pub app_version: String,
    pub description: String,
}

// ---- application instances ----

#[derive(Deserialize)]
pub struct InstallApplicationRequest {
    pub group: String,
    pub cluster: String,
    pub configuration: String,
}

#[derive(Deserialize, Default)]
pub struct InstanceListQuery {
    pub group: Option<String>,
}

#[derive(Serialize)]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub application: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl From<ApplicationInstance> for InstanceView {
    fn from(i: ApplicationInstance) -> Self {
        Self {
            id: format!("Instance_{}", i.id),
            name: i.name,
            application: i.application,
            created_at: i.created_at,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct DeleteInstanceQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, Default)]
pub struct LogsQuery {
    pub max_lines: Option<u32>,
    pub container: Option<String>,
    #[serde(default)]
    pub previous: bool,
}

#[derive(Deserialize)]
pub struct ScaleRequest {
    pub replicas: u32,
    pub deployment: String,
}

#[derive(Deserialize)]
pub struct RestartRequest {
    pub deployment: String,
}

// ---- secrets ----

#[derive(Deserialize)]
pub struct CreateSecretRequest {
    pub metadata: CreateSecretMetadata,
    pub contents: std::collections::BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct CreateSecretMetadata {
    pub name: String,
    pub group: String,
    pub cluster: String,
}

#[derive(Serialize)]
pub struct SecretView {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl From<Secret> for SecretView {
    fn from(s: Secret) -> Self {
        Self {
            id: format!("Secret_{}", s.id),
            name: s.name,
            created_at: s.created_at,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct SecretListQuery {
    pub group: Option<String>,
}

#[derive(Deserialize)]
pub struct CopySecretRequest {
    pub metadata: CreateSecretMetadata,
}

pub fn parse_entity_id(prefix: &str, raw: &str) -> Option<Uuid> {
    let stripped = raw.strip_prefix(prefix).unwrap_or(raw);
    Uuid::parse_str(stripped).ok()
}
