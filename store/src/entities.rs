//! Entity records. A fetch that finds nothing returns `None` rather than a
//! `valid: false` sentinel — `Option<T>` already carries that signal, and an
//! explicit flag on a live record would just be a second way to say the same
//! thing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub institution: Option<String>,
    /// Opaque bearer token. Unique across all users.
    pub token: String,
    /// Federated identity (e.g. a Globus ID), unique when present.
    pub external_id: Option<String>,
    pub admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub institution: Option<String>,
    pub admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    /// Globally unique, DNS-safe, <= 54 chars, no reserved prefix.
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub field_of_science: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub field_of_science: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GeoLocation {
    pub lat: String,
    pub lon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub owning_group: Uuid,
    pub organization: String,
    /// Exact kubeconfig YAML, stored byte-for-byte.
    pub kubeconfig: String,
    /// Kubernetes namespace this service manages on the cluster for its own
    /// housekeeping (distinct from per-group namespaces).
    pub system_namespace: String,
    pub locations: Vec<GeoLocation>,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterPatch {
    pub organization: Option<String>,
    pub kubeconfig: Option<String>,
    pub locations: Option<Vec<GeoLocation>>,
}

/// Deterministic per-group namespace name on any cluster.
pub fn group_namespace(group_name: &str) -> String {
    format!("slate-group-{group_name}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationInstance {
    pub id: Uuid,
    /// `<group>-<app>[-<tag>]`, <= 63 chars, DNS-safe, globally unique among
    /// non-deleted instances.
    pub name: String,
    pub application: String,
    pub owning_group: Uuid,
    pub cluster: Uuid,
    pub created_at: i64,
    /// Canonicalized (whitespace/comment-reduced) copy of the install-time
    /// configuration.
    pub config: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: Uuid,
    pub name: String,
    pub owning_group: Uuid,
    pub cluster: Uuid,
    pub created_at: i64,
    /// `scryptenc`-encrypted payload. Never decoded except at install time.
    pub ciphertext: Vec<u8>,
}

/// Summary projection used by listing endpoints; populated without a full
/// entity fetch (see the store's write-through/read policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub name: String,
    pub owning_group: Uuid,
}

/// Sentinel application name granting access to every application on a
/// cluster for a given group.
pub const WILDCARD_APPLICATION: &str = "*";
