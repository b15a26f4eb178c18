use clap::Parser;
use meridian_common::args::PostgresArgs;

/// Knobs for the persistent store: where its backing database lives, how
/// long each cache tier trusts what it has read, and where materialized
/// kubeconfig files are written.
#[derive(Parser, Debug, Clone)]
pub struct StoreArgs {
    #[clap(flatten)]
    pub postgres: PostgresArgs,

    /// TTL in seconds for by-id entity lookups (users, groups, clusters,
    /// instances, secrets).
    #[arg(long, env = "STORE_ENTITY_CACHE_TTL_SECS", default_value_t = 60)]
    pub entity_cache_ttl_secs: u64,

    /// TTL in seconds for name/token/external-id -> id index lookups.
    #[arg(long, env = "STORE_INDEX_CACHE_TTL_SECS", default_value_t = 300)]
    pub index_cache_ttl_secs: u64,

    /// TTL in seconds for relation categories (group membership, cluster
    /// access, application grants).
    #[arg(long, env = "STORE_RELATION_CACHE_TTL_SECS", default_value_t = 30)]
    pub relation_cache_ttl_secs: u64,

    /// Number of shards backing each cache tier. Higher reduces lock
    /// contention under concurrent load at the cost of more bookkeeping.
    #[arg(long, env = "STORE_CACHE_SHARDS", default_value_t = 16)]
    pub cache_shards: usize,

    /// Directory where per-cluster kubeconfig files are materialized for
    /// helm/kubectl invocations.
    #[arg(long, env = "STORE_KUBECONFIG_DIR", default_value = "/tmp/slate-kubeconfigs")]
    pub kubeconfig_dir: String,
}
