use clap::{Parser, Subcommand};
use meridian_store::StoreArgs;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Server(ServerArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServerArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub cascade: CascadeArgs,

    #[arg(long, env = "INTERNAL_PORT", required = true)]
    pub internal_port: u16,

    #[arg(long, env = "PUBLIC_PORT", required = true)]
    pub public_port: u16,

    /// Password used to derive the scrypt key that encrypts secret payloads
    /// at rest.
    #[arg(long, env = "SECRET_ENCRYPTION_PASSWORD")]
    pub secret_encryption_password: String,
}

/// Bounds on the fan-out coordinator used for cascade deletes and other
/// batched Kubernetes/Helm operations.
#[derive(Parser, Debug, Clone)]
pub struct CascadeArgs {
    /// Max number of concurrently in-flight fan-out tasks. Defaults to the
    /// number of available CPUs.
    #[arg(long, env = "CASCADE_MAX_CONCURRENCY")]
    pub cascade_max_concurrency: Option<usize>,
}

impl CascadeArgs {
    pub fn max_concurrency(&self) -> usize {
        self.cascade_max_concurrency.unwrap_or_else(num_cpus::get).max(1)
    }
}
