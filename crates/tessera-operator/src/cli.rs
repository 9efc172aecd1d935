//! Command line bootstrapping. The declarative cluster spec is the only
//! functional contract; the CLI just prints the CRD or starts the controller.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "tessera-operator",
    author,
    version,
    about = "Kubernetes operator for tessera query engine clusters"
)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Print the TesseraCluster CRD as YAML
    Crd,

    /// Run the operator
    Run {
        /// Namespace to watch; watches all namespaces when not set
        #[arg(long, env = "WATCH_NAMESPACE")]
        watch_namespace: Option<String>,
    },
}
