use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::{Deployment, StatefulSet},
        core::v1::{ConfigMap, Service},
    },
};
use kube::{
    Api, CustomResourceExt, Resource,
    runtime::{Controller, watcher},
};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tessera_operator::{
    cli::{Command, Opts},
    client::Client,
    controller,
    crd::TesseraCluster,
};

const FIELD_MANAGER: &str = "tessera-operator";
const LOG_ENV_VAR: &str = "TESSERA_OPERATOR_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("failed to serialize CRD"))]
    SerializeCrd { source: serde_yaml::Error },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();

    match opts.command {
        Command::Crd => {
            let crd = serde_yaml::to_string(&TesseraCluster::crd()).context(SerializeCrdSnafu)?;
            print!("{crd}");
        }
        Command::Run { watch_namespace } => run(watch_namespace).await?,
    }

    Ok(())
}

async fn run(watch_namespace: Option<String>) -> Result<(), Error> {
    initialize_logging();

    let client = kube::Client::try_default().await.context(CreateClientSnafu)?;
    let context = Arc::new(controller::Context {
        store: Client::new(client.clone(), Some(FIELD_MANAGER.to_owned())),
    });

    info!(namespace = watch_namespace.as_deref(), "starting controller");

    Controller::new(
        scoped_api::<TesseraCluster>(&client, watch_namespace.as_deref()),
        watcher::Config::default(),
    )
    .owns(
        scoped_api::<StatefulSet>(&client, watch_namespace.as_deref()),
        watcher::Config::default(),
    )
    .owns(
        scoped_api::<Deployment>(&client, watch_namespace.as_deref()),
        watcher::Config::default(),
    )
    .owns(
        scoped_api::<ConfigMap>(&client, watch_namespace.as_deref()),
        watcher::Config::default(),
    )
    .owns(
        scoped_api::<Service>(&client, watch_namespace.as_deref()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(controller::reconcile, controller::error_policy, context)
    .for_each(|result| async move {
        match result {
            Ok((object, _action)) => debug!(object = %object, "reconciled"),
            Err(error) => warn!(%error, "controller error"),
        }
    })
    .await;

    Ok(())
}

fn scoped_api<K>(client: &kube::Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

fn initialize_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
