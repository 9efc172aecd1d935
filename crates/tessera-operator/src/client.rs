//! The narrow platform boundary the reconcile driver runs against: read,
//! create and update a named, namespaced object.
//!
//! [`Client`] is the production implementation on top of [`kube::Client`];
//! tests use an in-memory implementation of [`ObjectStore`].

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Resource, ResourceExt, api::PostParams};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to get {kind} [{name}]"))]
    Get {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to create {kind} [{name}]"))]
    Create {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to update {kind} [{name}]"))]
    Update {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("{kind} [{name}] has no namespace associated"))]
    MissingNamespace { kind: String, name: String },
}

/// Bounds shared by every object kind the engine stores: a namespaced,
/// serializable Kubernetes resource with static type information.
pub trait StoredObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// The boundary operations the engine consumes from the platform.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the object by name, distinguishing "not found" from failure.
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: StoredObject>(&self, resource: &K) -> Result<()>;

    async fn update<K: StoredObject>(&self, resource: &K) -> Result<()>;
}

/// Kubernetes-backed [`ObjectStore`], wrapping a [`kube::Client`] and the
/// write parameters shared by all requests.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    post_params: PostParams,
}

impl Client {
    pub fn new(client: kube::Client, field_manager: Option<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager,
                ..PostParams::default()
            },
        }
    }

    fn namespaced_api<K: StoredObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for Client {
    async fn get<K: StoredObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.namespaced_api::<K>(namespace)
            .get_opt(name)
            .await
            .context(GetSnafu {
                kind: kind_of::<K>(),
                name,
            })
    }

    async fn create<K: StoredObject>(&self, resource: &K) -> Result<()> {
        let name = resource.name_any();
        let namespace = namespace_of(resource)?;
        self.namespaced_api::<K>(&namespace)
            .create(&self.post_params, resource)
            .await
            .context(CreateSnafu {
                kind: kind_of::<K>(),
                name,
            })?;
        Ok(())
    }

    async fn update<K: StoredObject>(&self, resource: &K) -> Result<()> {
        let name = resource.name_any();
        let namespace = namespace_of(resource)?;
        self.namespaced_api::<K>(&namespace)
            .replace(&name, &self.post_params, resource)
            .await
            .context(UpdateSnafu {
                kind: kind_of::<K>(),
                name,
            })?;
        Ok(())
    }
}

pub(crate) fn kind_of<K: StoredObject>() -> String {
    K::kind(&()).into_owned()
}

fn namespace_of<K: StoredObject>(resource: &K) -> Result<String> {
    resource.namespace().context(MissingNamespaceSnafu {
        kind: kind_of::<K>(),
        name: resource.name_any(),
    })
}
