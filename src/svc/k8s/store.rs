//! # Store module
//!
//! This module provide the object read/write boundary used by the provisioner.
//! Every call is a remote call to the kubernetes api which could fail with a
//! "not found", a "conflict" or a transport error.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::{
    api::{
        ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams,
    },
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Object trait

/// groups bounds needed to move a typed resource through a [`Store`]
pub trait Object:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Blanklet implementation of [`Object`]
impl<T> Object for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

// -----------------------------------------------------------------------------
// Store trait

/// provides typed access to kubernetes objects, namespaced or not
#[async_trait]
pub trait Store: Send + Sync {
    /// returns the object or `None` if it does not exist
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str)
        -> Result<Option<K>, kube::Error>;

    async fn create<K: Object>(&self, obj: &K) -> Result<K, kube::Error>;

    /// replace the object, the resource version makes the write conditional
    async fn replace<K: Object>(&self, obj: &K) -> Result<K, kube::Error>;

    /// replace the status sub-resource, conditional on the resource version
    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, kube::Error>;

    async fn patch<K: Object>(&self, obj: &K, patch: json_patch::Patch)
        -> Result<K, kube::Error>;

    async fn delete<K: Object>(&self, namespace: Option<&str>, name: &str)
        -> Result<(), kube::Error>;
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the error is a "not found" answer of the api server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(err) if err.code == 404)
}

fn to_dynamic<K: Object>(obj: &K) -> Result<DynamicObject, kube::Error> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(kube::Error::SerdeError)
}

fn from_dynamic<K: Object>(obj: DynamicObject) -> Result<K, kube::Error> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(kube::Error::SerdeError)
}

// -----------------------------------------------------------------------------
// KubeStore structure

/// [`Store`] implementation backed by the kubernetes api
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl From<Client> for KubeStore {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

impl KubeStore {
    fn api<K: Object>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let api_resource = ApiResource::erase::<K>(&());

        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.to_owned(), namespace, &api_resource),
            None => Api::all_with(self.client.to_owned(), &api_resource),
        }
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, kube::Error> {
        debug!(kind = %K::kind(&()), namespace = ?namespace, name = name, "execute a request to retrieve object");
        match self.api::<K>(namespace).get(name).await {
            Ok(obj) => Ok(Some(from_dynamic(obj)?)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, kube::Error> {
        let namespace = obj.namespace();

        debug!(kind = %K::kind(&()), namespace = ?namespace, name = obj.name_any(), "execute a request to create object");
        let created = self
            .api::<K>(namespace.as_deref())
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await?;

        from_dynamic(created)
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K, kube::Error> {
        let namespace = obj.namespace();
        let name = obj.name_any();

        debug!(kind = %K::kind(&()), namespace = ?namespace, name = &name, "execute a request to replace object");
        let replaced = self
            .api::<K>(namespace.as_deref())
            .replace(&name, &PostParams::default(), &to_dynamic(obj)?)
            .await?;

        from_dynamic(replaced)
    }

    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, kube::Error> {
        let namespace = obj.namespace();
        let name = obj.name_any();
        let data = serde_json::to_vec(obj).map_err(kube::Error::SerdeError)?;

        debug!(kind = %K::kind(&()), namespace = ?namespace, name = &name, "execute a request to replace object's status");
        let replaced = self
            .api::<K>(namespace.as_deref())
            .replace_status(&name, &PostParams::default(), data)
            .await?;

        from_dynamic(replaced)
    }

    async fn patch<K: Object>(
        &self,
        obj: &K,
        patch: json_patch::Patch,
    ) -> Result<K, kube::Error> {
        let namespace = obj.namespace();
        let name = obj.name_any();

        if patch.0.is_empty() {
            debug!(kind = %K::kind(&()), namespace = ?namespace, name = &name, "skip patch request on object, no operation to apply");
            return Ok(obj.to_owned());
        }

        debug!(kind = %K::kind(&()), namespace = ?namespace, name = &name, "execute patch request on object");
        let patched = self
            .api::<K>(namespace.as_deref())
            .patch(&name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?;

        from_dynamic(patched)
    }

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), kube::Error> {
        debug!(kind = %K::kind(&()), namespace = ?namespace, name = name, "execute a request to delete object");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
    }
}

// -----------------------------------------------------------------------------
// In-memory store used by tests
