//! # Secret module
//!
//! This module provide the certificates used to secure the xDS connection
//! between the control plane and the data plane. Both secrets share the same
//! certificate authority, so they are always generated together.

use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::ResourceExt;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa};
use tracing::info;

use crate::svc::{
    k8s::store::Store,
    provisioner::{
        failure::StepError,
        is_owned_by,
        model::Instance,
        objects::{self, contour_cert_name, contour_name, envoy_cert_name, envoy_name, metadata},
    },
};

// -----------------------------------------------------------------------------
// Constants

pub const CA_CERTIFICATE_KEY: &str = "ca.crt";
pub const CERTIFICATE_KEY: &str = "tls.crt";
pub const PRIVATE_KEY_KEY: &str = "tls.key";

const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

// -----------------------------------------------------------------------------
// Bundle structure

/// pem encoded certificates of an instance
#[derive(Clone, Debug)]
pub struct Bundle {
    pub ca: String,
    pub contour: (String, String),
    pub envoy: (String, String),
}

/// returns the dns names under which a component is reachable in the cluster
fn dns_names(instance: &Instance, component: &str, service: &str) -> Vec<String> {
    let namespace = &instance.namespace;

    vec![
        component.to_string(),
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.cluster.local"),
    ]
}

fn leaf(names: Vec<String>, common_name: &str, ca: &Certificate) -> Result<(String, String), StepError> {
    let mut params = CertificateParams::new(names);
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let certificate = Certificate::from_params(params)?;
    Ok((
        certificate.serialize_pem_with_signer(ca)?,
        certificate.serialize_private_key_pem(),
    ))
}

/// generate a certificate authority and the leaves of both planes
pub fn generate(instance: &Instance) -> Result<Bundle, StepError> {
    let mut params = CertificateParams::new(vec![]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(
        DnType::CommonName,
        format!("{}-{}-ca", env!("CARGO_PKG_NAME"), instance.name),
    );

    let ca = Certificate::from_params(params)?;
    let contour = leaf(
        dns_names(instance, "contour", &contour_name(instance)),
        "contour",
        &ca,
    )?;
    let envoy = leaf(
        dns_names(instance, "envoy", &envoy_name(instance)),
        "envoy",
        &ca,
    )?;

    Ok(Bundle {
        ca: ca.serialize_pem()?,
        contour,
        envoy,
    })
}

pub fn secret(instance: &Instance, name: String, ca: &str, (certificate, key): &(String, String)) -> Secret {
    Secret {
        metadata: metadata(instance, true, name),
        type_: Some(SECRET_TYPE_TLS.to_string()),
        data: Some(BTreeMap::from([
            (CA_CERTIFICATE_KEY.to_string(), ByteString(ca.as_bytes().to_vec())),
            (CERTIFICATE_KEY.to_string(), ByteString(certificate.as_bytes().to_vec())),
            (PRIVATE_KEY_KEY.to_string(), ByteString(key.as_bytes().to_vec())),
        ])),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// create the secrets when one of them is missing, existing and complete
/// secrets are never rotated
pub async fn ensure<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    let namespace = Some(instance.namespace.as_str());
    let names = [contour_cert_name(instance), envoy_cert_name(instance)];

    let mut existing = vec![];
    for name in &names {
        existing.push(store.get::<Secret>(namespace, name).await?);
    }

    if existing.iter().all(Option::is_some) {
        return Ok(());
    }

    for secret in existing.iter().flatten() {
        if !is_owned_by(secret.labels(), &instance.namespace, &instance.name) {
            return Err(StepError::NotOwned(format!("Secret/{}", secret.name_any())));
        }
    }

    info!(namespace = &instance.namespace, name = &instance.name, "Generate xDS certificates for gateway");
    let bundle = generate(instance)?;
    let [contour, envoy] = names;
    let desired = [
        secret(instance, contour, &bundle.ca, &bundle.contour),
        secret(instance, envoy, &bundle.ca, &bundle.envoy),
    ];

    for (mut desired, live) in desired.into_iter().zip(existing) {
        match live {
            None => {
                store.create(&desired).await?;
            }
            Some(live) => {
                desired.metadata.resource_version = live.resource_version();
                store.replace(&desired).await?;
            }
        }
    }

    Ok(())
}

pub async fn delete<S: Store>(store: &S, instance: &Instance) -> Result<(), StepError> {
    let namespace = Some(instance.namespace.as_str());

    objects::first_error([
        objects::delete::<_, Secret>(store, instance, namespace, &envoy_cert_name(instance)).await,
        objects::delete::<_, Secret>(store, instance, namespace, &contour_cert_name(instance)).await,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::k8s::store::memory::MemoryStore;

    fn data(secret: &Secret, key: &str) -> String {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|value| String::from_utf8_lossy(&value.0).to_string())
            .expect("key to be present")
    }

    #[test]
    fn bundle_shares_the_authority() {
        let bundle = generate(&Instance::new("default", "edge")).expect("bundle to be generated");

        assert!(bundle.ca.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.contour.0.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.envoy.1.contains("PRIVATE KEY"));
        assert_ne!(bundle.contour.0, bundle.envoy.0);
    }

    #[tokio::test]
    async fn secrets_are_created_once() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");

        ensure(&store, &instance).await.expect("secrets to be created");
        assert_eq!(store.writes(), 2);

        let contour: Secret = store.object(Some("default"), "contourcert-edge").expect("secret");
        let envoy: Secret = store.object(Some("default"), "envoycert-edge").expect("secret");
        assert_eq!(data(&contour, CA_CERTIFICATE_KEY), data(&envoy, CA_CERTIFICATE_KEY));
        assert_eq!(contour.type_.as_deref(), Some(SECRET_TYPE_TLS));

        ensure(&store, &instance).await.expect("secrets to be left untouched");
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn missing_secret_regenerates_both() {
        let store = MemoryStore::default();
        let instance = Instance::new("default", "edge");

        ensure(&store, &instance).await.expect("secrets to be created");
        delete(&store, &instance).await.expect("secrets to be deleted");
        assert_eq!(store.len(), 0);

        ensure(&store, &instance).await.expect("secrets to be created");
        let before: Secret = store.object(Some("default"), "contourcert-edge").expect("secret");
        store
            .delete::<Secret>(Some("default"), "envoycert-edge")
            .await
            .expect("secret to be removed");

        ensure(&store, &instance).await.expect("secrets to be regenerated");
        let contour: Secret = store.object(Some("default"), "contourcert-edge").expect("secret");
        let envoy: Secret = store.object(Some("default"), "envoycert-edge").expect("secret");
        assert_ne!(data(&before, CA_CERTIFICATE_KEY), data(&contour, CA_CERTIFICATE_KEY));
        assert_eq!(data(&contour, CA_CERTIFICATE_KEY), data(&envoy, CA_CERTIFICATE_KEY));
    }
}
