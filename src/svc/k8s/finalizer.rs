//! # Finalizer module
//!
//! This module provide helpers methods to interact with kubernetes' resource
//! finalizer

use kube::Resource;

/// returns if there is the given finalizer on the resource
pub fn contains<T>(obj: &T, finalizer: &str) -> bool
where
    T: Resource,
{
    obj.meta()
        .finalizers
        .iter()
        .flatten()
        .any(|f| finalizer == f)
}

/// add finalizer to the resource
pub fn add<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    if !contains(&obj, finalizer) {
        obj.meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(finalizer.to_string());
    }

    obj
}

/// remove finalizer from the resource
pub fn remove<T>(mut obj: T, finalizer: &str) -> T
where
    T: Resource,
{
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
    }

    obj
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ConfigMap;

    use super::*;

    const FINALIZER: &str = "example.com/finalizer";

    #[test]
    fn add_is_idempotent_and_remove_keeps_others() {
        let mut obj = ConfigMap::default();
        obj.metadata.finalizers = Some(vec!["other".to_string()]);

        let obj = add(add(obj, FINALIZER), FINALIZER);
        assert!(contains(&obj, FINALIZER));
        assert_eq!(obj.metadata.finalizers.as_ref().map(Vec::len), Some(2));

        let obj = remove(obj, FINALIZER);
        assert!(!contains(&obj, FINALIZER));
        assert_eq!(obj.metadata.finalizers, Some(vec!["other".to_string()]));
    }
}
