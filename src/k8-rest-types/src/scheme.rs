//!
//! # Resource type scheme
//!
//! Maps resource types to their group, version, kind and plural URL path
//! segment.  A process-global registry is preloaded with the built-in
//! Kubernetes kinds; custom kinds are registered at startup.  Lookup of an
//! unregistered kind fails distinctly so callers can fall back to
//! [`guess_path`].
//!
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::Metadata;

/// group/version/kind triple plus the plural path segment used in URLs.
/// the core group is the empty string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl GroupVersionKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
        }
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// `group/version`, or bare version for the core group
    pub fn api_version(&self) -> String {
        if self.is_core() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// statically identified resource type.
/// `GROUP` is the empty string for the core group
pub trait Resource:
    Metadata + Serialize + DeserializeOwned + Debug + Clone + Send + Sync + Sized + 'static
{
    const GROUP: &'static str;
    const VERSION: &'static str;
    const KIND: &'static str;

    fn api_version() -> String {
        if Self::GROUP.is_empty() {
            Self::VERSION.to_owned()
        } else {
            format!("{}/{}", Self::GROUP, Self::VERSION)
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("kind '{kind}' in group '{group}' is not registered")]
    UnknownKind { group: String, kind: String },
}

/// registry of known kinds, keyed by (group, kind)
#[derive(Debug, Default)]
pub struct Scheme {
    kinds: HashMap<(String, String), GroupVersionKind>,
}

static SCHEME: Lazy<RwLock<Scheme>> = Lazy::new(|| RwLock::new(Scheme::with_builtins()));

impl Scheme {
    /// scheme preloaded with the built-in Kubernetes kinds
    pub fn with_builtins() -> Self {
        let mut scheme = Self::default();
        for (group, version, kind, plural) in BUILTIN_KINDS {
            scheme.register(GroupVersionKind::new(*group, *version, *kind, *plural));
        }
        scheme
    }

    pub fn register(&mut self, gvk: GroupVersionKind) {
        self.kinds
            .insert((gvk.group.clone(), gvk.kind.clone()), gvk);
    }

    pub fn lookup(&self, group: &str, kind: &str) -> Result<GroupVersionKind, SchemeError> {
        self.kinds
            .get(&(group.to_owned(), kind.to_owned()))
            .cloned()
            .ok_or_else(|| SchemeError::UnknownKind {
                group: group.to_owned(),
                kind: kind.to_owned(),
            })
    }

    /// plural path segment for a registered kind, or the pluralization
    /// heuristic when unregistered
    pub fn plural(&self, group: &str, kind: &str) -> String {
        match self.lookup(group, kind) {
            Ok(gvk) => gvk.plural,
            Err(_) => guess_path(kind),
        }
    }
}

/// register a custom kind with the global scheme; meant for startup
pub fn register(gvk: GroupVersionKind) {
    SCHEME.write().expect("scheme poisoned").register(gvk);
}

/// typed lookup against the global scheme
pub fn gvk<T: Resource>() -> Result<GroupVersionKind, SchemeError> {
    SCHEME
        .read()
        .expect("scheme poisoned")
        .lookup(T::GROUP, T::KIND)
}

/// apiVersion/kind pair for a type, derived without registry access
pub fn vk<T: Resource>() -> (String, String) {
    (T::api_version(), T::KIND.to_owned())
}

/// string lookup against the global scheme
pub fn lookup(group: &str, kind: &str) -> Result<GroupVersionKind, SchemeError> {
    SCHEME.read().expect("scheme poisoned").lookup(group, kind)
}

/// plural path segment via the global scheme, falling back to [`guess_path`]
pub fn plural(group: &str, kind: &str) -> String {
    SCHEME.read().expect("scheme poisoned").plural(group, kind)
}

/// heuristic English pluralization of a kind, used when only a kind
/// string is known and the scheme has no entry for it
pub fn guess_path(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{lower}es");
    }
    if lower.ends_with('y') {
        let before = lower.as_bytes()[lower.len().saturating_sub(2)];
        if !matches!(before, b'a' | b'e' | b'i' | b'o' | b'u') {
            return format!("{}ies", &lower[..lower.len() - 1]);
        }
    }
    format!("{lower}s")
}

const BUILTIN_KINDS: &[(&str, &str, &str, &str)] = &[
    ("", "v1", "ConfigMap", "configmaps"),
    ("", "v1", "Endpoints", "endpoints"),
    ("", "v1", "Event", "events"),
    ("", "v1", "LimitRange", "limitranges"),
    ("", "v1", "Namespace", "namespaces"),
    ("", "v1", "Node", "nodes"),
    ("", "v1", "PersistentVolume", "persistentvolumes"),
    ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
    ("", "v1", "Pod", "pods"),
    ("", "v1", "ReplicationController", "replicationcontrollers"),
    ("", "v1", "ResourceQuota", "resourcequotas"),
    ("", "v1", "Secret", "secrets"),
    ("", "v1", "Service", "services"),
    ("", "v1", "ServiceAccount", "serviceaccounts"),
    ("apps", "v1", "ControllerRevision", "controllerrevisions"),
    ("apps", "v1", "DaemonSet", "daemonsets"),
    ("apps", "v1", "Deployment", "deployments"),
    ("apps", "v1", "ReplicaSet", "replicasets"),
    ("apps", "v1", "StatefulSet", "statefulsets"),
    ("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers"),
    ("batch", "v1", "CronJob", "cronjobs"),
    ("batch", "v1", "Job", "jobs"),
    ("apiextensions.k8s.io", "v1", "CustomResourceDefinition", "customresourcedefinitions"),
    ("coordination.k8s.io", "v1", "Lease", "leases"),
    ("discovery.k8s.io", "v1", "EndpointSlice", "endpointslices"),
    ("networking.k8s.io", "v1", "Ingress", "ingresses"),
    ("networking.k8s.io", "v1", "IngressClass", "ingressclasses"),
    ("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies"),
    ("policy", "v1", "PodDisruptionBudget", "poddisruptionbudgets"),
    ("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles"),
    ("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding", "clusterrolebindings"),
    ("rbac.authorization.k8s.io", "v1", "Role", "roles"),
    ("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
    ("storage.k8s.io", "v1", "StorageClass", "storageclasses"),
    ("storage.k8s.io", "v1", "VolumeAttachment", "volumeattachments"),
];

#[cfg(test)]
mod test {

    use super::*;
    use crate::core::Pod;

    #[test]
    fn test_builtin_lookup() {
        let gvk = gvk::<Pod>().expect("pod registered");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.plural, "pods");
        assert_eq!(gvk.api_version(), "v1");
    }

    #[test]
    fn test_group_api_version() {
        let gvk = lookup("apps", "Deployment").expect("deployment registered");
        assert_eq!(gvk.api_version(), "apps/v1");
        assert_eq!(gvk.plural, "deployments");
    }

    #[test]
    fn test_unknown_kind_fails_distinctly() {
        let err = lookup("example.com", "Widget").unwrap_err();
        assert!(matches!(err, SchemeError::UnknownKind { .. }));
    }

    #[test]
    fn test_register_custom_kind() {
        register(GroupVersionKind::new("example.com", "v1alpha1", "Widget2", "widget2s"));
        let gvk = lookup("example.com", "Widget2").expect("registered");
        assert_eq!(gvk.version, "v1alpha1");
    }

    #[test]
    fn test_guess_path() {
        assert_eq!(guess_path("Pod"), "pods");
        assert_eq!(guess_path("Ingress"), "ingresses");
        assert_eq!(guess_path("NetworkPolicy"), "networkpolicies");
        assert_eq!(guess_path("Gateway"), "gateways");
        assert_eq!(guess_path("Box"), "boxes");
        assert_eq!(guess_path("Branch"), "branches");
    }

    #[test]
    fn test_plural_falls_back_to_guess() {
        assert_eq!(plural("example.com", "Gadget"), "gadgets");
    }
}
