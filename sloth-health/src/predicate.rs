//! Per-service health predicates over check output
//!
//! Remote check scripts print newline-delimited markers such as
//! `SERVICE:docker:RUNNING` or `KUBERNETES:API:OK`. A service is healthy when
//! the markers its predicate asks for are present. Predicates live in a
//! registry keyed by service name so new services can be added without
//! touching the dispatch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Marker prefix the remote side uses to signal an unrecoverable condition
pub const FATAL_MARKER_PREFIX: &str = "FATAL:";

/// Borrowed view over raw check output
#[derive(Debug, Clone, Copy)]
pub struct CheckOutput<'a> {
    raw: &'a str,
}

impl<'a> CheckOutput<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// True if the output contains `marker` anywhere
    pub fn has_marker(&self, marker: &str) -> bool {
        !marker.is_empty() && self.raw.contains(marker)
    }

    /// Detail of the first `FATAL:` line, if the remote side emitted one
    pub fn fatal_marker(&self) -> Option<String> {
        self.raw
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix(FATAL_MARKER_PREFIX))
            .map(|detail| detail.to_string())
    }
}

/// Health predicate for one service
pub type ServicePredicate = Arc<dyn Fn(&CheckOutput<'_>) -> bool + Send + Sync>;

/// Registry mapping service names to predicates.
///
/// Services without an entry are healthy iff the output contains
/// `SERVICE:<name>:RUNNING`.
#[derive(Clone)]
pub struct ServiceRegistry {
    predicates: HashMap<String, ServicePredicate>,
}

impl ServiceRegistry {
    /// Empty registry; every service falls back to the generic predicate
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    /// Register (or replace) the predicate for `service`
    pub fn register<F>(&mut self, service: impl Into<String>, predicate: F)
    where
        F: Fn(&CheckOutput<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(service.into(), Arc::new(predicate));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<F>(mut self, service: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CheckOutput<'_>) -> bool + Send + Sync + 'static,
    {
        self.register(service, predicate);
        self
    }

    /// Register a predicate that requires every marker in `markers`
    pub fn register_markers(&mut self, service: impl Into<String>, markers: &[&str]) {
        let markers: Vec<String> = markers.iter().map(|m| m.to_string()).collect();
        self.register(service, move |output: &CheckOutput<'_>| {
            markers.iter().all(|m| output.has_marker(m))
        });
    }

    pub fn is_registered(&self, service: &str) -> bool {
        self.predicates.contains_key(service)
    }

    /// Evaluate a single service against the output
    pub fn is_service_healthy(&self, output: &CheckOutput<'_>, service: &str) -> bool {
        match self.predicates.get(service) {
            Some(predicate) => predicate(output),
            None => output.has_marker(&format!("SERVICE:{}:RUNNING", service)),
        }
    }

    /// Evaluate every requested service
    pub fn evaluate(
        &self,
        output: &CheckOutput<'_>,
        services: &BTreeSet<String>,
    ) -> BTreeMap<String, bool> {
        services
            .iter()
            .map(|service| (service.clone(), self.is_service_healthy(output, service)))
            .collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_markers("docker", &["DOCKER:PS:OK", "SERVICE:docker:RUNNING"]);
        registry.register_markers("wireguard", &["WIREGUARD:INTERFACE:UP"]);
        registry.register_markers("kubernetes", &["KUBERNETES:API:OK"]);
        registry.register_markers("kubelet", &["SERVICE:kubelet:RUNNING"]);
        registry.register_markers("nginx", &["NGINX:SERVICE:OK", "NGINX:PODS:OK"]);
        registry
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(raw: &str, service: &str) -> bool {
        ServiceRegistry::default().is_service_healthy(&CheckOutput::new(raw), service)
    }

    #[test]
    fn test_docker_requires_both_markers() {
        assert!(healthy("DOCKER:PS:OK\nSERVICE:docker:RUNNING", "docker"));
        assert!(!healthy("DOCKER:PS:OK\nSERVICE:docker:STOPPED", "docker"));
        assert!(!healthy("SERVICE:docker:RUNNING\nDOCKER:PS:FAIL", "docker"));
    }

    #[test]
    fn test_builtin_services() {
        assert!(healthy("WIREGUARD:CONFIG:EXISTS\nWIREGUARD:INTERFACE:UP", "wireguard"));
        assert!(!healthy("WIREGUARD:INTERFACE:DOWN", "wireguard"));
        assert!(healthy("KUBECONFIG:EXISTS\nKUBERNETES:API:OK", "kubernetes"));
        assert!(!healthy("KUBERNETES:API:FAIL", "kubernetes"));
        assert!(healthy("SERVICE:kubelet:RUNNING\nPORT:10250:LISTENING", "kubelet"));
    }

    #[test]
    fn test_nginx_missing_pods_marker() {
        assert!(!healthy("NGINX:SERVICE:OK", "nginx"));
        assert!(!healthy("NGINX:SERVICE:OK\nNGINX:PODS:FAIL", "nginx"));
        assert!(healthy("NGINX:SERVICE:OK\nNGINX:PODS:OK", "nginx"));
    }

    #[test]
    fn test_generic_service_fallback() {
        assert!(healthy("SERVICE:etcd:RUNNING", "etcd"));
        assert!(!healthy("SERVICE:etcd:STOPPED", "etcd"));
        assert!(!healthy("", "ssh"));
    }

    #[test]
    fn test_predicate_is_idempotent() {
        let registry = ServiceRegistry::default();
        let raw = "DOCKER:PS:OK\nSERVICE:docker:RUNNING\nNGINX:SERVICE:OK";
        let services: BTreeSet<String> = ["docker", "nginx", "etcd"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let first = registry.evaluate(&CheckOutput::new(raw), &services);
        let second = registry.evaluate(&CheckOutput::new(raw), &services);
        assert_eq!(first, second);
        assert_eq!(first["docker"], true);
        assert_eq!(first["nginx"], false);
        assert_eq!(first["etcd"], false);
    }

    #[test]
    fn test_custom_predicate_overrides_fallback() {
        let registry = ServiceRegistry::default()
            .with("etcd", |o: &CheckOutput<'_>| o.has_marker("PORT:2379:LISTENING"));

        assert!(registry.is_registered("etcd"));
        assert!(registry.is_service_healthy(&CheckOutput::new("PORT:2379:LISTENING"), "etcd"));
        assert!(!registry.is_service_healthy(&CheckOutput::new("SERVICE:etcd:RUNNING"), "etcd"));
    }

    #[test]
    fn test_fatal_marker() {
        let output = CheckOutput::new("UPTIME:up 3 days\n  FATAL:KERNEL:unsupported 3.10\n");
        assert_eq!(output.fatal_marker().as_deref(), Some("KERNEL:unsupported 3.10"));
        assert!(CheckOutput::new("SERVICE:docker:RUNNING").fatal_marker().is_none());
    }
}
