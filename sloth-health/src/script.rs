//! Check script generation
//!
//! The gate only needs *a* payload per service set; how it is produced is up
//! to the [`CheckScriptBuilder`]. [`ShellScriptBuilder`] emits a bash script
//! whose output follows the `CATEGORY:KEY:STATE` marker contract understood
//! by [`crate::predicate::ServiceRegistry`].

use crate::executor::CheckPayload;
use std::collections::BTreeSet;

/// Produces the payload for a set of required services
pub trait CheckScriptBuilder: Send + Sync {
    fn build(&self, services: &BTreeSet<String>) -> CheckPayload;
}

const PREAMBLE: &str = r#"#!/bin/bash

echo "=== Node Health Check ==="
echo "Timestamp: $(date)"

check_service() {
    local service=$1
    if systemctl is-active --quiet "$service"; then
        echo "SERVICE:$service:RUNNING"
    else
        echo "SERVICE:$service:STOPPED"
    fi
}

check_command() {
    local cmd=$1
    if command -v "$cmd" &> /dev/null; then
        echo "COMMAND:$cmd:AVAILABLE"
    else
        echo "COMMAND:$cmd:MISSING"
    fi
}

check_port() {
    local port=$1
    if ss -tuln 2>/dev/null | grep -q ":$port "; then
        echo "PORT:$port:LISTENING"
    else
        echo "PORT:$port:CLOSED"
    fi
}

echo "UPTIME:$(uptime -p)"
echo "LOAD:$(cut -d' ' -f1-3 /proc/loadavg)"
"#;

const DOCKER: &str = r#"
check_service docker
check_command docker
docker version &>/dev/null && echo "DOCKER:VERSION:OK" || echo "DOCKER:VERSION:FAIL"
docker ps &>/dev/null && echo "DOCKER:PS:OK" || echo "DOCKER:PS:FAIL"
"#;

const WIREGUARD: &str = r#"
check_command wg
if [ -f /etc/wireguard/wg0.conf ]; then
    echo "WIREGUARD:CONFIG:EXISTS"
    wg show wg0 &>/dev/null && echo "WIREGUARD:INTERFACE:UP" || echo "WIREGUARD:INTERFACE:DOWN"
else
    echo "WIREGUARD:CONFIG:MISSING"
fi
"#;

const KUBERNETES: &str = r#"
check_command kubectl
if [ -f /root/kube_config_cluster.yml ]; then
    echo "KUBECONFIG:EXISTS"
    export KUBECONFIG=/root/kube_config_cluster.yml
    kubectl get nodes &>/dev/null && echo "KUBERNETES:API:OK" || echo "KUBERNETES:API:FAIL"
else
    echo "KUBECONFIG:MISSING"
fi
"#;

const KUBELET: &str = r#"
check_service kubelet
check_port 10250
"#;

const ETCD: &str = r#"
check_service etcd
check_port 2379
check_port 2380
"#;

const NGINX: &str = r#"
kubectl get svc -n ingress-nginx nginx-ingress-controller &>/dev/null && echo "NGINX:SERVICE:OK" || echo "NGINX:SERVICE:FAIL"
kubectl get pods -n ingress-nginx -l app.kubernetes.io/name=ingress-nginx &>/dev/null && echo "NGINX:PODS:OK" || echo "NGINX:PODS:FAIL"
"#;

const SSH: &str = r#"
check_service ssh
check_port 22
"#;

const EPILOGUE: &str = r#"
echo "=== Health Check Complete ==="
"#;

/// Bash script builder with per-service check sections
#[derive(Debug, Clone, Default)]
pub struct ShellScriptBuilder;

impl ShellScriptBuilder {
    pub fn new() -> Self {
        Self
    }

    fn section(service: &str) -> String {
        match service {
            "docker" => DOCKER.to_string(),
            "wireguard" => WIREGUARD.to_string(),
            "kubernetes" => KUBERNETES.to_string(),
            "kubelet" => KUBELET.to_string(),
            "etcd" => ETCD.to_string(),
            "nginx" => NGINX.to_string(),
            "ssh" => SSH.to_string(),
            other => format!("\ncheck_service {}\n", shell_quote(other)),
        }
    }
}

impl CheckScriptBuilder for ShellScriptBuilder {
    fn build(&self, services: &BTreeSet<String>) -> CheckPayload {
        let mut script = String::from(PREAMBLE);
        for service in services {
            script.push_str(&Self::section(service));
        }
        script.push_str(EPILOGUE);
        CheckPayload::new(script)
    }
}

/// Single-quote a value for bash
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_script_structure() {
        let payload = ShellScriptBuilder::new().build(&services(&[]));
        let script = payload.as_str();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("check_service()"));
        assert!(script.contains("check_port()"));
        assert!(script.contains("Health Check Complete"));
    }

    #[test]
    fn test_sections_emit_predicate_markers() {
        let payload =
            ShellScriptBuilder::new().build(&services(&["docker", "nginx", "wireguard"]));
        let script = payload.as_str();
        assert!(script.contains("DOCKER:PS:OK"));
        assert!(script.contains("check_service docker"));
        assert!(script.contains("NGINX:PODS:OK"));
        assert!(script.contains("WIREGUARD:INTERFACE:UP"));
        assert!(!script.contains("KUBERNETES:API:OK"));
    }

    #[test]
    fn test_unknown_service_uses_generic_check() {
        let payload = ShellScriptBuilder::new().build(&services(&["containerd"]));
        assert!(payload.as_str().contains("check_service 'containerd'"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
