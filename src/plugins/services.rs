//! Service discovery helpers shared by the plugins.

use std::collections::HashSet;

use crate::tools::{is_port_listening, listening_ports};
use crate::types::{ServiceInfo, ServiceStatus};

/// A service a manifest or source scan says the project can start.
#[derive(Debug, Clone)]
pub struct DeclaredService {
    pub name: String,
    pub framework: &'static str,
    pub port: u16,
    pub start_command: Option<String>,
    pub config_file: Option<String>,
}

impl DeclaredService {
    /// Resolves the live status by probing the declared port.
    pub async fn resolve(self, language: &str) -> ServiceInfo {
        let status = if is_port_listening(self.port).await {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        };
        ServiceInfo {
            id: format!("{language}-{}-{}", slug(&self.name), self.port),
            name: self.name,
            language: language.to_string(),
            framework: self.framework.to_string(),
            port: self.port,
            status,
            start_command: self.start_command,
            config_file: self.config_file,
        }
    }
}

/// Declared services with live status, followed by anything listening on
/// `default_ports` that no declared service already claims.
pub async fn collect_services(
    language: &str,
    declared: Vec<DeclaredService>,
    default_ports: &[u16],
) -> Vec<ServiceInfo> {
    let mut services = Vec::with_capacity(declared.len());
    for service in declared {
        services.push(service.resolve(language).await);
    }

    let claimed: HashSet<u16> = services.iter().map(|s| s.port).collect();
    let unclaimed: Vec<u16> = default_ports
        .iter()
        .copied()
        .filter(|port| !claimed.contains(port))
        .collect();

    for port in listening_ports(&unclaimed).await {
        services.push(ServiceInfo {
            id: format!("{language}-port-{port}"),
            name: format!("{language} service on port {port}"),
            language: language.to_string(),
            framework: "unknown".to_string(),
            port,
            status: ServiceStatus::Running,
            start_command: None,
            config_file: None,
        });
    }
    services
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
