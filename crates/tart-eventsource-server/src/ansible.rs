//! Stand-in dispatcher for running the transport on its own.

use dashmap::DashMap;
use tart_eventsource::{Ansible, DomainRegistry, Receptionist};
use tracing::info;

/// Logs every announced domain and remembers its receptionist.
#[derive(Debug, Default)]
pub struct LoggingAnsible {
    domains: DashMap<String, Receptionist>,
}

impl LoggingAnsible {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every domain announced so far with its receptionist.
    pub fn routes(&self) -> Vec<(String, Receptionist)> {
        self.domains
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Forget every domain that no longer has a stream in `registry`.
    ///
    /// The transport registers a stream before announcing its domain, so a
    /// remembered domain missing from the registry has disconnected.
    pub fn prune(&self, registry: &DomainRegistry) -> usize {
        let gone: Vec<String> = self
            .domains
            .iter()
            .filter(|entry| !registry.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for domain in &gone {
            self.unregister_domain(domain);
        }
        gone.len()
    }
}

impl Ansible for LoggingAnsible {
    fn register_domain(&self, domain: &str, receptionist: Receptionist) {
        info!(domain = %domain, "Domain registered");
        self.domains.insert(domain.to_string(), receptionist);
    }

    fn unregister_domain(&self, domain: &str) {
        info!(domain = %domain, "Domain unregistered");
        self.domains.remove(domain);
    }
}
