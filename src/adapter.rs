//! Host framework registration
//!
//! The host bidding framework owns an analytics-adapter registry. This module
//! only models the registration record and the registry seam; the host's own
//! adapter base behavior lives on the other side of [`AdapterRegistry`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ReporterConfig;

/// Adapter object handed to the host framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsAdapter {
    /// Global name the host exposes the adapter under
    pub global: String,
    /// Host analytics adapter type
    pub analytics_type: String,
}

/// Registration record: adapter plus its code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRegistration {
    pub code: String,
    pub adapter: AnalyticsAdapter,
}

impl AdapterRegistration {
    pub fn from_config(config: &ReporterConfig) -> Self {
        Self {
            code: config.adapter_code.clone(),
            adapter: AnalyticsAdapter {
                global: config.global_name.clone(),
                analytics_type: config.analytics_type.clone(),
            },
        }
    }
}

/// The host framework's analytics adapter registry
pub trait AdapterRegistry {
    fn register_analytics_adapter(&mut self, registration: AdapterRegistration);
}

/// Registry that keeps registrations in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    registrations: Vec<AdapterRegistration>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> &[AdapterRegistration] {
        &self.registrations
    }

    pub fn get(&self, code: &str) -> Option<&AdapterRegistration> {
        self.registrations.iter().find(|r| r.code == code)
    }
}

impl AdapterRegistry for InMemoryRegistry {
    fn register_analytics_adapter(&mut self, registration: AdapterRegistration) {
        info!(code = %registration.code, global = %registration.adapter.global, "analytics adapter registered");
        self.registrations.retain(|r| r.code != registration.code);
        self.registrations.push(registration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registration_from_default_config() {
        let registration = AdapterRegistration::from_config(&ReporterConfig::default());

        assert_eq!(
            registration,
            AdapterRegistration {
                code: "yieldbirdViewability".to_string(),
                adapter: AnalyticsAdapter {
                    global: "YieldbirdViewability".to_string(),
                    analytics_type: "endpoint".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_reregistering_replaces_by_code() {
        let mut registry = InMemoryRegistry::new();
        let registration = AdapterRegistration::from_config(&ReporterConfig::default());

        registry.register_analytics_adapter(registration.clone());
        registry.register_analytics_adapter(registration);

        assert_eq!(registry.registrations().len(), 1);
        assert!(registry.get("yieldbirdViewability").is_some());
    }
}
