//! Route-prefix registry for auth subsystem plugins.
//!
//! Routes may not shadow each other: registration rejects any route that is
//! a prefix of (or prefixed by) an already registered one. Dispatch picks
//! the longest registered prefix of the request path.

use std::sync::Arc;

use tracing::info;

use crate::handlers::Reply;

/// One mountable auth subsystem.
pub trait AuthPlugin: Send + Sync {
    fn routes(&self) -> Vec<&'static str>;
    fn handle(&self, path: &str, payload: &str) -> Reply;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("route {route} conflicts with existing {existing}")]
    RouteConflict { route: String, existing: String },
}

#[derive(Default)]
pub struct ServiceRegistry {
    entries: Vec<(String, Arc<dyn AuthPlugin>)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn AuthPlugin>) -> Result<(), RegistryError> {
        let routes = plugin.routes();
        for route in &routes {
            for (existing, _) in &self.entries {
                if route.starts_with(existing.as_str()) || existing.starts_with(route) {
                    return Err(RegistryError::RouteConflict {
                        route: (*route).to_string(),
                        existing: existing.clone(),
                    });
                }
            }
        }
        for route in routes {
            info!(route, "registered auth route");
            self.entries.push((route.to_string(), plugin.clone()));
        }
        Ok(())
    }

    /// Longest registered prefix wins; unmatched paths get a 404 triple.
    pub fn dispatch(&self, path: &str, payload: &str) -> Reply {
        self.entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, plugin)| plugin.handle(path, payload))
            .unwrap_or_else(|| Reply::error("404", "Unsupported endpoint", path))
    }

    pub fn routes(&self) -> Vec<&str> {
        self.entries.iter().map(|(route, _)| route.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static [&'static str]);

    impl AuthPlugin for Echo {
        fn routes(&self) -> Vec<&'static str> {
            self.0.to_vec()
        }

        fn handle(&self, path: &str, _payload: &str) -> Reply {
            Reply::error("200", "echo", path)
        }
    }

    #[test]
    fn registers_and_dispatches() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(Echo(&["/login", "/register"]))).unwrap();

        let reply = registry.dispatch("/login", "{}");
        assert_eq!(reply.status, "200");
        assert_eq!(reply.status_extended_info, "/login");

        let reply = registry.dispatch("/nowhere", "{}");
        assert_eq!(reply.status, "404");
    }

    #[test]
    fn prefix_conflicts_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(Echo(&["/login"]))).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Echo(&["/login/other"]))),
            Err(RegistryError::RouteConflict { .. })
        ));
        assert!(matches!(
            registry.register(Arc::new(Echo(&["/log"]))),
            Err(RegistryError::RouteConflict { .. })
        ));
    }

    #[test]
    fn longest_prefix_wins() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(Echo(&["/a-long-route"]))).unwrap();
        registry.register(Arc::new(Echo(&["/a"]))).unwrap_err();

        registry.register(Arc::new(Echo(&["/b"]))).unwrap();
        let reply = registry.dispatch("/a-long-route/sub", "{}");
        assert_eq!(reply.status_extended_info, "/a-long-route/sub");
    }
}
