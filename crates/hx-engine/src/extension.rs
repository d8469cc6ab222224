//! Extension Registry
//!
//! Named hook bundles that can observe or veto events, rewrite responses,
//! provide swap styles and encode parameters. The registry is an explicit
//! service handed to each engine; clones share the same table.

use crate::engine::Engine;
use crate::error::{ExtensionError, RegistryError};
use hx_dom::{DomTree, Event, NodeId};
use hx_net::Request;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of [`Extension::on_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventVerdict {
    #[default]
    Continue,
    /// Cancel the event (and whatever it guards)
    Veto,
}

/// Extension hooks. Every hook has a no-op default.
///
/// Hooks that receive the DOM run while the engine holds it; they must not
/// call back into the engine.
pub trait Extension {
    /// Called once per engine, before the first other hook
    fn init(&self, _engine: &Engine) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Observe every event dispatched on an element that enables this extension
    fn on_event(&self, _event: &mut Event) -> Result<EventVerdict, ExtensionError> {
        Ok(EventVerdict::Continue)
    }

    /// Rewrite a response body before it is parsed
    fn transform_response(&self, _text: &str, _element: NodeId) -> Result<Option<String>, ExtensionError> {
        Ok(None)
    }

    /// Whether this extension implements swap style `name`
    fn is_custom_swap_style(&self, _name: &str) -> bool {
        false
    }

    /// Perform a custom swap. Return the inserted nodes, or `None` if not handled.
    fn handle_swap(
        &self,
        _style: &str,
        _tree: &mut DomTree,
        _target: NodeId,
        _fragment: &[NodeId],
    ) -> Result<Option<Vec<NodeId>>, ExtensionError> {
        Ok(None)
    }

    /// Produce the request body (and adjust headers). `None` keeps the default encoding.
    fn encode_parameters(
        &self,
        _request: &mut Request,
        _params: &[(String, String)],
        _element: NodeId,
    ) -> Result<Option<Vec<u8>>, ExtensionError> {
        Ok(None)
    }
}

/// Shared handle to an extension
pub type ExtensionHandle = Rc<dyn Extension>;

#[derive(Default)]
struct RegistryInner {
    entries: Vec<(String, ExtensionHandle)>,
    disposed: bool,
}

/// Registry of named extensions, in registration order
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn create() -> Self {
        Self::default()
    }

    /// Register `name`; fails if the name is taken
    pub fn register(&self, name: &str, extension: impl Extension + 'static) -> Result<(), RegistryError> {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return Err(RegistryError::Disposed);
        }
        if inner.entries.iter().any(|(n, _)| n == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        tracing::debug!("Registered extension {}", name);
        inner.entries.push((name.to_string(), Rc::new(extension)));
        Ok(())
    }

    /// Replace an existing extension in place, returning the old one
    pub fn replace(&self, name: &str, extension: impl Extension + 'static) -> Result<ExtensionHandle, RegistryError> {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return Err(RegistryError::Disposed);
        }
        let slot = inner
            .entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(std::mem::replace(&mut slot.1, Rc::new(extension)))
    }

    pub fn unregister(&self, name: &str) -> Result<ExtensionHandle, RegistryError> {
        let mut inner = self.inner.borrow_mut();
        let idx = inner
            .entries
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(inner.entries.remove(idx).1)
    }

    /// Drop every extension; later registrations fail
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.entries.clear();
        inner.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.borrow().entries.iter().any(|(n, _)| n == name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Extensions among `enabled`, in registration order. The returned
    /// handles are cloned so hooks run without the registry borrowed.
    pub fn enabled(&self, enabled: &[String]) -> Vec<(String, ExtensionHandle)> {
        if enabled.is_empty() {
            return Vec::new();
        }
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|(n, _)| enabled.iter().any(|e| e == n))
            .map(|(n, e)| (n.clone(), e.clone()))
            .collect()
    }

    /// Every registered extension
    pub fn all(&self) -> Vec<(String, ExtensionHandle)> {
        self.inner.borrow().entries.clone()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Extension for Named {
        fn is_custom_swap_style(&self, name: &str) -> bool {
            name == self.0
        }
    }

    #[test]
    fn test_register_duplicate_fails() {
        let registry = ExtensionRegistry::create();
        registry.register("a", Named("x")).unwrap();
        assert_eq!(registry.register("a", Named("y")), Err(RegistryError::Duplicate("a".into())));
        assert!(registry.all()[0].1.is_custom_swap_style("x"));
    }

    #[test]
    fn test_replace_requires_existing() {
        let registry = ExtensionRegistry::create();
        assert!(matches!(registry.replace("a", Named("x")), Err(RegistryError::NotFound(_))));
        registry.register("a", Named("x")).unwrap();
        let old = registry.replace("a", Named("y")).unwrap();
        assert!(old.is_custom_swap_style("x"));
        assert!(registry.all()[0].1.is_custom_swap_style("y"));
    }

    #[test]
    fn test_enabled_in_registration_order() {
        let registry = ExtensionRegistry::create();
        registry.register("first", Named("1")).unwrap();
        registry.register("second", Named("2")).unwrap();
        registry.register("third", Named("3")).unwrap();

        let enabled = registry.enabled(&["third".into(), "first".into()]);
        let names: Vec<&str> = enabled.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["first", "third"]);
    }

    #[test]
    fn test_unregister_and_dispose() {
        let registry = ExtensionRegistry::create();
        registry.register("a", Named("x")).unwrap();
        registry.unregister("a").unwrap();
        assert!(registry.unregister("a").is_err());

        let shared = registry.clone();
        registry.dispose();
        assert!(shared.is_disposed());
        assert_eq!(shared.register("b", Named("y")), Err(RegistryError::Disposed));
    }

    #[test]
    fn test_registries_are_isolated() {
        let one = ExtensionRegistry::create();
        let two = ExtensionRegistry::create();
        one.register("a", Named("x")).unwrap();
        assert!(two.is_empty());
    }
}
