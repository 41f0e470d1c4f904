//! The extension registry.
//!
//! Built once at startup and read-only afterwards. Extensions are kept in
//! ascending priority order (ties broken by name) and indexed by name;
//! each one is bound to the single matcher its dissector tasks share.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::amqp::AmqpExtension;
use crate::config::MatcherConfig;
use crate::error::{Result, ScopeError};
use crate::extension::Extension;
use crate::kafka::KafkaExtension;
use crate::matcher::RequestResponseMatcher;
use crate::metrics::ScopeMetrics;
use crate::model::{Entry, OutputItem, ProtocolDescriptor};

/// An extension together with its matcher.
#[derive(Clone)]
pub struct RegisteredExtension {
    pub extension: Arc<dyn Extension>,
    pub matcher: Arc<RequestResponseMatcher>,
}

impl RegisteredExtension {
    #[must_use]
    pub fn protocol(&self) -> &'static ProtocolDescriptor {
        self.extension.protocol()
    }
}

impl std::fmt::Debug for RegisteredExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredExtension")
            .field("protocol", &self.protocol().name)
            .field("pending", &self.matcher.pending_len())
            .finish()
    }
}

/// Ordered set of protocol extensions.
#[derive(Debug)]
pub struct ExtensionRegistry {
    ordered: Vec<RegisteredExtension>,
    by_name: HashMap<&'static str, usize>,
}

impl ExtensionRegistry {
    /// Register `extensions`, creating one matcher for each.
    #[must_use]
    pub fn new(
        extensions: Vec<Arc<dyn Extension>>,
        matcher_config: &MatcherConfig,
        metrics: &Arc<ScopeMetrics>,
    ) -> Self {
        let mut ordered: Vec<RegisteredExtension> = extensions
            .into_iter()
            .map(|extension| {
                let matcher = Arc::new(extension.new_matcher(matcher_config, Arc::clone(metrics)));
                RegisteredExtension { extension, matcher }
            })
            .collect();
        ordered.sort_by(|a, b| {
            let (a, b) = (a.protocol(), b.protocol());
            (a.priority, a.name).cmp(&(b.priority, b.name))
        });

        let by_name = ordered
            .iter()
            .enumerate()
            .map(|(i, registered)| (registered.protocol().name, i))
            .collect();

        Self { ordered, by_name }
    }

    /// Registry with every built-in extension.
    #[must_use]
    pub fn with_defaults(matcher_config: &MatcherConfig, metrics: &Arc<ScopeMetrics>) -> Self {
        let extensions: Vec<Arc<dyn Extension>> =
            vec![Arc::new(AmqpExtension::new()), Arc::new(KafkaExtension::new())];
        Self::new(extensions, matcher_config, metrics)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredExtension> {
        self.by_name.get(name).map(|&i| &self.ordered[i])
    }

    /// Look up `name`, failing with [`ScopeError::UnknownProtocol`].
    ///
    /// # Errors
    ///
    /// Returns an error if no extension is registered under `name`.
    pub fn require(&self, name: &str) -> Result<&RegisteredExtension> {
        self.get(name)
            .ok_or_else(|| ScopeError::UnknownProtocol(name.to_string()))
    }

    /// Extensions in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredExtension> {
        self.ordered.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.ordered.iter().map(|r| r.protocol().name).collect()
    }

    #[must_use]
    pub fn matchers(&self) -> Vec<Arc<RequestResponseMatcher>> {
        self.ordered.iter().map(|r| Arc::clone(&r.matcher)).collect()
    }

    /// Union of every extension's query macros.
    #[must_use]
    pub fn macros(&self) -> BTreeMap<String, String> {
        self.ordered
            .iter()
            .flat_map(|r| r.extension.macros())
            .collect()
    }

    /// Liveness replies in dispatch order.
    #[must_use]
    pub fn ping_all(&self) -> Vec<&'static str> {
        self.ordered.iter().map(|r| r.extension.ping()).collect()
    }

    /// Analyze an item with the extension that produced it.
    #[must_use]
    pub fn analyze(&self, item: &OutputItem) -> Option<Entry> {
        self.get(item.protocol.name)
            .map(|r| r.extension.analyze(item, None, None))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::with_defaults(&MatcherConfig::default(), &Arc::new(ScopeMetrics::new()))
    }

    #[test]
    fn test_priority_order() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["amqp", "kafka"]);
        assert_eq!(registry.ping_all(), vec!["pong amqp", "pong kafka"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = registry();
        assert_eq!(registry.get("kafka").unwrap().protocol().priority, 2);
        assert!(registry.get("http").is_none());
        assert!(matches!(
            registry.require("http"),
            Err(ScopeError::UnknownProtocol(name)) if name == "http"
        ));
    }

    #[test]
    fn test_each_extension_has_its_own_matcher() {
        let registry = registry();
        let amqp = registry.get("amqp").unwrap();
        let kafka = registry.get("kafka").unwrap();
        assert!(!Arc::ptr_eq(&amqp.matcher, &kafka.matcher));
        assert_eq!(kafka.matcher.protocol().name, "kafka");
        assert_eq!(registry.matchers().len(), 2);
    }

    #[test]
    fn test_macros_are_merged() {
        let macros = registry().macros();
        assert_eq!(macros.get("amqp").map(String::as_str), Some("proto.name == \"amqp\""));
        assert!(macros.contains_key("kafka"));
    }

    #[test]
    fn test_order_ignores_registration_order() {
        let extensions: Vec<Arc<dyn Extension>> =
            vec![Arc::new(KafkaExtension::new()), Arc::new(AmqpExtension::new())];
        let registry = ExtensionRegistry::new(
            extensions,
            &MatcherConfig::default(),
            &Arc::new(ScopeMetrics::new()),
        );
        assert_eq!(registry.names(), vec!["amqp", "kafka"]);
    }
}
