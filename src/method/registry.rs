//! Method registry: decode-time lookup by `(class_id, method_id)`.
//!
//! The registry also precomputes the *reply set* (the union of every
//! registered spec's `responses`), so the channel layer can classify an
//! inbound method as synchronous-reply traffic without consulting the
//! sender's state.
//!
//! The built-in catalog is exposed through [`MethodRegistry::amqp091`],
//! initialized once and read-only afterwards. Custom registries are plain
//! values; build one, register specs, and pass it where a registry is
//! expected.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::method::defs;
use crate::method::spec::{MethodId, MethodSpec};

/// Registry mapping method ids to their static specs.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    /// Specs by `(class_id, method_id)`.
    specs: HashMap<MethodId, &'static MethodSpec>,
    /// Union of all registered response sets.
    replies: HashSet<MethodId>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in AMQP 0-9-1 catalog.
    ///
    /// Built on first use from `method::defs` and immutable afterwards,
    /// so decode paths can share it freely across tasks.
    pub fn amqp091() -> &'static MethodRegistry {
        static REGISTRY: OnceLock<MethodRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let mut registry = MethodRegistry::new();
            for &spec in defs::ALL {
                registry.register(spec);
            }
            registry
        })
    }

    /// Register a spec, returning the previously registered spec for the
    /// same id, if any.
    pub fn register(&mut self, spec: &'static MethodSpec) -> Option<&'static MethodSpec> {
        for &id in spec.responses {
            self.replies.insert(id);
        }
        self.specs.insert(spec.id(), spec)
    }

    /// Look up a spec by class and method id.
    pub fn lookup(&self, class_id: u16, method_id: u16) -> Option<&'static MethodSpec> {
        self.specs.get(&(class_id, method_id)).copied()
    }

    /// Whether the registry knows `id`.
    pub fn contains(&self, id: MethodId) -> bool {
        self.specs.contains_key(&id)
    }

    /// Whether `id` appears in some registered spec's response set, i.e.
    /// whether frames of this method are synchronous-reply traffic.
    pub fn is_reply(&self, id: MethodId) -> bool {
        self.replies.contains(&id)
    }

    /// Number of registered specs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Iterate all registered specs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &'static MethodSpec> + '_ {
        self.specs.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::spec::FieldSpec;
    use crate::wire::WireType;

    static ASK: MethodSpec = MethodSpec {
        class_id: 900,
        method_id: 10,
        name: "Test.Ask",
        fields: &[FieldSpec::new("q", WireType::ShortStr)],
        responses: &[(900, 11)],
    };

    static ANSWER: MethodSpec = MethodSpec {
        class_id: 900,
        method_id: 11,
        name: "Test.Answer",
        fields: &[FieldSpec::new("a", WireType::ShortStr)],
        responses: &[],
    };

    #[test]
    fn test_register_and_lookup() {
        let mut registry = MethodRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register(&ASK).is_none());
        assert!(registry.register(&ANSWER).is_none());
        assert_eq!(registry.len(), 2);

        let spec = registry.lookup(900, 10).unwrap();
        assert_eq!(spec.name, "Test.Ask");
        assert!(registry.lookup(900, 99).is_none());
        assert!(registry.contains((900, 11)));
    }

    #[test]
    fn test_reregistering_returns_previous() {
        let mut registry = MethodRegistry::new();
        registry.register(&ASK);
        let previous = registry.register(&ASK).unwrap();
        assert_eq!(previous.id(), (900, 10));
    }

    #[test]
    fn test_reply_set_is_union_of_responses() {
        let mut registry = MethodRegistry::new();
        registry.register(&ASK);
        registry.register(&ANSWER);

        // The answer is reply traffic; the request is not.
        assert!(registry.is_reply((900, 11)));
        assert!(!registry.is_reply((900, 10)));
    }

    #[test]
    fn test_amqp091_catalog_is_complete() {
        let registry = MethodRegistry::amqp091();
        assert_eq!(registry.len(), defs::ALL.len());

        // Spot checks across classes.
        assert!(registry.contains((10, 10))); // Connection.Start
        assert!(registry.contains((20, 20))); // Channel.Flow
        assert!(registry.contains((60, 71))); // Basic.GetOk
        assert!(registry.contains((85, 10))); // Confirm.Select
        assert!(registry.contains((90, 31))); // Tx.RollbackOk
    }

    #[test]
    fn test_amqp091_reply_classification() {
        let registry = MethodRegistry::amqp091();

        assert!(registry.is_reply((20, 21))); // Channel.FlowOk
        assert!(registry.is_reply((60, 71))); // Basic.GetOk
        assert!(registry.is_reply((60, 72))); // Basic.GetEmpty
        assert!(!registry.is_reply((20, 20))); // Channel.Flow is a request
        assert!(!registry.is_reply((60, 60))); // Basic.Deliver is async traffic
        assert!(!registry.is_reply((60, 40))); // Basic.Publish is async traffic
    }

    #[test]
    fn test_amqp091_every_response_id_is_registered() {
        let registry = MethodRegistry::amqp091();
        for spec in registry.iter() {
            for &id in spec.responses {
                assert!(
                    registry.contains(id),
                    "{} names unregistered response {:?}",
                    spec.name,
                    id
                );
            }
        }
    }

    #[test]
    fn test_amqp091_is_shared() {
        let a = MethodRegistry::amqp091() as *const MethodRegistry;
        let b = MethodRegistry::amqp091() as *const MethodRegistry;
        assert_eq!(a, b);
    }
}
