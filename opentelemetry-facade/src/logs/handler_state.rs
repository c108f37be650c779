use opentelemetry::KeyValue;
use std::borrow::Cow;
use std::sync::Arc;

/// Attributes and group label accumulated by a chain of derivations.
///
/// Derivation never mutates: [`with_attributes`](Self::with_attributes) and
/// [`with_group`](Self::with_group) return a new state, leaving `self` as it
/// was. Attribute keys are not deduplicated.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerState {
    attributes: Arc<[KeyValue]>,
    group: Option<Cow<'static, str>>,
}

impl Default for HandlerState {
    fn default() -> Self {
        HandlerState {
            attributes: Arc::from(Vec::new()),
            group: None,
        }
    }
}

impl HandlerState {
    /// An empty state with no attributes and no group.
    pub fn new() -> Self {
        HandlerState::default()
    }

    /// A state holding `existing ++ attributes`, with the same group.
    pub fn with_attributes<I>(&self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let attributes: Arc<[KeyValue]> = self
            .attributes
            .iter()
            .cloned()
            .chain(attributes)
            .collect();
        HandlerState {
            attributes,
            group: self.group.clone(),
        }
    }

    /// A state with `name` as its group, replacing any previous group.
    ///
    /// Groups do not nest. An empty name clears the group.
    pub fn with_group(&self, name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        HandlerState {
            attributes: Arc::clone(&self.attributes),
            group: if name.is_empty() { None } else { Some(name) },
        }
    }

    /// The accumulated attributes, oldest first.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// The current group label.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_leaves_ancestor_untouched() {
        let root = HandlerState::new().with_attributes([KeyValue::new("a", 1)]);
        let child = root.with_attributes([KeyValue::new("b", 2)]);
        let grouped = child.with_group("http");

        assert_eq!(root.attributes(), &[KeyValue::new("a", 1)]);
        assert_eq!(root.group(), None);
        assert_eq!(
            child.attributes(),
            &[KeyValue::new("a", 1), KeyValue::new("b", 2)]
        );
        assert_eq!(child.group(), None);
        assert_eq!(grouped.attributes(), child.attributes());
        assert_eq!(grouped.group(), Some("http"));
    }

    #[test]
    fn sibling_derivations_are_independent() {
        let root = HandlerState::new().with_attributes([KeyValue::new("shared", true)]);
        let left = root.with_attributes([KeyValue::new("side", "left")]);
        let right = root.with_attributes([KeyValue::new("side", "right")]);

        assert_eq!(left.attributes()[1], KeyValue::new("side", "left"));
        assert_eq!(right.attributes()[1], KeyValue::new("side", "right"));
        assert_eq!(root.attributes().len(), 1);
    }

    #[test]
    fn duplicate_keys_are_kept_in_order() {
        let state = HandlerState::new()
            .with_attributes([KeyValue::new("k", "first")])
            .with_attributes([KeyValue::new("k", "second")]);

        assert_eq!(
            state.attributes(),
            &[KeyValue::new("k", "first"), KeyValue::new("k", "second")]
        );
    }

    #[test]
    fn group_is_replaced_not_nested() {
        let state = HandlerState::new().with_group("outer").with_group("inner");
        assert_eq!(state.group(), Some("inner"));

        let cleared = state.with_group("");
        assert_eq!(cleared.group(), None);
        assert_eq!(state.group(), Some("inner"));
    }
}
