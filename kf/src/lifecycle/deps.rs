//! Declared re-fetch dependencies

use serde::Serialize;
use serde_json::Value;

/// Ordered list of values a fetch depends on
///
/// Compared shallowly and positionally: two lists are equal when they have the same
/// length and every element is equal to the one at the same position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deps(Vec<Value>);

impl Deps {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn of<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Append one dependency
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Append any serializable value as a dependency
    pub fn with_serialized<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.0.push(serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_positional_equality() {
        assert_eq!(Deps::of([1, 2]), Deps::new().with(1).with(2));
        assert_ne!(Deps::of([1, 2]), Deps::of([2, 1]));
        assert_ne!(Deps::of(["a"]), Deps::of(["a", "a"]));
        assert_eq!(Deps::new(), Deps::default());
    }

    #[test]
    fn test_mixed_kinds() {
        let deps = Deps::new().with("user-7").with(true).with(3.5);
        assert_eq!(deps.len(), 3);
        assert_ne!(deps, Deps::new().with("user-7").with(false).with(3.5));
    }

    #[test]
    fn test_with_serialized() {
        #[derive(Serialize)]
        struct Filter {
            page: u32,
        }

        let a = Deps::new().with_serialized(&Filter { page: 1 }).unwrap();
        let b = Deps::new().with_serialized(&Filter { page: 2 }).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.values()[0]["page"], 1);
    }

    proptest! {
        #[test]
        fn prop_equal_iff_same_elements(a in prop::collection::vec(0i64..4, 0..5), b in prop::collection::vec(0i64..4, 0..5)) {
            prop_assert_eq!(Deps::of(a.clone()) == Deps::of(b.clone()), a == b);
        }
    }
}
