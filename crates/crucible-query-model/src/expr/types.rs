//! Item types carried by expressions and query sources.

use crate::expr::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of an expression or of the items a query source streams.
///
/// Only what the host recorded on the tree is known; anything else is
/// [`ItemType::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemType {
    #[default]
    Unknown,
    Bool,
    Int,
    Float,
    String,
    /// Named record type (an entity, a row)
    Record(String),
    /// Compiler-generated carrier that threads several range variables
    /// through a single lambda parameter
    Anonymous(Vec<(String, ItemType)>),
    Sequence(Box<ItemType>),
    Grouping {
        key: Box<ItemType>,
        element: Box<ItemType>,
    },
}

impl ItemType {
    pub fn sequence(item: ItemType) -> Self {
        ItemType::Sequence(Box::new(item))
    }

    pub fn grouping(key: ItemType, element: ItemType) -> Self {
        ItemType::Grouping {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    pub fn record(name: impl Into<String>) -> Self {
        ItemType::Record(name.into())
    }

    /// Element type when this type is enumerable
    pub fn element_type(&self) -> Option<&ItemType> {
        match self {
            ItemType::Sequence(item) => Some(item),
            ItemType::Grouping { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ItemType::Unknown)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ItemType::Int | ItemType::Float)
    }

    /// True for the synthetic pairing carriers that transparent-identifier
    /// removal is allowed to look through.
    pub fn is_transparent_carrier(&self) -> bool {
        matches!(self, ItemType::Anonymous(_))
    }

    /// Zero value used by `DefaultIfEmpty` and the `*OrDefault` family
    pub fn default_value(&self) -> Value {
        match self {
            ItemType::Bool => Value::Bool(false),
            ItemType::Int => Value::Int(0),
            ItemType::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Whether a runtime value is an instance of this type (`OfType`)
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ItemType::Unknown, _) => true,
            (ItemType::Bool, Value::Bool(_)) => true,
            (ItemType::Int, Value::Int(_)) => true,
            (ItemType::Float, Value::Float(_)) => true,
            (ItemType::String, Value::String(_)) => true,
            (ItemType::Record(_), Value::Record(_)) => true,
            (ItemType::Anonymous(_), Value::Record(_)) => true,
            (ItemType::Sequence(_), Value::List(_)) => true,
            (ItemType::Grouping { .. }, Value::Group { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Unknown => write!(f, "?"),
            ItemType::Bool => write!(f, "bool"),
            ItemType::Int => write!(f, "int"),
            ItemType::Float => write!(f, "float"),
            ItemType::String => write!(f, "string"),
            ItemType::Record(name) => write!(f, "{}", name),
            ItemType::Anonymous(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            ItemType::Sequence(item) => write!(f, "seq<{}>", item),
            ItemType::Grouping { key, element } => write!(f, "grouping<{}, {}>", key, element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type() {
        assert_eq!(
            ItemType::sequence(ItemType::Int).element_type(),
            Some(&ItemType::Int)
        );
        assert_eq!(
            ItemType::grouping(ItemType::String, ItemType::Int).element_type(),
            Some(&ItemType::Int)
        );
        assert_eq!(ItemType::Int.element_type(), None);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ItemType::Int.default_value(), Value::Int(0));
        assert_eq!(ItemType::Bool.default_value(), Value::Bool(false));
        assert_eq!(ItemType::record("Customer").default_value(), Value::Null);
    }

    #[test]
    fn test_accepts() {
        assert!(ItemType::Int.accepts(&Value::Int(3)));
        assert!(!ItemType::Int.accepts(&Value::String("3".into())));
        assert!(ItemType::Unknown.accepts(&Value::Null));
    }

    #[test]
    fn test_display() {
        let ty = ItemType::sequence(ItemType::grouping(ItemType::String, ItemType::Int));
        assert_eq!(ty.to_string(), "seq<grouping<string, int>>");
    }
}
