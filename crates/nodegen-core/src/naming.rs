//! Naming helpers shared by marker decoding and plan synthesis.
//!
//! Type names are never re-cased here: implementation names are derived from
//! the spec's simple name as declared, and only the first character of an
//! accessor-derived property name is lowered.

use std::collections::HashSet;

use crate::model::SpecId;

/// Name of the synthesized implementation for a spec
///
/// # Examples
/// ```
/// use nodegen_core::model::SpecId;
/// use nodegen_core::naming::implementation_name;
/// assert_eq!(implementation_name(&SpecId::new("tree.BinaryTree"), "Impl"), "BinaryTreeImpl");
/// ```
pub fn implementation_name(spec: &SpecId, suffix: &str) -> String {
    format!("{}{}", spec.simple_name(), suffix)
}

/// Lower the first character only
///
/// # Examples
/// ```
/// use nodegen_core::naming::to_camel_case;
/// assert_eq!(to_camel_case("Operator"), "operator");
/// assert_eq!(to_camel_case("URLPath"), "uRLPath");
/// ```
pub fn to_camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Derive a property name from an accessor method name.
///
/// A `get` or `is` prefix followed by an uppercase letter is stripped and
/// the remainder camel-cased; anything else is used unchanged.
///
/// # Examples
/// ```
/// use nodegen_core::naming::property_name_from_accessor;
/// assert_eq!(property_name_from_accessor("getLeftOperand"), "leftOperand");
/// assert_eq!(property_name_from_accessor("isStatic"), "static");
/// assert_eq!(property_name_from_accessor("kind"), "kind");
/// assert_eq!(property_name_from_accessor("island"), "island");
/// ```
pub fn property_name_from_accessor(method: &str) -> String {
    for prefix in ["get", "is"] {
        if let Some(rest) = method.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                return to_camel_case(rest);
            }
        }
    }
    method.to_string()
}

/// Hands out unique names within one synthesis scope.
///
/// A taken name is mangled to `name$0`, `name$1` and so on. Create one
/// allocator per constructor; allocators never share state.
#[derive(Debug, Clone, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or a mangled variant if it is already taken
    pub fn allocate(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        self.mangle(name)
    }

    fn mangle(&mut self, name: &str) -> String {
        (0..)
            .map(|i| format!("{}${}", name, i))
            .find(|candidate| !self.taken.contains(candidate))
            .map(|candidate| {
                self.taken.insert(candidate.clone());
                candidate
            })
            .unwrap_or_else(|| name.to_string())
    }
}
