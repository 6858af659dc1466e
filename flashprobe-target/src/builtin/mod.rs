//! Compiled-in target definitions.
//!
//! Every target is a pure data value; the registry is a fixed table
//! from target type name to a constructor, resolved once at startup.

use crate::TargetDefinition;
use once_cell::sync::Lazy;
use std::collections::HashMap;

mod fm33lc02x;
mod fm33lg04x;
mod stm32f103xb;
mod stm32l073xb;

type TargetFactory = fn() -> TargetDefinition;

static BUILTIN_TARGETS: Lazy<HashMap<&'static str, TargetFactory>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, TargetFactory> = HashMap::new();
    table.insert("fm33lc02x", fm33lc02x::target);
    table.insert("fm33lg04x", fm33lg04x::target);
    table.insert("stm32f103xb", stm32f103xb::target);
    table.insert("stm32l073xb", stm32l073xb::target);
    table
});

/// Normalise a user-provided target type name for lookup:
/// lowercase, with dashes folded to underscores.
fn normalise(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

/// Look up a built-in target definition by its target type name.
pub fn get(name: &str) -> Option<TargetDefinition> {
    BUILTIN_TARGETS
        .get(normalise(name).as_str())
        .map(|factory| factory())
}

/// The names of all built-in targets, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTIN_TARGETS.keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn all_builtin_targets_are_valid() {
        for name in names() {
            let target = get(name).unwrap();
            target.validate().unwrap_or_else(|error| {
                panic!("builtin target {name} failed validation: {error}")
            });
            assert!(target.memory_map.boot_region().is_some(), "{name}");
        }
    }

    #[test]
    fn lookup_normalises_names() {
        assert!(get("STM32F103xb").is_some());
        assert!(get("stm32-f103-xb").is_none());
        assert!(get("fm33lg04x").is_some());
        assert!(get("nonexistent").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let names = names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
