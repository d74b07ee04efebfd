//! The builder registry, spec §4.1 ("Builder registry") and §9 ("Dynamic
//! dispatch on modules").
//!
//! The registry stores type descriptors (a `ModuleBuilder` per class, plus
//! its static gate counts and help text), not vtables: runtime dispatch
//! for an instantiated module still goes through the plain [`crate::Module`]
//! trait object.
//!
//! Per SPEC_FULL §1 / design notes ("Global state"), the registry is
//! treated as a process-scoped service with explicit construction and
//! teardown rather than a `static`; callers (typically exactly one, at
//! startup) own an instance and pass it to [`crate::pipeline::Pipeline`]
//! when instantiating modules.

use std::collections::HashMap;

use crate::error::{Error, ErrorKind};
use crate::module::Module;
use crate::names::ModuleName;

/// Static description of one module class plus a factory for instances.
pub trait ModuleBuilder {
    /// The class name modules of this type are registered and looked up
    /// under, e.g. `"L2Forward"`.
    fn class_name(&self) -> &'static str;

    /// Template used to generate a default instance name when none is
    /// given; defaults to [`ModuleBuilder::class_name`].
    fn name_template(&self) -> &'static str {
        self.class_name()
    }

    /// Human-readable help text for the control plane.
    fn help(&self) -> &'static str {
        ""
    }

    /// Number of statically-known input gates, if fixed.
    fn num_igates(&self) -> Option<u16> {
        None
    }

    /// Number of statically-known output gates, if fixed.
    fn num_ogates(&self) -> Option<u16> {
        None
    }

    /// Instantiates a new, uninitialized module instance.
    fn build(&self) -> Box<dyn Module>;
}

/// Process-wide catalog mapping class name to builder.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<&'static str, Box<dyn ModuleBuilder>>,
}

impl BuilderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module class. Fails with `ALREADY_EXISTS` on a
    /// colliding class name.
    pub fn register(&mut self, builder: Box<dyn ModuleBuilder>) -> Result<(), Error> {
        let name = builder.class_name();
        if self.builders.contains_key(name) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("module class `{name}` is already registered"),
            ));
        }
        tracing::info!(class = name, "registered module class");
        let _ = self.builders.insert(name, builder);
        Ok(())
    }

    /// Looks up a builder by class name.
    #[must_use]
    pub fn get(&self, class_name: &str) -> Option<&dyn ModuleBuilder> {
        self.builders.get(class_name).map(std::convert::AsRef::as_ref)
    }

    /// Empties the registry. Does not affect modules already instantiated
    /// from it.
    pub fn shutdown(&mut self) {
        self.builders.clear();
    }
}

/// Converts a Rust-style class name (`"L2Forward"`) into the snake-case
/// prefix used for generated instance names (`"l2_forward"`).
#[must_use]
pub fn snake_case(class_name: &str) -> String {
    let mut out = String::with_capacity(class_name.len() + 4);
    for (i, ch) in class_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Generates `{prefix}{n}` for the lowest non-negative `n` such that the
/// result does not collide with `existing` (spec §4.1, property #9).
#[must_use]
pub fn generate_name(prefix: &str, existing: &HashMap<ModuleName, usize>) -> ModuleName {
    let mut n: u64 = 0;
    loop {
        let candidate = format!("{prefix}{n}");
        if !existing.contains_key(&ModuleName::from(candidate.clone())) {
            return ModuleName::from(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(snake_case("L2Forward"), "l2_forward");
        assert_eq!(snake_case("IPLookup"), "i_p_lookup");
        assert_eq!(snake_case("noop"), "noop");
    }

    #[test]
    fn generate_name_fills_the_lowest_gap() {
        let mut existing = HashMap::new();
        for n in [0u64, 1, 3] {
            let _ = existing.insert(ModuleName::from(format!("foo{n}")), n as usize);
        }
        assert_eq!(generate_name("foo", &existing), ModuleName::from("foo2".to_string()));
    }
}
