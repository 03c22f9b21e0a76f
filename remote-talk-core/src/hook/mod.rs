//! Generic call interception: patch primitive, registry, installer
//! strategies and lifecycle watchers.

pub mod installer;
pub mod lifecycle;
pub mod memory;
pub mod module_tables;
pub mod registry;
pub mod target;
pub mod trampoline;

#[cfg(test)]
pub(crate) mod fake;
