//! Built-in tool implementations for Ponder.
//!
//! Only deterministic, side-effect-free tools live here; anything that
//! touches the network or filesystem belongs to the embedding application.

pub mod calculator;

use ponder_core::tool::ToolRegistry;
use std::sync::Arc;

pub use calculator::CalculatorTool;

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_calculator() {
        let registry = default_registry();
        assert!(registry.contains("calculator"));
        assert_eq!(registry.len(), 1);
    }
}
