//! Breakpoint registry: at most one breakpoint per node id.

use af_core::debug::BreakpointConfig;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    by_node: BTreeMap<String, BreakpointConfig>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an enabled breakpoint, replacing any existing one for the node.
    pub fn add(&mut self, node_id: &str, condition: Option<String>) {
        let condition = condition.filter(|c| !c.trim().is_empty());
        self.by_node.insert(
            node_id.to_string(),
            BreakpointConfig::new(node_id, condition),
        );
    }

    pub fn remove(&mut self, node_id: &str) -> Option<BreakpointConfig> {
        self.by_node.remove(node_id)
    }

    /// Flip the enabled flag, creating an enabled breakpoint if none exists.
    /// Returns the new enabled state.
    pub fn toggle(&mut self, node_id: &str) -> bool {
        match self.by_node.get_mut(node_id) {
            Some(bp) => {
                bp.enabled = !bp.enabled;
                bp.enabled
            }
            None => {
                self.add(node_id, None);
                true
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&BreakpointConfig> {
        self.by_node.get(node_id)
    }

    /// The breakpoint for `node_id` if it exists and is enabled.
    pub fn active(&self, node_id: &str) -> Option<&BreakpointConfig> {
        self.get(node_id).filter(|bp| bp.enabled)
    }

    pub fn list(&self) -> Vec<BreakpointConfig> {
        self.by_node.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replaces_existing() {
        let mut reg = BreakpointRegistry::new();
        reg.add("n1", Some("step > 1".into()));
        reg.add("n1", None);
        assert_eq!(reg.len(), 1);
        assert!(reg.get("n1").unwrap().condition.is_none());
    }

    #[test]
    fn toggle_creates_then_flips() {
        let mut reg = BreakpointRegistry::new();
        assert!(reg.toggle("n1"));
        assert!(reg.active("n1").is_some());
        assert!(!reg.toggle("n1"));
        assert!(reg.active("n1").is_none());
        assert!(reg.get("n1").is_some());
        assert!(reg.remove("n1").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn blank_condition_is_unconditional() {
        let mut reg = BreakpointRegistry::new();
        reg.add("n1", Some("  ".into()));
        assert!(reg.get("n1").unwrap().condition.is_none());
    }
}
