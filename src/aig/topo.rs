// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashSet, VecDeque};

use crate::aig::gate::{AigNode, AigOperand};

/// Returns a postorder traversal of the AIG operands reachable from a set of
/// outputs (dedup by operand).
pub fn post_order_operands(
    starts: &[AigOperand],
    nodes: &[AigNode],
    discard_inputs: bool,
) -> Vec<AigOperand> {
    let mut worklist: VecDeque<AigOperand> = starts.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    while let Some(current) = worklist.pop_back() {
        if visited.contains(&current) {
            continue;
        }
        debug_assert!(
            current.node.id < nodes.len(),
            "post_order_operands: operand node index out of bounds: {} (nodes.len() = {})",
            current.node.id,
            nodes.len()
        );
        let node = &nodes[current.node.id];
        let mut all_deps_visited = true;
        for dep in node.get_operands() {
            if !visited.contains(&dep) {
                worklist.push_back(current); // Revisit after dependencies
                worklist.push_back(dep);
                all_deps_visited = false;
                break;
            }
        }
        if all_deps_visited {
            let should_push = match node {
                AigNode::Input { .. } => current.negated || !discard_inputs,
                _ => true,
            };
            if should_push {
                postorder.push(current);
            }
            visited.insert(current);
        }
    }
    postorder
}
