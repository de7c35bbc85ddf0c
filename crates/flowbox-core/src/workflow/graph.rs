//! Graph builder, validation, and declaration-ordered topological sort.
//!
//! Uses `petgraph` to model boxes and their data connections as a directed
//! graph. Node indices equal declaration positions, which lets Kahn's
//! algorithm break ties by "declared first, runs first" with a min-heap.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use flowbox_types::error::{GraphError, ValidationError};
use flowbox_types::workflow::{
    BoxDefinition, ConnectionDefinition, EdgeView, Layout, NodeView, WorkflowView,
};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A validated, acyclic workflow graph.
///
/// Immutable once built; edits require building a new graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    boxes: Vec<BoxDefinition>,
    connections: Vec<ConnectionDefinition>,
    positions: HashMap<String, usize>,
    /// Node weight is the declaration position, edge weight the connection index.
    dag: DiGraph<usize, usize>,
    order: Vec<usize>,
}

impl WorkflowGraph {
    /// Build and validate a graph.
    ///
    /// Checks, in order:
    /// 1. Box ids are unique, and input names are unique within each box.
    /// 2. Every connection references existing boxes.
    /// 3. Every connection targets an input its target box declares.
    /// 4. No `(target, input)` pair is bound twice.
    /// 5. The connections form no cycle.
    ///
    /// The first failure is returned and no graph is produced.
    pub fn build(
        boxes: Vec<BoxDefinition>,
        connections: Vec<ConnectionDefinition>,
    ) -> Result<Self, ValidationError> {
        let mut positions = HashMap::with_capacity(boxes.len());
        for (pos, b) in boxes.iter().enumerate() {
            if positions.insert(b.id.clone(), pos).is_some() {
                return Err(ValidationError::DuplicateBoxId(b.id.clone()));
            }
            let mut seen = HashSet::new();
            for input in &b.inputs {
                if !seen.insert(input.as_str()) {
                    return Err(ValidationError::DuplicateInputName {
                        box_id: b.id.clone(),
                        input: input.clone(),
                    });
                }
            }
        }

        let mut bindings: HashMap<(&str, &str), &str> = HashMap::new();
        for conn in &connections {
            for endpoint in [&conn.source, &conn.target] {
                if !positions.contains_key(endpoint) {
                    return Err(ValidationError::UnknownEndpoint {
                        source_id: conn.source.clone(),
                        target_id: conn.target.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }

            let target = &boxes[positions[&conn.target]];
            if !target.declares_input(&conn.target_input) {
                return Err(ValidationError::UnknownInput {
                    source_id: conn.source.clone(),
                    target_id: conn.target.clone(),
                    input: conn.target_input.clone(),
                });
            }

            let key = (conn.target.as_str(), conn.target_input.as_str());
            if let Some(first) = bindings.insert(key, conn.source.as_str()) {
                return Err(ValidationError::DuplicateInputBinding {
                    target_id: conn.target.clone(),
                    input: conn.target_input.clone(),
                    first: first.to_string(),
                    second: conn.source.clone(),
                });
            }
        }

        // Edge from source -> target, one per connection
        let mut dag = DiGraph::<usize, usize>::with_capacity(boxes.len(), connections.len());
        for pos in 0..boxes.len() {
            dag.add_node(pos);
        }
        for (idx, conn) in connections.iter().enumerate() {
            dag.add_edge(
                NodeIndex::new(positions[&conn.source]),
                NodeIndex::new(positions[&conn.target]),
                idx,
            );
        }

        let order = match declaration_ordered_sort(&dag) {
            Some(order) => order,
            None => {
                let culprit = toposort(&dag, None)
                    .err()
                    .map(|cycle| dag[cycle.node_id()])
                    .unwrap_or_default();
                return Err(ValidationError::CycleDetected(boxes[culprit].id.clone()));
            }
        };

        tracing::debug!(
            boxes = boxes.len(),
            connections = connections.len(),
            "workflow graph built"
        );

        Ok(Self {
            boxes,
            connections,
            positions,
            dag,
            order,
        })
    }

    /// Box ids in execution order.
    ///
    /// Every connection's source precedes its target; among boxes that are
    /// ready at the same time, the one declared first comes first.
    pub fn execution_order(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|&pos| self.boxes[pos].id.clone())
            .collect()
    }

    /// `(source box id, target input name)` for every connection feeding
    /// `box_id`, in declaration order. Unknown ids have no upstream.
    pub fn upstream_of(&self, box_id: &str) -> Vec<(&str, &str)> {
        self.connections
            .iter()
            .filter(|c| c.target == box_id)
            .map(|c| (c.source.as_str(), c.target_input.as_str()))
            .collect()
    }

    /// Box ids fed by `box_id`, deduplicated, in declaration order of the boxes.
    pub fn downstream_of(&self, box_id: &str) -> Vec<&str> {
        let Some(&pos) = self.positions.get(box_id) else {
            return Vec::new();
        };
        let mut targets: Vec<usize> = self
            .dag
            .neighbors_directed(NodeIndex::new(pos), Direction::Outgoing)
            .map(|n| self.dag[n])
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
            .into_iter()
            .map(|p| self.boxes[p].id.as_str())
            .collect()
    }

    /// Declared inputs of `box_id` that no connection supplies.
    pub fn unbound_inputs(&self, box_id: &str) -> Vec<&str> {
        let Ok(node) = self.node_data(box_id) else {
            return Vec::new();
        };
        let bound: HashSet<&str> = self
            .upstream_of(box_id)
            .into_iter()
            .map(|(_, input)| input)
            .collect();
        node.inputs
            .iter()
            .map(String::as_str)
            .filter(|i| !bound.contains(i))
            .collect()
    }

    /// Look up a box definition.
    pub fn node_data(&self, box_id: &str) -> Result<&BoxDefinition, GraphError> {
        self.positions
            .get(box_id)
            .map(|&pos| &self.boxes[pos])
            .ok_or_else(|| GraphError::UnknownBox(box_id.to_string()))
    }

    pub fn contains(&self, box_id: &str) -> bool {
        self.positions.contains_key(box_id)
    }

    pub fn boxes(&self) -> &[BoxDefinition] {
        &self.boxes
    }

    pub fn connections(&self) -> &[ConnectionDefinition] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Render-ready projection of the graph plus an opaque layout.
    pub fn view(&self, layout: Layout) -> WorkflowView {
        let nodes = self
            .boxes
            .iter()
            .map(|b| NodeView {
                id: b.id.clone(),
                inputs: b.inputs.clone(),
                code: b.code.clone(),
                description: b.description.clone(),
                input_sources: self
                    .upstream_of(&b.id)
                    .into_iter()
                    .map(|(source, input)| (input.to_string(), source.to_string()))
                    .collect::<BTreeMap<_, _>>(),
                downstream: self
                    .downstream_of(&b.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect();

        WorkflowView {
            nodes,
            edges: self.connections.iter().map(EdgeView::from).collect(),
            layout,
        }
    }
}

// ---------------------------------------------------------------------------
// Kahn's algorithm with a declaration-order tie-break
// ---------------------------------------------------------------------------

/// Topologically sort `dag`, always taking the earliest-declared ready node.
///
/// Returns None when some nodes never become ready (the graph has a cycle).
fn declaration_ordered_sort(dag: &DiGraph<usize, usize>) -> Option<Vec<usize>> {
    let mut in_degree: Vec<usize> = dag
        .node_indices()
        .map(|n| dag.edges_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(pos, _)| Reverse(pos))
        .collect();

    let mut sorted = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(pos)) = ready.pop() {
        sorted.push(pos);
        for next in dag.neighbors_directed(NodeIndex::new(pos), Direction::Outgoing) {
            let degree = &mut in_degree[next.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    (sorted.len() == dag.node_count()).then_some(sorted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
