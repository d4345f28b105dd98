use std::collections::BTreeMap;

use crate::datatypes::Element;

/// An undirected mesh edge keyed by its ordered node pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub a: usize,
    pub b: usize,
}

impl EdgeKey {
    pub fn new(n0: usize, n1: usize) -> EdgeKey {
        EdgeKey {
            a: n0.min(n1),
            b: n0.max(n1),
        }
    }
}

/// Finds the edges used by exactly one triangle
///
/// # Arguments
/// * `elements` - The elements of the mesh
///
/// # Returns
/// Boundary edges sorted by their node pair
pub fn boundary_edges(elements: &[Element]) -> Vec<EdgeKey> {
    let mut edge_use: BTreeMap<EdgeKey, usize> = BTreeMap::new();

    for element in elements {
        let [n0, n1, n2] = element.nodes;
        for (a, b) in [(n0, n1), (n1, n2), (n2, n0)] {
            *edge_use.entry(EdgeKey::new(a, b)).or_insert(0) += 1;
        }
    }

    edge_use
        .into_iter()
        .filter(|(_, count)| *count == 1)
        .map(|(edge, _)| edge)
        .collect()
}
