use crate::{
    error::{FeaError, Result},
    material::LinearElastic,
};

/// Degrees of freedom carried by every node (x then y).
pub const DOF: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    pub fn distance_to(&self, other: &Vertex) -> f64 {
        f64::sqrt(f64::powi(self.x - other.x, 2) + f64::powi(self.y - other.y, 2))
    }

    pub fn midpoint(&self, other: &Vertex) -> Vertex {
        Vertex {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

impl From<(f64, f64)> for Vertex {
    fn from((x, y): (f64, f64)) -> Self {
        Vertex { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub nodes: [usize; 3],
}

impl Element {
    /// Global DOF indices of the element, x then y per node in node order
    pub fn dofs(&self) -> [usize; 6] {
        let [a, b, c] = self.nodes;
        [
            DOF * a,
            DOF * a + 1,
            DOF * b,
            DOF * b + 1,
            DOF * c,
            DOF * c + 1,
        ]
    }
}

/// A triangulated domain. Built once by a mesher and replaced wholesale on
/// remesh; there is no way to edit nodes or elements in place.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    nodes: Vec<Vertex>,
    elements: Vec<Element>,
}

impl Mesh {
    /// Builds a mesh, checking that every element references existing nodes
    pub fn new(nodes: Vec<Vertex>, elements: Vec<Element>) -> Result<Mesh> {
        for (i, element) in elements.iter().enumerate() {
            if let Some(bad) = element.nodes.iter().find(|n| **n >= nodes.len()) {
                return Err(FeaError::Mesher(format!(
                    "Element {i} references node {bad} but the mesh has {} nodes",
                    nodes.len()
                )));
            }
        }

        Ok(Mesh { nodes, elements })
    }

    pub fn empty() -> Mesh {
        Mesh::default()
    }

    pub fn nodes(&self) -> &[Vertex] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn dof_count(&self) -> usize {
        DOF * self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Corner coordinates of an element in node order
    pub fn element_vertices(&self, element: &Element) -> [Vertex; 3] {
        element.nodes.map(|i| self.nodes[i])
    }
}

/// Meshing input: a closed outer ring, optional holes and a material tag.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyRegion {
    pub name: String,
    pub outer: Vec<Vertex>,
    pub holes: Vec<Vec<Vertex>>,
    pub material: String,
}

impl PolyRegion {
    pub fn new(name: &str, outer: Vec<Vertex>) -> Result<PolyRegion> {
        if outer.len() < 3 {
            return Err(FeaError::InvalidPolygon(format!(
                "Region '{name}' has {} vertices; at least 3 are required",
                outer.len()
            )));
        }

        Ok(PolyRegion {
            name: name.to_owned(),
            outer,
            holes: Vec::new(),
            material: "Elastic".to_owned(),
        })
    }

    pub fn with_hole(mut self, hole: Vec<Vertex>) -> Result<PolyRegion> {
        if hole.len() < 3 {
            return Err(FeaError::InvalidPolygon(format!(
                "Hole in region '{}' has {} vertices; at least 3 are required",
                self.name,
                hole.len()
            )));
        }
        self.holes.push(hole);
        Ok(self)
    }

    pub fn with_material(mut self, material: &str) -> PolyRegion {
        self.material = material.to_owned();
        self
    }
}

/// An applied load, re-evaluated against the current mesh at every solve
#[derive(Debug, Clone, PartialEq)]
pub enum Load {
    /// Traction (force per reference length) along a user drawn polyline
    Line {
        points: Vec<Vertex>,
        tx: f64,
        ty: f64,
    },
    /// Concentrated force snapped to the nearest node
    Point { point: Vertex, fx: f64, fy: f64 },
}

/// Material and section data shared by every element in a solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelMetadata {
    pub material: LinearElastic,
    pub part_thickness: f64,
}
