//! Maps user loads onto the mesh as nodal forces.

use log::{debug, warn};
use nalgebra::DVector;

use crate::{
    boundary::{boundary_edges, EdgeKey},
    datatypes::{Load, Mesh, Vertex, DOF},
    error::{FeaError, Result},
};

/// Settings for snapping loads onto a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadMapping {
    /// Largest distance from a boundary edge midpoint to the load polyline
    /// for the edge to carry the load, in mesh length units
    pub edge_tolerance: f64,
    /// Converts traction from its reference length to the mesh length unit.
    /// The default of 12 takes force per foot to force per inch.
    pub traction_unit_divisor: f64,
}

impl Default for LoadMapping {
    fn default() -> Self {
        LoadMapping {
            edge_tolerance: 3.0,
            traction_unit_divisor: 12.0,
        }
    }
}

/// Distance from a point to a segment, with the projection clamped onto the
/// segment
pub fn point_to_segment_distance(p: &Vertex, a: &Vertex, b: &Vertex) -> f64 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let ab2 = abx * abx + aby * aby;

    let t = if ab2 > 0.0 {
        (((p.x - a.x) * abx + (p.y - a.y) * aby) / ab2).clamp(0.0, 1.0)
    } else {
        0.0
    };

    p.distance_to(&Vertex::new(a.x + t * abx, a.y + t * aby))
}

/// Selects the boundary edges whose midpoints lie within `tolerance` of a
/// polyline
///
/// # Returns
/// Indices into `edges`; empty when the polyline has fewer than two points
pub fn edges_near_polyline(
    nodes: &[Vertex],
    edges: &[EdgeKey],
    polyline: &[Vertex],
    tolerance: f64,
) -> Vec<usize> {
    if polyline.len() < 2 {
        return Vec::new();
    }

    edges
        .iter()
        .enumerate()
        .filter(|(_, edge)| {
            let mid = nodes[edge.a].midpoint(&nodes[edge.b]);
            let d_min = polyline
                .windows(2)
                .map(|seg| point_to_segment_distance(&mid, &seg[0], &seg[1]))
                .fold(f64::INFINITY, f64::min);
            d_min <= tolerance
        })
        .map(|(i, _)| i)
        .collect()
}

fn add_nodal_force(forces: &mut DVector<f64>, node: usize, fx: f64, fy: f64) -> Result<()> {
    let ndof = forces.len();
    let dof = DOF * node + 1;
    if dof >= ndof {
        return Err(FeaError::OutOfRangeDof { dof, ndof });
    }

    forces[DOF * node] += fx;
    forces[dof] += fy;
    Ok(())
}

/// Lumps a constant traction onto the end nodes of the selected edges
///
/// # Arguments
/// * `mesh` - The current mesh
/// * `edges` - Boundary edges of the mesh
/// * `selected` - Indices into `edges` that carry the load
/// * `tx`, `ty` - Traction per reference length
/// * `traction_unit_divisor` - Reference length expressed in mesh units
pub fn assemble_line_traction(
    mesh: &Mesh,
    edges: &[EdgeKey],
    selected: &[usize],
    tx: f64,
    ty: f64,
    traction_unit_divisor: f64,
) -> Result<DVector<f64>> {
    let qx = tx / traction_unit_divisor;
    let qy = ty / traction_unit_divisor;
    let nodes = mesh.nodes();
    let mut forces = DVector::zeros(mesh.dof_count());

    for &i in selected {
        let edge = edges.get(i).ok_or_else(|| {
            FeaError::Input(format!("Edge {i} selected from {} edges", edges.len()))
        })?;
        let (pa, pb) = match (nodes.get(edge.a), nodes.get(edge.b)) {
            (Some(pa), Some(pb)) => (pa, pb),
            _ => {
                let dof = DOF * edge.a.max(edge.b);
                return Err(FeaError::OutOfRangeDof {
                    dof,
                    ndof: forces.len(),
                });
            }
        };

        let length = pa.distance_to(pb);
        let fx = qx * length / 2.0;
        let fy = qy * length / 2.0;

        add_nodal_force(&mut forces, edge.a, fx, fy)?;
        add_nodal_force(&mut forces, edge.b, fx, fy)?;
    }

    Ok(forces)
}

/// Index of the node closest to a point
pub fn nearest_node(nodes: &[Vertex], point: &Vertex) -> Option<usize> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (i, f64::powi(n.x - point.x, 2) + f64::powi(n.y - point.y, 2)))
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        })
        .map(|(i, _)| i)
}

/// Applies a concentrated force at the node nearest to `point`
///
/// # Returns
/// The force vector and the node the load was snapped to
pub fn assemble_point_load(
    mesh: &Mesh,
    point: &Vertex,
    fx: f64,
    fy: f64,
) -> Result<(DVector<f64>, usize)> {
    let node = nearest_node(mesh.nodes(), point)
        .ok_or_else(|| FeaError::Input("Cannot place a point load on an empty mesh".to_owned()))?;

    let mut forces = DVector::zeros(mesh.dof_count());
    add_nodal_force(&mut forces, node, fx, fy)?;

    Ok((forces, node))
}

/// Evaluates every load against the mesh and sums the nodal forces
pub fn build_force_vector(
    mesh: &Mesh,
    loads: &[Load],
    mapping: &LoadMapping,
) -> Result<DVector<f64>> {
    let edges = boundary_edges(mesh.elements());
    let mut forces = DVector::zeros(mesh.dof_count());

    for load in loads {
        match load {
            Load::Line { points, tx, ty } => {
                let selected =
                    edges_near_polyline(mesh.nodes(), &edges, points, mapping.edge_tolerance);
                if selected.is_empty() {
                    warn!("line load {:?} did not reach any boundary edge", points);
                }
                debug!("line load mapped onto {} edges", selected.len());
                forces += assemble_line_traction(
                    mesh,
                    &edges,
                    &selected,
                    *tx,
                    *ty,
                    mapping.traction_unit_divisor,
                )?;
            }
            Load::Point { point, fx, fy } => {
                let (f, node) = assemble_point_load(mesh, point, *fx, *fy)?;
                debug!(
                    "point load at {:?} snapped to node {node} (offset {:.3e})",
                    point,
                    point.distance_to(&mesh.nodes()[node])
                );
                forces += f;
            }
        }
    }

    Ok(forces)
}
