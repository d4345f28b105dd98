use std::collections::BTreeMap;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};

use crate::{
    assembly::build_total_stiffness_matrix,
    datatypes::{Load, Mesh, ModelMetadata, Vertex, DOF},
    element::{element_strain, ElementStrain},
    error::{FeaError, Result},
    loads::{build_force_vector, LoadMapping},
};

/// Axis-aligned selection box for a boundary rule; bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for BoundaryRegion {
    fn default() -> Self {
        BoundaryRegion {
            x_min: f64::MIN,
            x_max: f64::MAX,
            y_min: f64::MIN,
            y_max: f64::MAX,
        }
    }
}

impl BoundaryRegion {
    pub fn contains(&self, v: &Vertex) -> bool {
        v.x >= self.x_min && v.x <= self.x_max && v.y >= self.y_min && v.y <= self.y_max
    }
}

/// Prescribes displacements on every node inside a region
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub name: String,
    pub region: BoundaryRegion,
    pub ux: Option<f64>,
    pub uy: Option<f64>,
}

/// Prescribed displacements keyed by DOF index. A DOF can only hold one
/// value, so constraints never overlap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    fixed: BTreeMap<usize, f64>,
}

fn isclose(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

impl Constraints {
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Prescribes a DOF, replacing any earlier value for it
    pub fn fix(&mut self, dof: usize, value: f64) -> &mut Self {
        self.fixed.insert(dof, value);
        self
    }

    pub fn fix_node(&mut self, node: usize, ux: Option<f64>, uy: Option<f64>) -> &mut Self {
        if let Some(ux) = ux {
            self.fix(DOF * node, ux);
        }
        if let Some(uy) = uy {
            self.fix(DOF * node + 1, uy);
        }
        self
    }

    /// Rollers along the lowest edge and the leftmost edge: y is fixed on
    /// nodes at minimum y and x on nodes at minimum x
    pub fn simple_support(mesh: &Mesh) -> Constraints {
        let mut constraints = Constraints::new();
        let nodes = mesh.nodes();
        if nodes.is_empty() {
            return constraints;
        }

        let x_min = nodes.iter().map(|n| n.x).fold(f64::INFINITY, f64::min);
        let y_min = nodes.iter().map(|n| n.y).fold(f64::INFINITY, f64::min);

        for (i, node) in nodes.iter().enumerate() {
            if isclose(node.y, y_min) {
                constraints.fix(DOF * i + 1, 0.0);
            }
            if isclose(node.x, x_min) {
                constraints.fix(DOF * i, 0.0);
            }
        }

        constraints
    }

    /// Applies region rules in order; later rules win where they overlap
    pub fn from_rules(mesh: &Mesh, rules: &[BoundaryRule]) -> Constraints {
        let mut constraints = Constraints::new();

        for rule in rules {
            let mut hits = 0usize;
            for (i, node) in mesh.nodes().iter().enumerate() {
                if rule.region.contains(node) {
                    constraints.fix_node(i, rule.ux, rule.uy);
                    hits += 1;
                }
            }
            debug!("boundary rule '{}' matched {hits} nodes", rule.name);
        }

        constraints
    }

    pub fn len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }

    pub fn get(&self, dof: usize) -> Option<f64> {
        self.fixed.get(&dof).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.fixed.iter().map(|(dof, value)| (*dof, *value))
    }

    fn check_range(&self, ndof: usize) -> Result<()> {
        match self.fixed.keys().find(|dof| **dof >= ndof) {
            Some(dof) => Err(FeaError::OutOfRangeDof { dof: *dof, ndof }),
            None => Ok(()),
        }
    }
}

fn check_system(k: &DMatrix<f64>, f: &DVector<f64>) -> Result<()> {
    if !k.is_square() || k.nrows() != f.len() {
        return Err(FeaError::Input(format!(
            "Stiffness matrix is {}x{} but force vector has {} entries",
            k.nrows(),
            k.ncols(),
            f.len()
        )));
    }
    Ok(())
}

/// Applies Dirichlet constraints to the system in place
///
/// The coupling of each prescribed value is moved to the right-hand side of
/// the free rows (`f_i -= K_ij u_j`), then each constrained row and column is
/// zeroed, the diagonal set to one and the force entry set to the prescribed
/// value.
pub fn apply_dirichlet_in_place(
    k: &mut DMatrix<f64>,
    f: &mut DVector<f64>,
    constraints: &Constraints,
) -> Result<()> {
    check_system(k, f)?;
    constraints.check_range(f.len())?;

    // lifting reads the untouched columns, so it must finish before zeroing
    for (dof, value) in constraints.iter() {
        if value == 0.0 {
            continue;
        }
        for i in 0..f.len() {
            if constraints.get(i).is_none() {
                f[i] -= k[(i, dof)] * value;
            }
        }
    }

    for (dof, value) in constraints.iter() {
        k.row_mut(dof).fill(0.0);
        k.column_mut(dof).fill(0.0);
        k[(dof, dof)] = 1.0;
        f[dof] = value;
    }

    Ok(())
}

/// Applies Dirichlet constraints to a copy of the system
///
/// # Returns
/// The constrained stiffness matrix and force vector, leaving the inputs
/// untouched
pub fn apply_dirichlet(
    k: &DMatrix<f64>,
    f: &DVector<f64>,
    constraints: &Constraints,
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let mut kc = k.clone();
    let mut fc = f.clone();
    apply_dirichlet_in_place(&mut kc, &mut fc, constraints)?;
    Ok((kc, fc))
}

/// Symmetric diagonal scaling `s_i = 1 / sqrt(|K_ii|)`; rows with a zero
/// diagonal are left unscaled
fn equilibration_scales(k: &DMatrix<f64>) -> DVector<f64> {
    k.diagonal().map(|d| {
        let d = d.abs();
        if d > 0.0 {
            1.0 / d.sqrt()
        } else {
            1.0
        }
    })
}

/// Solves `Ku = f` with a dense LU factorization
///
/// The system is equilibrated to `(S K S) y = S f` with `u = S y`, which puts
/// ones on the diagonal. A pivot of the scaled factorization no larger than
/// `n * EPSILON` times the largest one marks the system as singular; the test
/// does not depend on the units of `K`.
pub fn solve_system(k: DMatrix<f64>, f: &DVector<f64>) -> Result<DVector<f64>> {
    check_system(&k, f)?;
    if f.is_empty() {
        return Ok(DVector::zeros(0));
    }

    let scales = equilibration_scales(&k);
    let n = scales.len();
    let mut scaled = k;
    for j in 0..n {
        for i in 0..n {
            scaled[(i, j)] *= scales[i] * scales[j];
        }
    }

    let lu = scaled.lu();
    let pivots = lu.u().diagonal().abs();
    let largest = pivots.max();
    let smallest = pivots.min();

    let tolerance = pivots.len() as f64 * f64::EPSILON * largest;

    if !(largest > 0.0) || smallest <= tolerance {
        return Err(FeaError::SingularSystem(format!(
            "pivot ratio {:.3e}; constraints must remove all rigid body modes",
            smallest / largest
        )));
    }

    let y = lu.solve(&f.component_mul(&scales)).ok_or_else(|| {
        FeaError::SingularSystem("LU factorization could not be solved".to_owned())
    })?;

    Ok(y.component_mul(&scales))
}

/// Result of a solve
#[derive(Debug, Clone)]
pub struct Solution {
    /// Nodal displacements, `[ux0, uy0, ux1, uy1, ...]`
    pub displacements: DVector<f64>,
    /// `K u - f` with the unconstrained system; nonzero only at constrained
    /// DOFs
    pub reactions: DVector<f64>,
}

impl Solution {
    pub fn node_displacement(&self, node: usize) -> (f64, f64) {
        (
            self.displacements[DOF * node],
            self.displacements[DOF * node + 1],
        )
    }

    /// Recovers the strain of every element of the solved mesh
    pub fn element_strains(&self, mesh: &Mesh) -> Result<Vec<ElementStrain>> {
        mesh.elements()
            .iter()
            .map(|element| element_strain(mesh, element, &self.displacements))
            .collect()
    }
}

/// Assembles and solves the system for a precomputed force vector
///
/// # Arguments
/// * `mesh` - The current mesh
/// * `model_metadata` - Material and thickness
/// * `forces` - The global force vector, length `2N`
/// * `constraints` - Prescribed displacements
pub fn solve_linear(
    mesh: &Mesh,
    model_metadata: &ModelMetadata,
    forces: &DVector<f64>,
    constraints: &Constraints,
) -> Result<Solution> {
    let constitutive = model_metadata.material.constitutive_matrix();
    let total_stiffness_matrix =
        build_total_stiffness_matrix(mesh, &constitutive, model_metadata.part_thickness)?;

    let (kc, fc) = apply_dirichlet(&total_stiffness_matrix, forces, constraints)?;

    info!(
        "solving {} DOFs with {} constrained...",
        forces.len(),
        constraints.len()
    );
    let start = std::time::Instant::now();
    let displacements = solve_system(kc, &fc)?;
    info!(
        "solved system in {:.3} seconds",
        start.elapsed().as_secs_f32()
    );

    let reactions = &total_stiffness_matrix * &displacements - forces;

    Ok(Solution {
        displacements,
        reactions,
    })
}

/// Runs the solver: maps loads onto the mesh, assembles and solves
pub fn run(
    mesh: &Mesh,
    model_metadata: &ModelMetadata,
    loads: &[Load],
    mapping: &LoadMapping,
    constraints: &Constraints,
) -> Result<Solution> {
    let forces = build_force_vector(mesh, loads, mapping)?;
    solve_linear(mesh, model_metadata, &forces, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Element;
    use crate::mesher::{GridMesher, MeshOptions, Triangulator};
    use approx::assert_relative_eq;
    use nalgebra::dmatrix;

    fn square() -> Mesh {
        Mesh::new(
            vec![
                Vertex::new(0., 0.),
                Vertex::new(1., 0.),
                Vertex::new(1., 1.),
                Vertex::new(0., 1.),
            ],
            vec![Element { nodes: [0, 1, 2] }, Element { nodes: [0, 2, 3] }],
        )
        .unwrap()
    }

    #[test]
    fn dirichlet_works_on_a_copy() {
        let k = dmatrix![4.0, 1.0, 2.0; 1.0, 5.0, 3.0; 2.0, 3.0, 6.0];
        let f = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut constraints = Constraints::new();
        constraints.fix(1, 0.5);

        let (kc, fc) = apply_dirichlet(&k, &f, &constraints).unwrap();

        assert_eq!(kc, dmatrix![4.0, 0.0, 2.0; 0.0, 1.0, 0.0; 2.0, 0.0, 6.0]);
        // free rows carry the coupling to the prescribed value
        assert_eq!(fc.as_slice(), &[0.5, 0.5, 1.5]);
        assert_eq!(k[(1, 1)], 5.0);
        assert_eq!(f[1], 2.0);
    }

    #[test]
    fn free_rows_balance_with_prescribed_values() {
        let k = dmatrix![4.0, 1.0, 2.0; 1.0, 5.0, 3.0; 2.0, 3.0, 6.0];
        let f = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut constraints = Constraints::new();
        constraints.fix(1, 0.5);

        let (kc, fc) = apply_dirichlet(&k, &f, &constraints).unwrap();
        let u = solve_system(kc, &fc).unwrap();

        assert_relative_eq!(u[1], 0.5);
        let residual = &k * &u - &f;
        assert_relative_eq!(residual[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(residual[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_test_ignores_stiffness_units() {
        let k = dmatrix![4.0, 1.0, 2.0; 1.0, 5.0, 3.0; 2.0, 3.0, 6.0];
        let f = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut constraints = Constraints::new();
        constraints.fix(0, 0.0);

        let (kc, fc) = apply_dirichlet(&k, &f, &constraints).unwrap();
        let u = solve_system(kc, &fc).unwrap();

        let (kc, fc) = apply_dirichlet(&(&k * 1e12), &f, &constraints).unwrap();
        let stiff = solve_system(kc, &fc).unwrap();

        for (a, b) in u.iter().zip(stiff.iter()) {
            assert_relative_eq!(*a, *b * 1e12, max_relative = 1e-10);
        }
    }

    #[test]
    fn zero_diagonal_is_singular() {
        let k = dmatrix![2.0, 0.0; 0.0, 0.0];
        let f = DVector::from_vec(vec![1.0, 0.0]);

        assert!(matches!(
            solve_system(k, &f),
            Err(FeaError::SingularSystem(_))
        ));
    }

    #[test]
    fn constraint_order_is_irrelevant() {
        let k = dmatrix![4.0, 1.0, 2.0; 1.0, 5.0, 3.0; 2.0, 3.0, 6.0];
        let f = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        let mut a = Constraints::new();
        a.fix(0, 1.0).fix(2, -1.0);
        let mut b = Constraints::new();
        b.fix(2, -1.0).fix(0, 1.0);

        assert_eq!(
            apply_dirichlet(&k, &f, &a).unwrap(),
            apply_dirichlet(&k, &f, &b).unwrap()
        );
    }

    #[test]
    fn out_of_range_constraint_is_rejected() {
        let k = DMatrix::<f64>::identity(4, 4);
        let f = DVector::zeros(4);
        let mut constraints = Constraints::new();
        constraints.fix(4, 0.0);

        assert!(matches!(
            apply_dirichlet(&k, &f, &constraints),
            Err(FeaError::OutOfRangeDof { dof: 4, ndof: 4 })
        ));
    }

    #[test]
    fn unconstrained_structure_is_singular() {
        let metadata = ModelMetadata {
            material: crate::material::LinearElastic::new(1000.0, 0.3, true).unwrap(),
            part_thickness: 1.0,
        };
        let mesh = square();
        let forces = DVector::zeros(mesh.dof_count());

        let result = solve_linear(&mesh, &metadata, &forces, &Constraints::new());
        assert!(matches!(result, Err(FeaError::SingularSystem(_))));

        // a node outside every element has no stiffness at all
        let mut nodes = mesh.nodes().to_vec();
        nodes.push(Vertex::new(5., 5.));
        let orphaned = Mesh::new(nodes, mesh.elements().to_vec()).unwrap();
        let forces = DVector::zeros(orphaned.dof_count());
        let result = solve_linear(
            &orphaned,
            &metadata,
            &forces,
            &Constraints::simple_support(&mesh),
        );
        assert!(matches!(result, Err(FeaError::SingularSystem(_))));
    }

    #[test]
    fn prescribed_displacement_is_reproduced() {
        let metadata = ModelMetadata {
            material: crate::material::LinearElastic::new(1000.0, 0.25, true).unwrap(),
            part_thickness: 1.0,
        };
        let mesh = square();
        let mut constraints = Constraints::simple_support(&mesh);
        constraints.fix(2, 0.01).fix(4, 0.01);
        let forces = DVector::zeros(mesh.dof_count());

        let solution = solve_linear(&mesh, &metadata, &forces, &constraints).unwrap();
        assert_relative_eq!(solution.node_displacement(1).0, 0.01);
        assert_relative_eq!(solution.node_displacement(2).0, 0.01);

        // free contraction in y under uniaxial stretch
        for strain in solution.element_strains(&mesh).unwrap() {
            assert_relative_eq!(strain.strain[0], 0.01, max_relative = 1e-9);
            assert_relative_eq!(strain.strain[1], -0.0025, max_relative = 1e-9);
        }
    }

    fn grid_square(resolution: usize) -> Mesh {
        let region = crate::datatypes::PolyRegion::new(
            "square",
            vec![
                Vertex::new(0., 0.),
                Vertex::new(1., 0.),
                Vertex::new(1., 1.),
                Vertex::new(0., 1.),
            ],
        )
        .unwrap();
        let options = MeshOptions {
            grid_resolution: resolution,
            ..MeshOptions::default()
        };
        GridMesher.triangulate(&region, &options).unwrap()
    }

    #[test]
    fn steel_moduli_solve_like_unit_moduli() {
        let mesh = grid_square(16);
        let constraints = Constraints::simple_support(&mesh);
        let loads = vec![Load::Point {
            point: Vertex::new(1., 1.),
            fx: 0.0,
            fy: -1.0,
        }];

        let solve = |youngs_modulus: f64| {
            let metadata = ModelMetadata {
                material: crate::material::LinearElastic::new(youngs_modulus, 0.3, true)
                    .unwrap(),
                part_thickness: 1.0,
            };
            run(
                &mesh,
                &metadata,
                &loads,
                &LoadMapping::default(),
                &constraints,
            )
            .unwrap()
        };

        let unit = solve(1.0);
        let steel = solve(2e11);

        // displacement scales with 1/E
        assert!(steel.displacements.min() < 0.0);
        for (a, b) in unit.displacements.iter().zip(steel.displacements.iter()) {
            assert_relative_eq!(*a, *b * 2e11, epsilon = 1e-9, max_relative = 1e-8);
        }
    }

    #[test]
    fn prescribed_stretch_from_rules() {
        let metadata = ModelMetadata {
            material: crate::material::LinearElastic::new(2e11, 0.25, true).unwrap(),
            part_thickness: 1.0,
        };
        let mesh = grid_square(4);
        let rules = vec![
            BoundaryRule {
                name: "left".to_owned(),
                region: BoundaryRegion {
                    x_max: 0.0,
                    ..BoundaryRegion::default()
                },
                ux: Some(0.0),
                uy: None,
            },
            BoundaryRule {
                name: "bottom".to_owned(),
                region: BoundaryRegion {
                    y_max: 0.0,
                    ..BoundaryRegion::default()
                },
                ux: None,
                uy: Some(0.0),
            },
            BoundaryRule {
                name: "right".to_owned(),
                region: BoundaryRegion {
                    x_min: 1.0,
                    ..BoundaryRegion::default()
                },
                ux: Some(0.002),
                uy: None,
            },
        ];
        let constraints = Constraints::from_rules(&mesh, &rules);
        let forces = DVector::zeros(mesh.dof_count());

        let solution = solve_linear(&mesh, &metadata, &forces, &constraints).unwrap();
        for strain in solution.element_strains(&mesh).unwrap() {
            assert_relative_eq!(strain.strain[0], 0.002, max_relative = 1e-9);
            assert_relative_eq!(strain.strain[1], -0.0005, max_relative = 1e-9);
            assert_relative_eq!(strain.strain[2], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn simple_support_fixes_min_edges() {
        let constraints = Constraints::simple_support(&square());

        // y on nodes 0, 1 and x on nodes 0, 3
        assert_eq!(
            constraints.iter().map(|(dof, _)| dof).collect::<Vec<_>>(),
            vec![0, 1, 3, 6]
        );
    }

    #[test]
    fn rules_select_nodes_by_region() {
        let rules = vec![BoundaryRule {
            name: "right".to_owned(),
            region: BoundaryRegion {
                x_min: 0.9,
                ..BoundaryRegion::default()
            },
            ux: Some(0.1),
            uy: None,
        }];
        let constraints = Constraints::from_rules(&square(), &rules);

        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints.get(2), Some(0.1));
        assert_eq!(constraints.get(4), Some(0.1));
        assert_eq!(constraints.get(3), None);
    }
}
