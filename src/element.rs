//! Constant-strain triangle kernel.
//!
//! Strain is ordered `[exx, eyy, gxy]` (engineering shear) and element
//! displacements `[ux0, uy0, ux1, uy1, ux2, uy2]`.

use nalgebra::{matrix, DVector, Matrix3, SMatrix, Vector3};

use crate::{
    datatypes::{Element, Mesh, Vertex},
    error::{FeaError, Result},
};

/// Triangles whose area falls below this fraction of their longest edge
/// squared are rejected as degenerate.
pub const AREA_TOLERANCE: f64 = 1e-10;

/// Calculates the signed area of a triangle; positive when counter-clockwise
pub fn signed_area(vertices: &[Vertex; 3]) -> f64 {
    let [v0, v1, v2] = vertices;

    0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
}

/// Checks a triangle against [`AREA_TOLERANCE`] and returns its signed area
pub fn checked_area(vertices: &[Vertex; 3]) -> Result<f64> {
    let area = signed_area(vertices);
    let [v0, v1, v2] = vertices;
    let longest = v0
        .distance_to(v1)
        .max(v1.distance_to(v2))
        .max(v2.distance_to(v0));

    if longest == 0.0 || area.abs() <= AREA_TOLERANCE * longest * longest {
        return Err(FeaError::DegenerateGeometry(format!(
            "Triangle {:?} has area {area:e}",
            vertices
        )));
    }

    Ok(area)
}

/// Calculates the strain-displacement matrix of a triangle
///
/// # Arguments
/// * `vertices` - The three corners in element node order
///
/// # Returns
/// The 3x6 strain-displacement matrix and the signed area of the triangle
pub fn strain_displacement_matrix(vertices: &[Vertex; 3]) -> Result<(SMatrix<f64, 3, 6>, f64)> {
    let area = checked_area(vertices)?;
    let [v0, v1, v2] = vertices;

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, 6> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * area;

    Ok((strain_displacement_mat, area))
}

/// Computes the stiffness matrix for a triangle
///
/// # Arguments
/// * `vertices` - The three corners in element node order
/// * `constitutive` - The stress-strain matrix of the material
/// * `part_thickness` - The thickness of the part
///
/// # Returns
/// A symmetric 6x6 stiffness matrix
pub fn element_stiffness_matrix(
    vertices: &[Vertex; 3],
    constitutive: &Matrix3<f64>,
    part_thickness: f64,
) -> Result<SMatrix<f64, 6, 6>> {
    let (b, area) = strain_displacement_matrix(vertices)?;

    let mut ke = (b.transpose() * constitutive) * b * area.abs() * part_thickness;

    // B^T D B loses exact symmetry to rounding
    for i in 0..6 {
        for j in (i + 1)..6 {
            let avg = 0.5 * (ke[(i, j)] + ke[(j, i)]);
            ke[(i, j)] = avg;
            ke[(j, i)] = avg;
        }
    }

    Ok(ke)
}

/// Strain recovered in a single element after a solve
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStrain {
    pub strain: Vector3<f64>,
    pub strain_displacement: SMatrix<f64, 3, 6>,
    pub area: f64,
}

impl ElementStrain {
    /// Stress in the element for a given constitutive matrix
    pub fn stress(&self, constitutive: &Matrix3<f64>) -> Vector3<f64> {
        constitutive * self.strain
    }
}

/// Recovers the constant strain of an element from the global displacements
///
/// # Arguments
/// * `mesh` - The mesh the displacements were solved on
/// * `element` - The element to target
/// * `displacements` - The global displacement vector, length `2N`
pub fn element_strain(
    mesh: &Mesh,
    element: &Element,
    displacements: &DVector<f64>,
) -> Result<ElementStrain> {
    if displacements.len() != mesh.dof_count() {
        return Err(FeaError::Input(format!(
            "Displacement vector has {} entries, mesh has {} DOFs",
            displacements.len(),
            mesh.dof_count()
        )));
    }

    let (b, area) = strain_displacement_matrix(&mesh.element_vertices(element))?;
    let local: SMatrix<f64, 6, 1> = SMatrix::from(element.dofs().map(|dof| displacements[dof]));

    Ok(ElementStrain {
        strain: b * local,
        strain_displacement: b,
        area: area.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::LinearElastic;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn right_triangle() -> [Vertex; 3] {
        [
            Vertex::new(0., 0.),
            Vertex::new(4., 0.),
            Vertex::new(0., 3.),
        ]
    }

    #[test]
    fn area_matches_geometry() {
        let tri = right_triangle();
        assert_relative_eq!(signed_area(&tri), 6.0);

        let flipped = [tri[0], tri[2], tri[1]];
        assert_relative_eq!(signed_area(&flipped), -6.0);
    }

    #[test]
    fn degenerate_triangle_is_rejected() {
        let tri = [
            Vertex::new(0., 0.),
            Vertex::new(1., 1.),
            Vertex::new(2., 2.),
        ];
        assert!(matches!(
            strain_displacement_matrix(&tri),
            Err(FeaError::DegenerateGeometry(_))
        ));

        let point = [Vertex::new(1., 1.); 3];
        assert!(checked_area(&point).is_err());
    }

    #[test]
    fn shape_derivative_rows_sum_to_zero() {
        let (b, _) = strain_displacement_matrix(&right_triangle()).unwrap();

        let dx: f64 = (0..3).map(|i| b[(0, 2 * i)]).sum();
        let dy: f64 = (0..3).map(|i| b[(1, 2 * i + 1)]).sum();
        assert_abs_diff_eq!(dx, 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(dy, 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(b.row(2).sum(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn orientation_does_not_change_gradients() {
        let tri = right_triangle();
        let (b, _) = strain_displacement_matrix(&tri).unwrap();
        let (b_flipped, _) = strain_displacement_matrix(&[tri[0], tri[2], tri[1]]).unwrap();

        // node 1 and node 2 swap columns
        assert_relative_eq!(b[(0, 2)], b_flipped[(0, 4)]);
        assert_relative_eq!(b[(1, 5)], b_flipped[(1, 3)]);
    }

    #[test]
    fn element_stiffness_is_symmetric_and_singular_to_translation() {
        let d = LinearElastic::new(30000.0, 0.2, false)
            .unwrap()
            .constitutive_matrix();
        let ke = element_stiffness_matrix(&right_triangle(), &d, 0.5).unwrap();

        assert_eq!(ke, ke.transpose());

        let translation = SMatrix::<f64, 6, 1>::from([1.0, -2.0, 1.0, -2.0, 1.0, -2.0]);
        let forces = ke * translation;
        for f in forces.iter() {
            assert_abs_diff_eq!(*f, 0.0, epsilon = 1e-9);
        }
    }
}
