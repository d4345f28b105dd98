use indicatif::ProgressBar;
use log::info;
use nalgebra::{DMatrix, Matrix3, SMatrix};

use crate::{
    datatypes::{Element, Mesh},
    element::element_stiffness_matrix,
    error::Result,
};

/// Adds one element stiffness matrix into the global stiffness matrix
///
/// # Arguments
/// * `total_stiffness_matrix` - The 2N x 2N global matrix
/// * `element` - The element the matrix belongs to
/// * `stiffness_mat` - The 6x6 element stiffness matrix
pub fn scatter_element(
    total_stiffness_matrix: &mut DMatrix<f64>,
    element: &Element,
    stiffness_mat: &SMatrix<f64, 6, 6>,
) {
    let dofs = element.dofs();

    for (local_row, global_row) in dofs.iter().enumerate() {
        for (local_col, global_col) in dofs.iter().enumerate() {
            total_stiffness_matrix[(*global_row, *global_col)] +=
                stiffness_mat[(local_row, local_col)];
        }
    }
}

/// Compiles element stiffness matrices into a total stiffness matrix
///
/// # Arguments
/// * `mesh` - The mesh to assemble over
/// * `constitutive` - The stress-strain matrix shared by every element
/// * `part_thickness` - The thickness of the part
///
/// # Returns
/// A dense, exactly symmetric 2N x 2N matrix
pub fn build_total_stiffness_matrix(
    mesh: &Mesh,
    constitutive: &Matrix3<f64>,
    part_thickness: f64,
) -> Result<DMatrix<f64>> {
    let ndof = mesh.dof_count();
    let mut total_stiffness_matrix: DMatrix<f64> = DMatrix::zeros(ndof, ndof);

    let bar = ProgressBar::new(mesh.elements().len() as u64);
    for element in mesh.elements() {
        let stiffness_mat = element_stiffness_matrix(
            &mesh.element_vertices(element),
            constitutive,
            part_thickness,
        )?;
        scatter_element(&mut total_stiffness_matrix, element, &stiffness_mat);
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "built {ndof}x{ndof} total stiffness matrix from {} elements",
        mesh.elements().len()
    );

    Ok(total_stiffness_matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatypes::Vertex, material::LinearElastic};
    use approx::assert_relative_eq;

    fn unit_square() -> Mesh {
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
    fn total_stiffness_is_symmetric() {
        let d = LinearElastic::new(200.0, 0.3, true)
            .unwrap()
            .constitutive_matrix();
        let k = build_total_stiffness_matrix(&unit_square(), &d, 1.0).unwrap();

        assert_eq!(k.shape(), (8, 8));
        assert_eq!(k, k.transpose());
    }

    #[test]
    fn element_order_does_not_change_result() {
        let mesh = unit_square();
        let reversed = Mesh::new(
            mesh.nodes().to_vec(),
            mesh.elements().iter().rev().copied().collect(),
        )
        .unwrap();
        let d = LinearElastic::new(200.0, 0.3, false)
            .unwrap()
            .constitutive_matrix();

        let k = build_total_stiffness_matrix(&mesh, &d, 2.0).unwrap();
        let k_rev = build_total_stiffness_matrix(&reversed, &d, 2.0).unwrap();

        for (a, b) in k.iter().zip(k_rev.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-12);
        }
    }

    #[test]
    fn shared_node_superposes_both_elements() {
        let mesh = unit_square();
        let d = LinearElastic::new(200.0, 0.3, true)
            .unwrap()
            .constitutive_matrix();
        let k = build_total_stiffness_matrix(&mesh, &d, 1.0).unwrap();

        let mut expected = 0.0;
        for element in mesh.elements() {
            let ke =
                element_stiffness_matrix(&mesh.element_vertices(element), &d, 1.0).unwrap();
            // node 0 is the first node in both elements
            expected += ke[(0, 0)];
        }
        assert_relative_eq!(k[(0, 0)], expected);
    }
}
