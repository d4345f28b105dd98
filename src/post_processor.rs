use std::io::{BufWriter, Write};

use log::info;

use geofea::{Mesh, Result, Solution};

/// Writes nodal displacements as `x,y,ux,uy`
pub fn write_nodes<W: Write>(out: W, mesh: &Mesh, solution: &Solution) -> Result<()> {
    let mut out = BufWriter::new(out);

    writeln!(out, "x,y,ux,uy")?;
    for (i, node) in mesh.nodes().iter().enumerate() {
        let (ux, uy) = solution.node_displacement(i);
        writeln!(out, "{},{},{ux},{uy}", node.x, node.y)?;
    }
    out.flush()?;

    Ok(())
}

/// Writes element connectivity and strain as `n0,n1,n2,exx,eyy,gxy`
pub fn write_elements<W: Write>(out: W, mesh: &Mesh, solution: &Solution) -> Result<()> {
    let mut out = BufWriter::new(out);
    let strains = solution.element_strains(mesh)?;

    writeln!(out, "n0,n1,n2,exx,eyy,gxy")?;
    for (element, strain) in mesh.elements().iter().zip(strains) {
        let [n0, n1, n2] = element.nodes;
        let e = strain.strain;
        writeln!(out, "{n0},{n1},{n2},{},{},{}", e[0], e[1], e[2])?;
    }
    out.flush()?;

    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `solution` - The displacements solved on `mesh`
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    mesh: &Mesh,
    solution: &Solution,
    nodes_output: &str,
    elements_output: &str,
) -> Result<()> {
    write_nodes(std::fs::File::create(nodes_output)?, mesh, solution)?;
    write_elements(std::fs::File::create(elements_output)?, mesh, solution)?;

    info!("wrote output to {} and {}", nodes_output, elements_output);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofea::{Element, Vertex};
    use nalgebra::DVector;

    #[test]
    fn writes_displacements_and_strains() {
        let mesh = Mesh::new(
            vec![
                Vertex::new(0., 0.),
                Vertex::new(2., 0.),
                Vertex::new(0., 2.),
            ],
            vec![Element { nodes: [0, 1, 2] }],
        )
        .unwrap();
        let solution = Solution {
            displacements: DVector::from_vec(vec![0.0, 0.0, 0.5, 0.0, 0.0, 0.0]),
            reactions: DVector::zeros(6),
        };

        let mut nodes = Vec::new();
        write_nodes(&mut nodes, &mesh, &solution).unwrap();
        let nodes = String::from_utf8(nodes).unwrap();
        assert_eq!(nodes.lines().nth(2), Some("2,0,0.5,0"));

        let mut elements = Vec::new();
        write_elements(&mut elements, &mesh, &solution).unwrap();
        let elements = String::from_utf8(elements).unwrap();
        assert_eq!(elements.lines().nth(1), Some("0,1,2,0.25,0,0"));
    }
}
