use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeaError>;

#[derive(Debug, Error)]
pub enum FeaError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Mesher error: {0}")]
    Mesher(String),
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("Invalid material: {0}")]
    InvalidMaterial(String),
    #[error("DOF {dof} out of range for {ndof} degrees of freedom")]
    OutOfRangeDof { dof: usize, ndof: usize },
    #[error("Singular system: {0}")]
    SingularSystem(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
