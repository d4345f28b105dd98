//! Two-dimensional linear elastic analysis with constant-strain triangles.
//!
//! The pipeline runs region -> [`mesher`] -> [`loads`] and [`assembly`] ->
//! [`solver`]. Every solve builds a fresh stiffness matrix, force vector and
//! displacement vector from the mesh, material, loads and constraints it is
//! given; nothing is cached between calls.

pub mod assembly;
pub mod boundary;
pub mod datatypes;
pub mod element;
pub mod error;
pub mod loads;
pub mod material;
pub mod mesher;
pub mod solver;

pub use datatypes::{Element, Load, Mesh, ModelMetadata, PolyRegion, Vertex, DOF};
pub use error::{FeaError, Result};
pub use loads::LoadMapping;
pub use material::LinearElastic;
pub use mesher::{AutoMesher, GmshMesher, GridMesher, MeshOptions, Triangulator};
pub use solver::{BoundaryRegion, BoundaryRule, Constraints, Solution};
