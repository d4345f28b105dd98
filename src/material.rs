use nalgebra::{matrix, Matrix3};

use crate::error::{FeaError, Result};

/// Isotropic linear elastic material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearElastic {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub plane_stress: bool,
}

impl LinearElastic {
    /// Creates a material after checking that its constitutive matrix exists
    ///
    /// # Arguments
    /// * `youngs_modulus` - The modulus of elasticity, must be positive
    /// * `poisson_ratio` - Poisson ratio; below 0.5 for plane strain, below 1
    ///     for plane stress
    /// * `plane_stress` - Plane stress when true, plane strain otherwise
    pub fn new(youngs_modulus: f64, poisson_ratio: f64, plane_stress: bool) -> Result<Self> {
        if !(youngs_modulus > 0.0) {
            return Err(FeaError::InvalidMaterial(format!(
                "Young's modulus must be positive, got {youngs_modulus}"
            )));
        }

        let upper = if plane_stress { 1.0 } else { 0.5 };
        if !(poisson_ratio > -1.0 && poisson_ratio < upper) {
            return Err(FeaError::InvalidMaterial(format!(
                "Poisson ratio {poisson_ratio} outside (-1, {upper})"
            )));
        }

        Ok(LinearElastic {
            youngs_modulus,
            poisson_ratio,
            plane_stress,
        })
    }

    /// Calculates the stress-strain matrix
    ///
    /// # Returns
    /// A symmetric 3x3 matrix relating `[exx, eyy, gxy]` to `[sxx, syy, txy]`
    pub fn constitutive_matrix(&self) -> Matrix3<f64> {
        let e = self.youngs_modulus;
        let nu = self.poisson_ratio;

        if self.plane_stress {
            let mut d: Matrix3<f64> = matrix![
                1.0, nu, 0.0;
                nu, 1.0, 0.0;
                0.0, 0.0, (1.0 - nu) / 2.0;
            ];
            d *= e / (1.0 - f64::powi(nu, 2));
            d
        } else {
            let mut d: Matrix3<f64> = matrix![
                1.0 - nu, nu, 0.0;
                nu, 1.0 - nu, 0.0;
                0.0, 0.0, (1.0 - 2.0 * nu) / 2.0;
            ];
            d *= e / ((1.0 + nu) * (1.0 - 2.0 * nu));
            d
        }
    }
}
