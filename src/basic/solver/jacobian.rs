//! Polar-form Jacobian quadrants.
//!
//! Both Newton-Raphson solvers linearise complex-valued quantities `h(U)`
//! whose differential has the form `δh = C·δU + D·conj(δU)` around the
//! current iterate. With polar variables `U = V·e^{jθ}` this becomes a real
//! quadrant block `[[∂Re h/∂θ, ∂Re h/∂V], [∂Im h/∂θ, ∂Im h/∂V]]` built from
//!
//! ```text
//! α = j·(C·diag(U) − D·diag(conj U))          (θ columns)
//! β = (C·diag(U) + D·diag(conj U))·diag(1/V)  (V columns)
//! ```

use num_complex::Complex64;

use crate::basic::tensor::*;

/// Polar quadrants of a measurement touching bus `j` with linearisation
/// coefficients `C` (on `δU_j`) and `D` (on `conj δU_j`).
pub fn polar_quadrants<S: Symmetry>(
    c: S::Tensor,
    d: S::Tensor,
    u_j: S::Complex,
) -> (S::Tensor, S::Tensor) {
    let cu = c.scale_cols(u_j);
    let dcu = d.scale_cols(u_j.conj());
    let alpha = (cu - dcu).mul_scalar(Complex64::new(0.0, 1.0));
    let v_inv = S::Complex::from_re_im(u_j.cabs().recip(), S::Real::zero());
    let beta = (cu + dcu).scale_cols(v_inv);
    (alpha, beta)
}

/// `D` coefficient of a power quantity `S_m = diag(U_m)·conj(Y·U)` for the
/// block `Y_mj`: `D = diag(U_m)·conj(Y_mj)`.
pub fn power_coeff_d<S: Symmetry>(u_m: S::Complex, y_mj: S::Tensor) -> S::Tensor {
    y_mj.conj_ew().scale_rows(u_m)
}

/// Diagonal `C` coefficient of a power quantity: `C = diag(conj I_m)`.
pub fn power_coeff_c<S: Symmetry>(i_m: S::Complex) -> S::Tensor {
    S::Tensor::from_diag(i_m.conj())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    /// Finite-difference check of the quadrants for the symmetric power
    /// injection of a 1-bus system `S = U·conj(Y·U)`.
    #[test]
    fn test_polar_quadrants_match_finite_difference() {
        let y = Complex64::new(2.0, -5.0);
        let v = 1.05f64;
        let theta = -0.2f64;
        let s_of = |v: f64, th: f64| {
            let u = Complex64::from_polar(v, th);
            u * (y * u).conj()
        };
        let u = Complex64::from_polar(v, theta);
        let i = y * u;
        let c = power_coeff_c::<Symmetric>(i);
        let d = power_coeff_d::<Symmetric>(u, y);
        let (alpha, beta) = polar_quadrants::<Symmetric>(c, d, u);
        let block = Symmetric::jac_block(alpha, beta);

        let eps = 1e-7;
        let ds_dth = (s_of(v, theta + eps) - s_of(v, theta - eps)) / (2.0 * eps);
        let ds_dv = (s_of(v + eps, theta) - s_of(v - eps, theta)) / (2.0 * eps);
        let fd = nalgebra::Matrix2::new(ds_dth.re, ds_dv.re, ds_dth.im, ds_dv.im);
        assert!((block - fd).abs().max() < 1e-6, "{block} vs {fd}");

        // the block maps (δθ, δV) onto δS
        let delta = block * Vector2::new(1e-4, -2e-4);
        let s1 = s_of(v - 2e-4, theta + 1e-4);
        let s0 = s_of(v, theta);
        assert!((Complex64::new(delta[0], delta[1]) - (s1 - s0)).norm() < 1e-6);
    }
}
