//! Scalar types usable as Hamiltonian matrix elements, and small dense-matrix
//! helpers.

use ndarray::{ self as nd, LinalgScalar, ScalarOperand };
use ndarray_linalg::types::{ Scalar, Lapack };
use num_complex::Complex64 as C64;

/// Matrix element type: `f64` for real symmetric Hamiltonians, `C64` for
/// complex Hermitian ones.
pub trait Elem
where Self: Lapack + Scalar<Real = f64> + LinalgScalar + ScalarOperand
    + Send + Sync + std::fmt::Debug
{
    /// `true` if the type can hold non-real values.
    const IS_COMPLEX: bool;

    /// Convert from a complex coefficient, discarding any imaginary part for
    /// real types.
    fn from_c64(z: C64) -> Self;

    /// Convert to a complex number.
    fn to_c64(self) -> C64;

    /// Complex conjugate.
    fn conjugate(self) -> Self;

    /// Absolute value.
    fn modulus(self) -> f64;
}

impl Elem for f64 {
    const IS_COMPLEX: bool = false;

    fn from_c64(z: C64) -> Self { z.re }

    fn to_c64(self) -> C64 { C64::from(self) }

    fn conjugate(self) -> Self { self }

    fn modulus(self) -> f64 { self.abs() }
}

impl Elem for C64 {
    const IS_COMPLEX: bool = true;

    fn from_c64(z: C64) -> Self { z }

    fn to_c64(self) -> C64 { self }

    fn conjugate(self) -> Self { self.conj() }

    fn modulus(self) -> f64 { self.norm() }
}

/// Return the conjugate transpose of a matrix.
pub fn adjoint<T>(m: &nd::Array2<T>) -> nd::Array2<T>
where T: Elem
{
    m.t().mapv(T::conjugate)
}

/// Copy the upper triangle of a square matrix onto its lower triangle,
/// conjugating along the way.
pub fn mirror_upper<T>(m: &mut nd::Array2<T>)
where T: Elem
{
    let n = m.nrows();
    for i in 0..n {
        for j in 0..i {
            m[[i, j]] = m[[j, i]].conjugate();
        }
    }
}

/// Compute `U_to† · M · U_from`.
pub fn rotate<T>(
    u_to: &nd::Array2<T>,
    m: &nd::Array2<T>,
    u_from: &nd::Array2<T>,
) -> nd::Array2<T>
where T: Elem
{
    adjoint(u_to).dot(m).dot(u_from)
}

/// Set every element with absolute value below `tol` to exactly zero.
pub fn prune<T>(m: &mut nd::Array2<T>, tol: f64)
where T: Elem
{
    m.mapv_inplace(|x| if x.modulus() < tol { T::zero() } else { x });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_is_hermitian() {
        let mut m: nd::Array2<C64> = nd::array![
            [C64::from(1.0), C64::new(0.0, 2.0)],
            [C64::from(0.0), C64::from(3.0)],
        ];
        mirror_upper(&mut m);
        assert_eq!(m, adjoint(&m));
        assert_eq!(m[[1, 0]], C64::new(0.0, -2.0));
    }

    #[test]
    fn pruning() {
        let mut m: nd::Array2<f64> = nd::array![[1e-10, 0.5], [-1e-9, -2.0]];
        prune(&mut m, 1e-8);
        assert_eq!(m, nd::array![[0.0, 0.5], [0.0, -2.0]]);
    }
}
