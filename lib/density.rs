//! Thermal (grand-canonical) density matrix in the Hamiltonian eigenbasis.

use log::{ debug, info };
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ EdError, EdResult },
    hamiltonian::{ self, Hamiltonian },
    linalg::{ self, Elem },
    operator::{ Operator, presets },
    states::{ BlockNumber, StatesClassification },
};

/// Boltzmann weights of a single block.
#[derive(Clone, Debug)]
pub struct DensityMatrixPart {
    weights: nd::Array1<f64>,
    retained: bool,
}

impl DensityMatrixPart {
    /// Normalized weights, in the order of the block's eigenvalues.
    pub fn weights(&self) -> &nd::Array1<f64> { &self.weights }

    /// Largest weight in the block.
    pub fn max_weight(&self) -> f64 {
        self.weights.iter().copied().fold(0.0, f64::max)
    }

    /// `false` if the block was marked negligible by
    /// [`DensityMatrix::truncate_blocks`].
    pub fn is_retained(&self) -> bool { self.retained }
}

/// Diagonal density matrix `ρ = exp(-β H) / Z`.
///
/// Weights are computed relative to the ground energy, `exp(-β (E - E0))`, so
/// that the largest weight before normalization is exactly one.
#[derive(Clone, Debug)]
pub struct DensityMatrix<'a, T>
where T: Elem
{
    states: &'a StatesClassification,
    hamiltonian: &'a Hamiltonian<T>,
    beta: f64,
    parts: Vec<DensityMatrixPart>,
    z: f64,
}

impl<'a, T> DensityMatrix<'a, T>
where T: Elem
{
    /// Create a new, uncomputed density matrix at inverse temperature `beta`.
    pub fn new(
        states: &'a StatesClassification,
        hamiltonian: &'a Hamiltonian<T>,
        beta: f64,
    ) -> Self
    {
        Self { states, hamiltonian, beta, parts: Vec::new(), z: 0.0 }
    }

    /// Compute all weights and the partition function.
    pub fn compute(&mut self) -> EdResult<()> {
        if self.is_computed() { return Ok(()); }
        let e0 = self.hamiltonian.ground_energy()?;
        let beta = self.beta;
        let mut parts: Vec<DensityMatrixPart>
            = (0..self.hamiltonian.num_blocks())
            .map(|b| {
                self.hamiltonian.eigenvalues(b)
                    .map(|E| DensityMatrixPart {
                        weights: E.mapv(|e| (-beta * (e - e0)).exp()),
                        retained: true,
                    })
            })
            .collect::<EdResult<_>>()?;
        let z: f64 = parts.iter().map(|p| p.weights.sum()).sum();
        parts.iter_mut().for_each(|p| { p.weights /= z; });
        info!("partition function (relative to ground energy): {:.12e}", z);
        self.parts = parts;
        self.z = z;
        Ok(())
    }

    /// Return `true` if [`Self::compute`] has run.
    pub fn is_computed(&self) -> bool { !self.parts.is_empty() }

    fn check(&self) -> EdResult<()> {
        self.is_computed().then_some(())
            .ok_or(EdError::NotComputed("density matrix"))
    }

    /// Inverse temperature.
    pub fn beta(&self) -> f64 { self.beta }

    /// States classification the weights refer to.
    pub fn states(&self) -> &'a StatesClassification { self.states }

    /// Hamiltonian the weights refer to.
    pub fn hamiltonian(&self) -> &'a Hamiltonian<T> { self.hamiltonian }

    /// Partition function `Σ exp(-β (E - E0))`.
    pub fn partition_function(&self) -> EdResult<f64> {
        self.check()?;
        Ok(self.z)
    }

    /// Grand potential `-ln(Z) / β`, including the ground energy.
    pub fn grand_potential(&self) -> EdResult<f64> {
        let e0 = self.hamiltonian.ground_energy()?;
        Ok(e0 - self.partition_function()?.ln() / self.beta)
    }

    /// Part for a block.
    pub fn part(&self, b: BlockNumber) -> EdResult<&DensityMatrixPart> {
        self.check()?;
        self.parts.get(b).ok_or(EdError::NoSuchBlock(b))
    }

    /// Normalized weights of a block.
    pub fn weights(&self, b: BlockNumber) -> EdResult<&nd::Array1<f64>> {
        self.part(b).map(|p| &p.weights)
    }

    /// Normalized weight of the `i`-th eigenstate of a block.
    pub fn weight(&self, b: BlockNumber, i: usize) -> EdResult<f64> {
        self.weights(b).map(|w| w[i])
    }

    /// Mark blocks whose largest weight is below `tol` as negligible and return
    /// the number of blocks retained.
    pub fn truncate_blocks(&mut self, tol: f64) -> EdResult<usize> {
        self.check()?;
        for (b, part) in self.parts.iter_mut().enumerate() {
            part.retained = part.max_weight() >= tol;
            if !part.retained { debug!("block {} marked negligible", b); }
        }
        let retained = self.parts.iter().filter(|p| p.retained).count();
        info!("retained {} of {} blocks", retained, self.parts.len());
        Ok(retained)
    }

    /// Return `true` if block `b` has not been marked negligible.
    pub fn is_retained(&self, b: BlockNumber) -> bool {
        self.parts.get(b).map(|p| p.retained).unwrap_or(false)
    }

    /// Thermal average of the energy.
    pub fn average_energy(&self) -> EdResult<f64> {
        self.check()?;
        (0..self.parts.len())
            .map(|b| -> EdResult<f64> {
                let E = self.hamiltonian.eigenvalues(b)?;
                Ok(E.dot(&self.parts[b].weights))
            })
            .sum()
    }

    /// Thermal average of an operator that does not connect different blocks.
    pub fn ensemble_average(&self, op: &Operator) -> EdResult<C64> {
        self.check()?;
        if !T::IS_COMPLEX && !op.is_real() {
            return Err(EdError::ComplexCoefficients);
        }
        let mut acc = C64::from(0.0);
        for (b, part) in self.parts.iter().enumerate() {
            let M: nd::Array2<T>
                = hamiltonian::operator_block_matrix(op, self.states, b)?;
            let U = self.hamiltonian.eigenvectors(b)?;
            let diag = linalg::adjoint(U).dot(&M).dot(U).into_diag();
            acc += diag.iter().zip(part.weights.iter())
                .map(|(x, w)| x.to_c64() * *w)
                .sum::<C64>();
        }
        Ok(acc)
    }

    /// Thermal average of the total particle number.
    pub fn average_occupancy(&self) -> EdResult<f64> {
        let n = presets::total_number(self.states.n_modes());
        self.ensemble_average(&n).map(|x| x.re)
    }

    /// Thermal average of the occupation of a single mode.
    pub fn average_mode_occupancy(&self, p: usize) -> EdResult<f64> {
        if p >= self.states.n_modes() {
            return Err(EdError::ModeOutOfRange(p, self.states.n_modes()));
        }
        self.ensemble_average(&presets::n(p)).map(|x| x.re)
    }

    /// Thermal average `⟨n_i n_j⟩`.
    pub fn average_double_occupancy(&self, i: usize, j: usize) -> EdResult<f64> {
        let n_modes = self.states.n_modes();
        if let Some(p) = [i, j].into_iter().find(|p| *p >= n_modes) {
            return Err(EdError::ModeOutOfRange(p, n_modes));
        }
        self.ensemble_average(&(&presets::n(i) * &presets::n(j)))
            .map(|x| x.re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lattice::Lattice,
        symmetrizer::{ Symmetrizer, default_candidates },
    };

    #[test]
    fn atomic_limit_weights() {
        let (u, mu, beta) = (1.0, 0.4, 10.0);
        let mut lat = Lattice::new();
        lat.add_site("A", 1, 2).unwrap();
        lat.add_coulomb_s("A", u, -mu).unwrap();
        let index = lat.index_info().unwrap();
        let op = lat.hamiltonian(&index).unwrap();
        let mut sym = Symmetrizer::new(&index, &op).unwrap();
        sym.compute(default_candidates(&index)).unwrap();
        let states = StatesClassification::compute(&sym).unwrap();
        let mut H: Hamiltonian<f64> = Hamiltonian::prepare(&op, &states).unwrap();
        H.compute().unwrap();
        let mut rho = DensityMatrix::new(&states, &H, beta);
        assert!(rho.average_energy().is_err());
        rho.compute().unwrap();

        let total: f64
            = (0..states.num_blocks())
            .map(|b| rho.weights(b).unwrap().sum())
            .sum();
        assert!((total - 1.0).abs() < 1e-14);

        let energies = [0.0, -mu, -mu, u - 2.0 * mu];
        let boltz: Vec<f64>
            = energies.iter().map(|e| (-beta * e).exp()).collect();
        let z: f64 = boltz.iter().sum();
        let e_avg: f64
            = energies.iter().zip(&boltz).map(|(e, w)| e * w).sum::<f64>() / z;
        let n_avg: f64 = (boltz[1] + boltz[2] + 2.0 * boltz[3]) / z;
        let d_avg: f64 = boltz[3] / z;
        assert!((rho.average_energy().unwrap() - e_avg).abs() < 1e-12);
        assert!((rho.average_occupancy().unwrap() - n_avg).abs() < 1e-12);
        assert!((rho.average_mode_occupancy(0).unwrap() - n_avg / 2.0).abs() < 1e-12);
        assert!((rho.average_double_occupancy(0, 1).unwrap() - d_avg).abs() < 1e-12);
        assert!(rho.average_mode_occupancy(2).is_err());

        let retained = rho.truncate_blocks(5e-3).unwrap();
        assert_eq!(retained, 3);
    }
}
