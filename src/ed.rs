use std::path::{ Path, PathBuf };
use anyhow::Context;
use clap::Parser;
use log::info;
use ndarray as nd;
use num_complex::Complex64 as C64;
use lehmann_ed::{
    mkdir,
    write_npz,
    config::{ Config, RunConfig },
    density::DensityMatrix,
    dispatch::Communicator,
    field_op::FieldOperatorContainer,
    greens::{
        GfContainer,
        SusceptibilityContainer,
        TwoParticleGfContainer,
        Vertex4Container,
        container::QuadraticOperators,
        bosonic,
        fermionic,
    },
    hamiltonian::Hamiltonian,
    index::IndexInfo,
    linalg::Elem,
    operator::Operator,
    states::StatesClassification,
    symmetrizer::{ Symmetrizer, default_candidates },
};

/// Exact diagonalization of a fermionic lattice model.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML file with `[run]` and `[model]` tables.
    config: PathBuf,

    /// Compute one-particle Green's functions.
    #[arg(long)]
    calcgf: bool,

    /// Compute two-particle Green's functions and vertices.
    #[arg(long)]
    calc2pgf: bool,

    /// Override the inverse temperature.
    #[arg(long)]
    beta: Option<f64>,

    /// Override the number of positive fermionic Matsubara frequencies.
    #[arg(long)]
    wf: Option<usize>,

    /// Override the number of bosonic Matsubara frequencies.
    #[arg(long)]
    wb: Option<usize>,

    /// Override the output archive.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also dump one- and two-particle term lists into this directory.
    #[arg(long)]
    pom: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let run = &mut config.run;
    run.calc_gf |= cli.calcgf;
    run.calc_2pgf |= cli.calc2pgf;
    if let Some(beta) = cli.beta { run.beta = beta; }
    if let Some(wf) = cli.wf { run.n_fermionic = wf; }
    if let Some(wb) = cli.wb { run.n_bosonic = wb; }
    if let Some(output) = cli.output { run.output = output; }
    anyhow::ensure!(
        run.beta.is_finite() && run.beta > 0.0,
        "beta must be positive and finite, got {}", run.beta,
    );

    let lattice = config.model.lattice()?;
    let index = lattice.index_info()?;
    let op = lattice.hamiltonian(&index)?;

    #[cfg(feature = "mpi")]
    let comm = lehmann_ed::dispatch::mpi::MpiComm::init()?;
    #[cfg(not(feature = "mpi"))]
    let comm = lehmann_ed::dispatch::LocalComm::world(1)
        .pop()
        .context("creating communicator")?;

    if op.is_real() {
        run_model::<f64, _>(&config.run, cli.pom.as_deref(), &index, &op, &comm)
    } else {
        run_model::<C64, _>(&config.run, cli.pom.as_deref(), &index, &op, &comm)
    }
}

fn run_model<T, C>(
    config: &RunConfig,
    pom: Option<&Path>,
    index: &IndexInfo,
    op: &Operator,
    comm: &C,
) -> anyhow::Result<()>
where
    T: Elem,
    C: Communicator + ?Sized,
{
    let tol = config.tolerances;
    let n_modes = index.num_modes();
    let wf = config.n_fermionic;
    let wb = config.n_bosonic;

    let mut sym = Symmetrizer::new(index, op)?;
    sym.compute(default_candidates(index))?;
    let states = StatesClassification::compute(&sym)?;
    let mut H: Hamiltonian<T> = Hamiltonian::prepare(op, &states)?;
    H.compute()?;
    let mut rho = DensityMatrix::new(&states, &H, config.beta);
    rho.compute()?;
    if tol.density_truncation > 0.0 {
        rho.truncate_blocks(tol.density_truncation)?;
    }
    let E_avg = rho.average_energy()?;
    let N_avg = rho.average_occupancy()?;
    info!("<E> = {:.12}, <N> = {:.12}", E_avg, N_avg);

    let ops = FieldOperatorContainer::compute(&states, &H, tol.matrix_element)?;

    let chi4 = if config.calc_2pgf {
        let mut chi4 = TwoParticleGfContainer::new(&ops, &rho, tol.two_particle);
        chi4.prepare(config.two_particle_indices(n_modes)?)?;
        chi4.compute(comm)?;
        Some(chi4)
    } else {
        None
    };

    let mut gf = GfContainer::new(&ops, &rho, tol);
    if config.calc_gf { gf.prepare(config.gf_pairs(n_modes)?)?; }
    if let Some(chi4) = chi4.as_ref() { gf.prepare(chi4.required_gf_pairs())?; }
    gf.compute()?;

    let quadratic = QuadraticOperators::compute(
        config.susceptibilities.iter()
            .flat_map(|[i, j, k, l]| [(*i, *j), (*k, *l)]),
        &states,
        &H,
        tol.matrix_element,
    )?;
    let mut sus = SusceptibilityContainer::new(&quadratic, &rho, tol);
    if config.subtract_disconnected { sus = sus.with_disconnected_subtracted(); }
    sus.prepare(config.susceptibilities.iter().copied())?;
    sus.compute()?;

    if !comm.is_root() { return Ok(()); }

    let quads: Vec<[usize; 4]>
        = chi4.as_ref()
        .map(|c| c.indices().collect())
        .unwrap_or_default();
    let n = 2 * wf;
    let mut chi4_table: nd::Array4<C64>
        = nd::Array4::zeros((quads.len(), n, n, n));
    let mut gamma4_table: nd::Array4<C64>
        = nd::Array4::zeros((quads.len(), n, n, n));
    if let Some(chi4) = chi4.as_ref() {
        let gamma4 = Vertex4Container::new(chi4, &gf)?;
        let off = wf as i64;
        for (k, q) in quads.iter().enumerate() {
            for ((a, b, c), x) in chi4_table.index_axis_mut(nd::Axis(0), k)
                .indexed_iter_mut()
            {
                *x = chi4.value(*q, a as i64 - off, b as i64 - off, c as i64 - off)?;
            }
            gamma4_table.index_axis_mut(nd::Axis(0), k)
                .assign(&gamma4.matsubara_cube(*q, wf)?);
        }
    }

    let gf_pairs: nd::Array2<u64>
        = gf.pairs()
        .flat_map(|(i, j)| [i as u64, j as u64])
        .collect::<nd::Array1<u64>>()
        .into_shape((gf.len(), 2))?;
    let quad_table: nd::Array2<u64>
        = quads.iter()
        .flat_map(|q| q.map(|p| p as u64))
        .collect::<nd::Array1<u64>>()
        .into_shape((quads.len(), 4))?;
    let sus_table: nd::Array2<u64>
        = sus.indices()
        .flat_map(|q| q.map(|p| p as u64))
        .collect::<nd::Array1<u64>>()
        .into_shape((sus.len(), 4))?;
    let w_fermi: nd::Array1<f64>
        = (0..wf as i64).map(|n| fermionic(n, config.beta).im).collect();
    let w_bose: nd::Array1<f64>
        = (0..wb as i64).map(|n| bosonic(n, config.beta).im).collect();

    if let Some(parent) = config.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        mkdir!(parent)?;
    }
    write_npz!(
        &config.output,
        arrays: {
            "beta" => &nd::array![config.beta],
            "eigenvalues" => &H.all_eigenvalues()?,
            "ground_energy" => &nd::array![H.ground_energy()?],
            "average_energy" => &nd::array![E_avg],
            "average_occupancy" => &nd::array![N_avg],
            "fermionic" => &w_fermi,
            "bosonic" => &w_bose,
            "gf_pairs" => &gf_pairs,
            "gf" => &gf.matsubara_table(wf),
            "susceptibility_indices" => &sus_table,
            "susceptibility" => &sus.matsubara_table(wb),
            "two_particle_indices" => &quad_table,
            "chi4" => &chi4_table,
            "gamma4" => &gamma4_table,
        }
    )?;
    info!("wrote {}", config.output.display());

    if let Some(dir) = pom {
        mkdir!(dir)?;
        let mut n_files = gf.save_pom(dir)?;
        if let Some(chi4) = chi4.as_ref() { n_files += chi4.save_pom(dir)?; }
        info!("wrote {} term lists to {}", n_files, dir.display());
    }
    Ok(())
}
