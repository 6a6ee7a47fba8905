use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bandweave_core::{
    assignment::MatchRoutine,
    bands::{Bands, FatBands},
    io::JobConfig,
    series::Series,
    wavefunction::{LdosResult, SpatialLdos, Wavefunction},
};
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "bandweave", about = "Disentangle crossing bands of a tight-binding model")]
struct Cli {
    /// Path to a TOML job file
    #[arg(short, long)]
    config: PathBuf,
    /// Path to CSV output (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Table to write
    #[arg(long, value_enum, default_value_t = TableArg::Bands)]
    table: TableArg,
    /// Override the matching routine from the job file
    #[arg(long, value_enum)]
    routine: Option<RoutineArg>,
    /// Override the match threshold from the job file
    #[arg(long)]
    threshold: Option<f64>,
    /// Keep the eigensolver band order instead of disentangling
    #[arg(long)]
    raw: bool,
    /// Suppress progress logs (stderr)
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TableArg {
    /// Energies per k-point and band
    Bands,
    /// Energies with the projected density of every channel
    Fatbands,
    /// Density of states
    Dos,
    /// Density of states projected on every channel
    Pdos,
    /// Local density of states per site or sublattice
    Ldos,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoutineArg {
    Greedy,
    Optimal,
}

impl From<RoutineArg> for MatchRoutine {
    fn from(value: RoutineArg) -> Self {
        match value {
            RoutineArg::Greedy => MatchRoutine::Greedy,
            RoutineArg::Optimal => MatchRoutine::Optimal,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if !cli.quiet {
        eprintln!("[cli] loading config {}", cli.config.display());
    }
    let config = JobConfig::from_file(&cli.config)?;
    if !cli.quiet {
        eprintln!("[cli] reading wavefunction {}", config.input.display());
    }
    let mut wavefunction = config.load_wavefunction()?;
    if let Some(routine) = cli.routine {
        wavefunction.set_routine(routine.into());
        if !cli.quiet {
            eprintln!("[cli] overriding routine via --routine ({})", wavefunction.routine());
        }
    }
    if let Some(threshold) = cli.threshold {
        wavefunction.set_threshold(Some(threshold))?;
    }
    if !cli.quiet {
        let [n_k, n_b, n_c] = wavefunction.wavefunction().dims();
        eprintln!("[cli] {n_k} k-points, {n_b} bands, {n_c} components");
    }

    if !cli.raw {
        let engine = wavefunction.disentangle()?;
        let matrix = engine.disentangle_matrix()?;
        if !cli.quiet {
            eprintln!(
                "[disentangle] routine={} threshold={:.4} slots={} retired={}",
                engine.routine(),
                engine.threshold(),
                matrix.working_slots(),
                matrix.retired_tracks()
            );
        }
    }

    if !cli.quiet {
        if let Some(dest) = &cli.output {
            eprintln!("[cli] writing {:?} CSV to {}", cli.table, dest.display());
        } else {
            eprintln!("[cli] streaming {:?} CSV to stdout", cli.table);
        }
    }
    let rows = emit_table(&cli, &config, &wavefunction, cli.output.as_deref())?;
    if !cli.quiet {
        if let Some(path) = &cli.output {
            eprintln!("wrote {rows} rows to {}", path.display());
        } else {
            eprintln!("wrote {rows} rows to stdout");
        }
    }
    Ok(())
}

fn emit_table(
    cli: &Cli,
    config: &JobConfig,
    wavefunction: &Wavefunction,
    dest: Option<&Path>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut writer: Box<dyn Write> = match dest {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let broadening = config.dos.broadening;
    let rows = match cli.table {
        TableArg::Bands => {
            let bands = if cli.raw {
                wavefunction.bands().clone()
            } else {
                wavefunction.bands_disentangled()?
            };
            write_bands_csv(&bands, &mut writer)?
        }
        TableArg::Fatbands | TableArg::Pdos => {
            let fatbands = if cli.raw {
                wavefunction.fatbands()?
            } else {
                wavefunction.fatbands_disentangled()?
            };
            if cli.table == TableArg::Fatbands {
                write_fatbands_csv(&fatbands, &mut writer)?
            } else {
                let energies = config.dos.energy_grid(&fatbands.bands.energy);
                write_series_csv(&fatbands.dos(energies.as_deref(), broadening)?, &mut writer)?
            }
        }
        TableArg::Dos => {
            let bands = wavefunction.bands();
            let energies = config.dos.energy_grid(&bands.energy);
            write_series_csv(&bands.dos(energies.as_deref(), broadening)?, &mut writer)?
        }
        TableArg::Ldos => {
            let energies = config.dos.energy_grid(&wavefunction.bands().energy);
            match wavefunction.spatial_ldos(energies.as_deref(), broadening)? {
                LdosResult::Spatial(ldos) => write_spatial_ldos_csv(&ldos, &mut writer)?,
                LdosResult::Series(series) => write_series_csv(&series, &mut writer)?,
            }
        }
    };
    writer.flush()?;
    Ok(rows)
}

/// Empty cell for NaN padding, so spreadsheet tools show gaps.
fn cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn channel_names(orbitals: &[String], count: usize) -> Vec<String> {
    if orbitals.len() == count {
        orbitals.to_vec()
    } else if count == 1 {
        vec!["value".to_string()]
    } else {
        (0..count).map(|c| format!("ch{c}")).collect()
    }
}

fn write_bands_csv(bands: &Bands, writer: &mut dyn Write) -> io::Result<usize> {
    let distances = bands.k_path.as_1d();
    write!(writer, "k_index,k_distance")?;
    for band_idx in 0..bands.num_bands() {
        write!(writer, ",band{}", band_idx + 1)?;
    }
    writeln!(writer)?;

    for (idx, distance) in distances.iter().enumerate().take(bands.num_k()) {
        write!(writer, "{idx},{distance}")?;
        for &energy in bands.energy.row(idx) {
            write!(writer, ",{}", cell(energy))?;
        }
        writeln!(writer)?;
    }
    Ok(bands.num_k())
}

/// Long format: one row per `(k, band)` that carries a state.
fn write_fatbands_csv(fatbands: &FatBands, writer: &mut dyn Write) -> io::Result<usize> {
    let [n_k, n_b, n_c] = fatbands.data.dims();
    let distances = fatbands.bands.k_path.as_1d();
    write!(writer, "k_index,k_distance,band,energy")?;
    for name in channel_names(&fatbands.labels.orbitals, n_c) {
        write!(writer, ",{name}")?;
    }
    writeln!(writer)?;

    let mut rows = 0;
    for k in 0..n_k {
        for b in 0..n_b {
            let energy = *fatbands.bands.energy.get(k, b);
            if energy.is_nan() {
                continue;
            }
            write!(writer, "{k},{},{b},{energy}", distances[k])?;
            for &value in fatbands.data.lane(k, b) {
                write!(writer, ",{}", cell(value))?;
            }
            writeln!(writer)?;
            rows += 1;
        }
    }
    Ok(rows)
}

fn write_series_csv(series: &Series, writer: &mut dyn Write) -> io::Result<usize> {
    let n_cols = series.num_columns();
    write!(writer, "energy")?;
    if n_cols == 1 {
        write!(writer, ",{}", series.labels.data)?;
    } else {
        for name in channel_names(&series.labels.orbitals, n_cols) {
            write!(writer, ",{name}")?;
        }
    }
    writeln!(writer)?;

    for (row, energy) in series.variable.iter().enumerate() {
        write!(writer, "{energy}")?;
        for &value in series.data.row(row) {
            write!(writer, ",{}", cell(value))?;
        }
        writeln!(writer)?;
    }
    Ok(series.variable.len())
}

fn write_spatial_ldos_csv(ldos: &SpatialLdos, writer: &mut dyn Write) -> io::Result<usize> {
    write!(writer, "energy")?;
    for (site, sublattice) in ldos.structure.sublattices().iter().enumerate() {
        write!(writer, ",site{site}_{sublattice}")?;
    }
    writeln!(writer)?;

    for (row, energy) in ldos.energy.iter().enumerate() {
        write!(writer, "{energy}")?;
        for &value in ldos.data.row(row) {
            write!(writer, ",{}", cell(value))?;
        }
        writeln!(writer)?;
    }
    Ok(ldos.energy.len())
}
