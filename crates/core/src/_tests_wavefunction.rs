#![cfg(test)]

use std::sync::Arc;

use num_complex::Complex64;

use super::array::{Array2, Array3};
use super::assignment::MatchRoutine;
use super::bands::{linspace, Bands};
use super::error::ResultsError;
use super::path::KPath;
use super::structure::{Structure, Sublattices};
use super::wavefunction::{LdosResult, Wavefunction};

fn c(re: f64) -> Complex64 {
    Complex64::new(re, 0.0)
}

fn line_path(n_k: usize) -> KPath {
    KPath::from_points((0..n_k).map(|k| vec![k as f64]).collect()).unwrap()
}

/// Two decoupled orbitals whose levels cross halfway along the path. The
/// eigensolver order swaps the eigenvectors once the crossing is passed.
fn crossing_model() -> Wavefunction {
    let n_k = 5;
    let mut energy = Vec::new();
    let mut psi = Vec::new();
    for k in 0..n_k {
        let rising = -1.0 + 0.5 * k as f64;
        let falling = 1.0 - 0.5 * k as f64;
        if k <= 2 {
            energy.push(vec![rising, falling]);
            psi.push(vec![vec![c(1.0), c(0.0)], vec![c(0.0), c(1.0)]]);
        } else {
            energy.push(vec![falling, rising]);
            psi.push(vec![vec![c(0.0), c(1.0)], vec![c(1.0), c(0.0)]]);
        }
    }
    let bands = Bands::new(line_path(n_k), Array2::from_rows(energy).unwrap()).unwrap();
    Wavefunction::new(bands, Array3::from_nested(psi).unwrap()).unwrap()
}

/// Two bands that jump onto orthogonal orbitals at the last k-point.
fn vanishing_model() -> Wavefunction {
    let e = |i: usize| -> Vec<Complex64> { (0..4).map(|j| c(if i == j { 1.0 } else { 0.0 })).collect() };
    let psi = vec![
        vec![e(0), e(1)],
        vec![e(0), e(1)],
        vec![e(2), e(3)],
    ];
    let energy = vec![vec![-1.0, 1.0], vec![-0.9, 0.9], vec![-0.8, 0.8]];
    let bands = Bands::new(line_path(3), Array2::from_rows(energy).unwrap()).unwrap();
    Wavefunction::new(bands, Array3::from_nested(psi).unwrap())
        .unwrap()
        .with_sublattices(
            Sublattices::new(vec![0, 1, 0, 1], vec![("A".into(), 0), ("B".into(), 1)]).unwrap(),
        )
        .unwrap()
}

fn dimer() -> Structure {
    Structure::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        vec!["A".into(), "B".into()],
    )
    .unwrap()
}

#[test]
fn crossing_bands_become_straight_lines() {
    let wfc = crossing_model();
    let sorted = wfc.bands_disentangled().unwrap();
    assert_eq!(sorted.num_bands(), 2);
    for k in 0..5 {
        let rising = -1.0 + 0.5 * k as f64;
        assert!((sorted.energy.get(k, 0) - rising).abs() < 1e-12);
        assert!((sorted.energy.get(k, 1) + rising).abs() < 1e-12);
    }
}

#[test]
fn overlap_and_engine_are_cached() {
    let wfc = crossing_model();
    let first = wfc.overlap_matrix().unwrap();
    assert_eq!(first.dims(), [4, 2, 2]);
    assert!(Arc::ptr_eq(&first, &wfc.overlap_matrix().unwrap()));
    let engine = wfc.disentangle().unwrap();
    assert!(Arc::ptr_eq(&engine, &wfc.disentangle().unwrap()));
}

#[test]
fn changing_routine_rebuilds_only_the_engine() {
    let mut wfc = crossing_model();
    let overlap = wfc.overlap_matrix().unwrap();
    let engine = wfc.disentangle().unwrap();
    wfc.set_routine(MatchRoutine::Greedy);
    let rebuilt = wfc.disentangle().unwrap();
    assert!(!Arc::ptr_eq(&engine, &rebuilt));
    assert_eq!(rebuilt.routine(), MatchRoutine::Greedy);
    assert!(Arc::ptr_eq(&overlap, &wfc.overlap_matrix().unwrap()));

    wfc.set_threshold(Some(0.0)).unwrap();
    assert_eq!(wfc.disentangle().unwrap().threshold(), 0.0);
    wfc.set_threshold(None).unwrap();
    assert!((wfc.disentangle().unwrap().threshold() - 4f64.powf(-0.25)).abs() < 1e-15);
    assert!(matches!(
        wfc.set_threshold(Some(f64::NAN)),
        Err(ResultsError::Configuration(_))
    ));
}

#[test]
fn fatbands_follow_the_orbital_character() {
    let wfc = crossing_model();
    let raw = wfc.fatbands().unwrap();
    assert_eq!(raw.data.dims(), [5, 2, 2]);
    assert_eq!(raw.data.lane(4, 0), &[0.0, 1.0]);

    let sorted = wfc.fatbands_disentangled().unwrap();
    for k in 0..5 {
        assert_eq!(sorted.data.lane(k, 0), &[1.0, 0.0]);
        assert_eq!(sorted.data.lane(k, 1), &[0.0, 1.0]);
    }
    assert_eq!(sorted.labels.data, "pDOS");
}

#[test]
fn fatbands_group_components_by_sublattice() {
    let wfc = vanishing_model();
    let fat = wfc.fatbands().unwrap();
    assert_eq!(fat.num_channels(), 2);
    assert_eq!(fat.labels.orbitals, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(fat.data.lane(2, 0), &[1.0, 0.0]);
    assert_eq!(fat.data.lane(2, 1), &[0.0, 1.0]);
}

#[test]
fn disentangled_energies_and_fatbands_share_nan_layout() {
    let wfc = vanishing_model();
    let bands = wfc.bands_disentangled().unwrap();
    let fat = wfc.fatbands_disentangled().unwrap();
    assert_eq!(bands.energy.shape(), (3, 4));
    assert_eq!(fat.data.dims(), [3, 4, 2]);
    for k in 0..3 {
        for slot in 0..4 {
            let missing = bands.energy.get(k, slot).is_nan();
            for &value in fat.data.lane(k, slot) {
                assert_eq!(value.is_nan(), missing, "k={k} slot={slot}");
            }
        }
    }
    for (a, b) in fat.bands.energy.as_slice().iter().zip(bands.energy.as_slice()) {
        assert!(a == b || (a.is_nan() && b.is_nan()));
    }
}

#[test]
fn spatial_ldos_integrates_to_one_state_per_site() {
    let wfc = crossing_model().with_structure(dimer()).unwrap();
    let energies = linspace(-5.0, 5.0, 2001);
    let step = energies[1] - energies[0];
    let LdosResult::Spatial(ldos) = wfc.spatial_ldos(Some(&energies), Some(0.1)).unwrap() else {
        panic!("a structure is attached, expected a spatial result");
    };
    assert_eq!(ldos.data.shape(), (2001, 2));
    for site in 0..2 {
        let integral: f64 = (0..2001).map(|e| ldos.data.get(e, site) * step).sum();
        assert!((integral - 1.0).abs() < 1e-6, "site {site}: {integral}");
    }

    let map = ldos.structure_map(-1.0).unwrap();
    assert_eq!(map.num_sites(), 2);
    let series = ldos.ldos(&[0.9, 0.1], None).unwrap();
    assert_eq!(series.labels.data, "LDOS");
    assert_eq!(series.column(0), (0..2001).map(|e| *ldos.data.get(e, 1)).collect::<Vec<_>>());
    assert!(matches!(
        ldos.ldos(&[0.0], Some("C")),
        Err(ResultsError::Configuration(_))
    ));
}

#[test]
fn spatial_ldos_without_structure_is_a_series() {
    let grouped = vanishing_model().spatial_ldos(None, None).unwrap();
    let LdosResult::Series(series) = grouped else {
        panic!("expected a series");
    };
    assert_eq!(series.variable.len(), 100);
    assert_eq!(series.labels.data, "sLDOS");
    assert_eq!(series.labels.orbitals, vec!["A".to_string(), "B".to_string()]);

    let LdosResult::Series(series) = crossing_model().spatial_ldos(None, Some(0.2)).unwrap() else {
        panic!("expected a series");
    };
    assert_eq!(series.num_columns(), 2);
    // symmetric spectrum: both orbitals see the same density
    for (a, b) in series.column(0).iter().zip(series.column(1)) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn mismatched_attachments_are_rejected() {
    let err = crossing_model()
        .with_sublattices(Sublattices::new(vec![0], vec![("A".into(), 0)]).unwrap())
        .unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));

    let err = vanishing_model().with_structure(dimer()).unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));

    let bands = Bands::new(line_path(2), Array2::from_elem(2, 2, 0.0)).unwrap();
    let err = Wavefunction::new(bands, Array3::from_elem([2, 3, 2], c(0.0))).unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));
}
