#![cfg(test)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::array::{Array2, Array3};
use super::assignment::MatchRoutine;
use super::disentangle::Disentangle;
use super::error::ResultsError;
use super::metrics::{MetricsFormat, MetricsRecorder};

fn overlap(steps: Vec<Vec<Vec<f64>>>) -> Arc<Array3<f64>> {
    Arc::new(Array3::from_nested(steps).unwrap())
}

fn crossing_overlap() -> Arc<Array3<f64>> {
    overlap(vec![
        vec![vec![0.9, 0.1], vec![0.1, 0.9]],
        vec![vec![0.05, 0.95], vec![0.95, 0.05]],
    ])
}

fn vanishing_overlap() -> Arc<Array3<f64>> {
    overlap(vec![
        vec![vec![0.9, 0.1], vec![0.1, 0.9]],
        vec![vec![0.01, 0.0], vec![0.0, 0.01]],
    ])
}

fn random_overlap(rng: &mut StdRng, steps: usize, n_b: usize) -> Arc<Array3<f64>> {
    let data = (0..steps * n_b * n_b).map(|_| rng.gen::<f64>()).collect();
    Arc::new(Array3::from_vec([steps, n_b, n_b], data).unwrap())
}

fn rows(array: &Array2<usize>) -> Vec<Vec<usize>> {
    array.to_rows()
}

#[test]
fn default_threshold_follows_band_count() {
    assert!((Disentangle::default_threshold(2) - 4f64.powf(-0.25)).abs() < 1e-15);
    assert!((Disentangle::default_threshold(8) - 0.5).abs() < 1e-15);
    let engine = Disentangle::new(crossing_overlap()).unwrap();
    assert!((engine.threshold() - Disentangle::default_threshold(2)).abs() < 1e-15);
    assert_eq!(engine.routine(), MatchRoutine::Optimal);
    assert_eq!(engine.num_k(), 3);
}

#[test]
fn crossing_with_zero_threshold_never_grows() {
    for routine in [MatchRoutine::Greedy, MatchRoutine::Optimal] {
        let engine = Disentangle::new(crossing_overlap())
            .unwrap()
            .with_routine(routine)
            .with_threshold(0.0)
            .unwrap();
        let matrix = engine.disentangle_matrix().unwrap();
        assert_eq!(rows(&matrix.index), vec![vec![0, 1], vec![0, 1], vec![1, 0]]);
        assert!(matrix.keep.as_slice().iter().all(|&k| k));
        assert_eq!(
            rows(&matrix.working_index),
            vec![vec![0, 1], vec![0, 1], vec![0, 1]]
        );
        assert_eq!(matrix.working_slots(), 2);
        assert_eq!(matrix.retired_tracks(), 0);
    }
}

#[test]
fn vanishing_tracks_are_retired_into_new_slots() {
    let engine = Disentangle::new(vanishing_overlap()).unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    assert_eq!(matrix.keep.row(1), &[true, true]);
    assert_eq!(matrix.keep.row(2), &[false, false]);
    assert_eq!(
        rows(&matrix.working_index),
        vec![vec![0, 1], vec![0, 1], vec![2, 3]]
    );
    assert_eq!(matrix.working_slots(), 4);
    assert_eq!(matrix.retired_tracks(), 2);
}

#[test]
fn identity_holds_at_the_origin() {
    let mut rng = StdRng::seed_from_u64(11);
    let engine = Disentangle::new(random_overlap(&mut rng, 6, 5)).unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    assert_eq!(matrix.index.row(0), &[0, 1, 2, 3, 4]);
    assert!(matrix.keep.row(0).iter().all(|&k| k));
    assert_eq!(matrix.working_index.row(0), &[0, 1, 2, 3, 4]);
}

#[test]
fn every_index_row_is_a_permutation() {
    let mut rng = StdRng::seed_from_u64(5);
    for routine in [MatchRoutine::Greedy, MatchRoutine::Optimal] {
        let engine = Disentangle::new(random_overlap(&mut rng, 12, 6))
            .unwrap()
            .with_routine(routine);
        let matrix = engine.disentangle_matrix().unwrap();
        for k in 0..matrix.num_k() {
            let mut row = matrix.index.row(k).to_vec();
            row.sort_unstable();
            assert_eq!(row, (0..6).collect::<Vec<_>>(), "row {k} is not a permutation");
        }
    }
}

#[test]
fn working_slots_never_shrink_along_the_path() {
    let mut rng = StdRng::seed_from_u64(19);
    let engine = Disentangle::new(random_overlap(&mut rng, 20, 4)).unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    let mut previous = 0;
    for k in 0..matrix.num_k() {
        let row_max = *matrix.working_index.row(k).iter().max().unwrap();
        assert!(row_max >= previous);
        previous = row_max;
        let mut row = matrix.working_index.row(k).to_vec();
        row.sort_unstable();
        row.dedup();
        assert_eq!(row.len(), 4, "slots within one k-point must be distinct");
    }
}

#[test]
fn raising_threshold_only_clears_keep_flags() {
    let mut rng = StdRng::seed_from_u64(23);
    let tensor = random_overlap(&mut rng, 10, 5);
    let loose = Disentangle::new(Arc::clone(&tensor))
        .unwrap()
        .with_threshold(0.2)
        .unwrap();
    let strict = Disentangle::new(tensor).unwrap().with_threshold(0.7).unwrap();
    let loose = loose.disentangle_matrix().unwrap();
    let strict = strict.disentangle_matrix().unwrap();
    // the ordering does not depend on the threshold, only the keep mask does
    assert_eq!(loose.index, strict.index);
    for (s, l) in strict.keep.as_slice().iter().zip(loose.keep.as_slice()) {
        assert!(!s || *l);
    }
}

#[test]
fn tracks_follow_resolved_order_transitively() {
    let engine = Disentangle::new(overlap(vec![
        vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ],
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
        ],
    ]))
    .unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    assert_eq!(matrix.index.row(1), &[1, 0, 2]);
    assert_eq!(matrix.index.row(2), &[2, 0, 1]);
}

#[test]
fn apply_reproduces_kept_values() {
    let mut rng = StdRng::seed_from_u64(29);
    let engine = Disentangle::new(random_overlap(&mut rng, 7, 4)).unwrap();
    let energy_rows: Vec<Vec<f64>> = (0..8)
        .map(|k| (0..4).map(|b| (10 * k + b) as f64).collect())
        .collect();
    let energy = Array2::from_rows(energy_rows).unwrap();
    let sorted = engine.apply_2d(&energy).unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    assert_eq!(sorted.cols(), matrix.working_slots());
    for k in 0..8 {
        for b in 0..4 {
            let slot = *matrix.working_index.get(k, b);
            let raw = *energy.get(k, *matrix.index.get(k, b));
            assert_eq!(*sorted.get(k, slot), raw);
        }
        let filled = sorted.row(k).iter().filter(|v| !v.is_nan()).count();
        assert_eq!(filled, 4);
    }
}

#[test]
fn apply_pads_retired_slots_with_nan() {
    let engine = Disentangle::new(vanishing_overlap()).unwrap();
    let energy = Array2::from_rows(vec![vec![1.0, 2.0], vec![1.5, 2.5], vec![1.8, 2.8]]).unwrap();
    let sorted = engine.apply_2d(&energy).unwrap();
    assert_eq!(sorted.shape(), (3, 4));
    assert_eq!(&sorted.row(0)[..2], &[1.0, 2.0]);
    assert!(sorted.row(0)[2].is_nan() && sorted.row(0)[3].is_nan());
    assert!(sorted.row(2)[0].is_nan() && sorted.row(2)[1].is_nan());
    assert_eq!(&sorted.row(2)[2..], &[1.8, 2.8]);
}

#[test]
fn apply_moves_trailing_channels_together() {
    let engine = Disentangle::new(crossing_overlap())
        .unwrap()
        .with_threshold(0.0)
        .unwrap();
    let mut data = Array3::from_elem([3, 2, 2], 0.0);
    for k in 0..3 {
        for b in 0..2 {
            data.lane_mut(k, b).copy_from_slice(&[b as f64, 10.0 + b as f64]);
        }
    }
    let sorted = engine.apply(&data).unwrap();
    assert_eq!(sorted.lane(2, 0), &[1.0, 11.0]);
    assert_eq!(sorted.lane(2, 1), &[0.0, 10.0]);
}

#[test]
fn apply_rejects_mismatched_leading_axes() {
    let engine = Disentangle::new(crossing_overlap()).unwrap();
    let err = engine.apply_2d(&Array2::from_elem(2, 2, 0.0)).unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));
    let err = engine.apply(&Array3::from_elem([3, 3, 1], 0.0)).unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));
}

#[test]
fn non_square_overlap_is_rejected() {
    let err = Disentangle::new(Arc::new(Array3::from_elem([2, 2, 3], 0.5))).unwrap_err();
    assert!(matches!(err, ResultsError::Shape(_)));
}

#[test]
fn negative_threshold_is_rejected() {
    let err = Disentangle::new(crossing_overlap())
        .unwrap()
        .with_threshold(-0.1)
        .unwrap_err();
    assert!(matches!(err, ResultsError::Configuration(_)));
}

#[test]
fn switching_routine_invalidates_cache() {
    let mut engine = Disentangle::new(crossing_overlap()).unwrap();
    assert!(!engine.is_computed());
    let first = engine.disentangle_matrix().unwrap();
    assert!(engine.is_computed());
    let again = engine.disentangle_matrix().unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    engine.set_routine(MatchRoutine::Greedy);
    assert!(!engine.is_computed());
    let recomputed = engine.disentangle_matrix().unwrap();
    assert!(!Arc::ptr_eq(&first, &recomputed));
    assert_eq!(first.index, recomputed.index);

    engine.invalidate();
    assert!(!engine.is_computed());
}

#[test]
fn single_k_point_is_a_trivial_ordering() {
    let engine = Disentangle::new(Arc::new(Array3::from_elem([0, 3, 3], 0.0))).unwrap();
    let matrix = engine.disentangle_matrix().unwrap();
    assert_eq!(matrix.num_k(), 1);
    assert_eq!(matrix.index.row(0), &[0, 1, 2]);
    assert_eq!(matrix.working_slots(), 3);
}

#[test]
fn metrics_record_every_step() {
    let path = std::env::temp_dir().join(format!(
        "bandweave-metrics-{}-{}.jsonl",
        std::process::id(),
        line!()
    ));
    let recorder = Arc::new(MetricsRecorder::new(&path, MetricsFormat::JsonLines).unwrap());
    let engine = Disentangle::new(vanishing_overlap())
        .unwrap()
        .with_metrics(recorder);
    engine.disentangle_matrix().unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    let events: Vec<serde_json::Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["event"], "disentangle_start");
    assert_eq!(events[0]["routine"], "optimal");
    assert_eq!(events[2]["event"], "step_matched");
    assert_eq!(events[2]["broken"], 2);
    assert_eq!(events[3]["event"], "disentangle_done");
    assert_eq!(events[3]["working_slots"], 4);
}
