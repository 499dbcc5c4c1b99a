//! Juvenile/adult classification
//!
//! Two-cluster k-means (k-means++ initialisation, 12 restarts, lowest inertia
//! kept) over standardized shape descriptors. Cluster ids coming out of
//! k-means carry no meaning; [`order_labels_by_size`] renumbers them so that
//! label 0 is the smaller-bodied (juvenile) group.
//!
//! References:
//! - Arthur & Vassilvitskii (2007): k-means++ seeding

use crate::{Error, Result};
use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::{KMeans, KMeansInit};
use ndarray::Array2;

/// Number of groups (juveniles, adults)
pub const CLUSTER_COUNT: usize = 2;

/// Independent k-means restarts; the lowest-inertia run wins
pub const KMEANS_RESTARTS: usize = 12;

/// Features per particle: `[area, standardized Feret, circularity, roundness]`
pub const FEATURE_COUNT: usize = 4;

const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;

/// Cluster particles into two groups
///
/// Returns one label in `{0, 1}` per input row, in input order. The seed is
/// fixed, so the same matrix always yields the same labels.
///
/// # Errors
/// - `Error::InvalidInput` if a row does not have 4 features or there are fewer than 2 rows
/// - `Error::Clustering` if k-means fails to fit
///
/// # Example
///
/// ```rust
/// use collembola_size::classify::classify;
///
/// let rows = vec![
///     [-1.0, -1.0, 0.5, 0.5],
///     [-1.1, -0.9, 0.4, 0.6],
///     [1.0, 1.0, -0.5, -0.5],
///     [1.1, 0.9, -0.4, -0.6],
/// ];
/// let labels = classify(&rows).unwrap();
/// assert_eq!(labels[0], labels[1]);
/// assert_ne!(labels[0], labels[2]);
/// ```
pub fn classify(features: &[[f64; FEATURE_COUNT]]) -> Result<Vec<u8>> {
    if features.len() < CLUSTER_COUNT {
        return Err(Error::InvalidInput(format!(
            "k-means needs at least {CLUSTER_COUNT} particles, got {}",
            features.len()
        )));
    }

    let flat: Vec<f64> = features.iter().flatten().copied().collect();
    let records = Array2::from_shape_vec((features.len(), FEATURE_COUNT), flat)
        .map_err(|e| Error::InvalidInput(format!("bad feature matrix: {e}")))?;

    let dataset = DatasetBase::from(records.clone());
    let model = KMeans::params(CLUSTER_COUNT)
        .n_runs(KMEANS_RESTARTS)
        .init_method(KMeansInit::KMeansPlusPlus)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| Error::Clustering(e.to_string()))?;

    let assignments = model.predict(&records);
    assignments
        .iter()
        .map(|&cluster| {
            u8::try_from(cluster)
                .map_err(|_| Error::Clustering(format!("unexpected cluster id {cluster}")))
        })
        .collect()
}

/// Renumber labels so that 0 is the cluster with the smaller mean Feret diameter
///
/// Labels and sizes are matched by position. Labels other than 0/1 are left
/// untouched. If either cluster is empty the labels are returned unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn order_labels_by_size(labels: &[u8], feret: &[f64]) -> Vec<u8> {
    let mut sums = [0.0f64; CLUSTER_COUNT];
    let mut counts = [0usize; CLUSTER_COUNT];
    for (&label, &size) in labels.iter().zip(feret) {
        if let Some(slot) = sums.get_mut(label as usize) {
            *slot += size;
            counts[label as usize] += 1;
        }
    }

    if counts.contains(&0) {
        return labels.to_vec();
    }

    let mean0 = sums[0] / counts[0] as f64;
    let mean1 = sums[1] / counts[1] as f64;
    if mean0 <= mean1 {
        labels.to_vec()
    } else {
        labels
            .iter()
            .map(|&label| match label {
                0 => 1,
                1 => 0,
                other => other,
            })
            .collect()
    }
}
