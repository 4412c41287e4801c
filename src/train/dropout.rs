use std::collections::BTreeSet;

use rand::RngCore;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::network::network::Network;

/// Picks `drop_count` distinct neuron indices in `[0, pool_size)`.
///
/// Indices are drawn uniformly from `rng`, rejecting repeats. A negative
/// `drop_count` counts by its absolute value; it is capped at `pool_size`.
/// A non-positive pool gives an empty selection.
pub fn select_dropouts<R: RngCore + ?Sized>(rng: &mut R, drop_count: i64, pool_size: i64) -> BTreeSet<usize> {
    let mut picked = BTreeSet::new();
    if pool_size <= 0 {
        return picked;
    }
    let wanted = drop_count.unsigned_abs().min(pool_size as u64) as usize;
    let pool = pool_size as u64;
    while picked.len() < wanted {
        picked.insert((rng.next_u64() % pool) as usize);
    }
    picked
}

/// Number of neurons dropped from a layer of `size`; at least one always survives.
pub(crate) fn drop_count(ratio: f64, size: usize) -> usize {
    ((ratio * size as f64).round() as usize).min(size.saturating_sub(1))
}

/// Column multiplier zeroing `dropped` and scaling survivors by
/// `size / (size - dropped)` so the expected activation is unchanged.
pub(crate) fn dropout_mask(dropped: &BTreeSet<usize>, size: usize) -> Result<Matrix> {
    let keep_scale = size as f64 / (size - dropped.len()) as f64;
    let mask = Matrix::zeros(size, 1)?;
    Ok(mask.map_indexed(|i, _| if dropped.contains(&i) { 0.0 } else { keep_scale }))
}

/// Fresh masks for every hidden layer; the output layer is never masked.
pub(crate) fn select_masks<R: RngCore + ?Sized>(
    rng: &mut R,
    network: &Network,
    ratio: f64,
) -> Result<Vec<Option<Matrix>>> {
    let layers = network.layers();
    let hidden = layers.len().saturating_sub(1);
    let mut masks = Vec::with_capacity(layers.len());
    for layer in &layers[..hidden] {
        let size = layer.out_size();
        let count = drop_count(ratio, size);
        if count == 0 {
            masks.push(None);
            continue;
        }
        let dropped = select_dropouts(rng, count as i64, size as i64);
        masks.push(Some(dropout_mask(&dropped, size)?));
    }
    masks.push(None);
    Ok(masks)
}
