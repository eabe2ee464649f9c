use crate::common::*;

/// Contrastive divergence surrogate `mean(D(syn)) - mean(D(obs))`.
///
/// Minimizing it pushes the descriptor to score observed images above the
/// synthesized ones.
pub fn descriptor_loss(syn_stats: &Tensor, obs_stats: &Tensor) -> Tensor {
    syn_stats.mean(Kind::Float) - obs_stats.mean(Kind::Float)
}

/// Squared reconstruction error scaled by `1 / (2 sigma^2)`, summed over
/// pixels and averaged over the batch.
pub fn reconstruction_loss(target: &Tensor, reconstruction: &Tensor, sigma: f64) -> Fallible<Tensor> {
    ensure!(
        target.size() == reconstruction.size(),
        "reconstruction of shape {:?} does not match target of shape {:?}",
        reconstruction.size(),
        target.size()
    );
    let batch_size = target.size()[0];
    ensure!(batch_size > 0, "empty batch");

    let diff = target - reconstruction;
    let loss = (&diff * &diff).sum(Kind::Float) / (2.0 * sigma * sigma * batch_size as f64);
    Ok(loss)
}
