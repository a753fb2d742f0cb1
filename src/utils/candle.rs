// src/utils/candle.rs
use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| match Device::new_metal(0) {
    Ok(device) if device.is_metal() => {
        log::info!("Using Candle Metal device for embedding similarity.");
        device
    }
    Ok(_) => Device::Cpu,
    Err(err) => {
        log::debug!("Candle Metal device unavailable ({:?}); using CPU.", err);
        Device::Cpu
    }
});

fn sum_of_products(a: &Tensor, b: &Tensor, what: &str) -> Result<f64> {
    let product = (a * b).with_context(|| format!("Element-wise multiplication for {} failed", what))?;
    let total = product
        .sum_all()
        .with_context(|| format!("Summing tensor for {} failed", what))?
        .to_scalar::<f32>()
        .with_context(|| format!("Converting {} tensor to scalar failed", what))?;
    Ok(total as f64)
}

/// Cosine similarity of two equal-length vectors. Zero-magnitude vectors and
/// non-finite results yield 0.0 rather than an error.
pub fn cosine_similarity_candle(v1_slice: &[f32], v2_slice: &[f32]) -> Result<f64> {
    if v1_slice.len() != v2_slice.len() {
        return Err(anyhow!(
            "Input vector lengths differ: {} vs {}",
            v1_slice.len(),
            v2_slice.len()
        ));
    }
    if v1_slice.is_empty() {
        return Err(anyhow!("Input vectors must not be empty"));
    }

    let v1 = Tensor::from_slice(v1_slice, (v1_slice.len(),), &CANDLE_DEVICE)
        .context("Failed to create tensor v1")?;
    let v2 = Tensor::from_slice(v2_slice, (v2_slice.len(),), &CANDLE_DEVICE)
        .context("Failed to create tensor v2")?;

    let dot = sum_of_products(&v1, &v2, "dot product")?;
    let mag1 = sum_of_products(&v1, &v1, "v1 magnitude")?.sqrt();
    let mag2 = sum_of_products(&v2, &v2, "v2 magnitude")?.sqrt();

    if mag1 == 0.0 || mag2 == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (mag1 * mag2);
    if !similarity.is_finite() {
        log::warn!(
            "Cosine similarity is not finite (dot: {}, mag1: {}, mag2: {})",
            dot, mag1, mag2
        );
        return Ok(0.0);
    }
    Ok(similarity)
}
