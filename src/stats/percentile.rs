use std::path::Path;

use log::{debug, info};

use super::field::{MaskedField, MaskedMap};
use crate::error::{DiagError, DiagResult};

/// Percentiles from `start` to `stop` (inclusive) in `step` increments.
///
/// The upper bound is padded by a tenth of a step so `stop` survives
/// floating-point accumulation.
pub fn percentile_steps(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop < start {
        return Vec::new();
    }
    let end = stop + 0.1 * step;
    let n = ((end - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Pearson correlation over pixels valid in both maps.
///
/// `None` when fewer than two pixels overlap or either map is constant there.
pub fn spatial_correlation(a: &MaskedMap, b: &MaskedMap) -> DiagResult<Option<f64>> {
    if a.shape() != b.shape() {
        return Err(DiagError::ShapeMismatch {
            left: a.data.shape().to_vec(),
            right: b.data.shape().to_vec(),
        });
    }
    let pairs: Vec<(f64, f64)> = a
        .data
        .iter()
        .zip(b.data.iter())
        .zip(a.mask.iter().zip(b.mask.iter()))
        .filter(|(_, (&ma, &mb))| !ma && !mb)
        .map(|((&x, &y), _)| (x, y))
        .collect();
    if pairs.len() < 2 {
        return Ok(None);
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in &pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Ok(None);
    }
    Ok(Some(sxy / (sxx * syy).sqrt()))
}

/// Percentile maps of a model and a reference and how well they agree.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileComparison {
    pub percentile: f64,
    pub model: MaskedMap,
    pub reference: MaskedMap,
    pub correlation: Option<f64>,
}

/// For each percentile, compute the per-pixel percentile map of both fields
/// and their spatial correlation.
pub fn percentile_comparison(
    model: &MaskedField,
    reference: &MaskedField,
    percentiles: &[f64],
) -> DiagResult<Vec<PercentileComparison>> {
    info!(
        "Percentile analysis of {} against {} ({} percentiles)",
        model.name,
        reference.name,
        percentiles.len()
    );
    percentiles
        .iter()
        .map(|&p| -> DiagResult<PercentileComparison> {
            let model_map = model.percentile(p);
            let reference_map = reference.percentile(p);
            let correlation = spatial_correlation(&model_map, &reference_map)?;
            debug!("percentile {p}: r = {correlation:?}");
            Ok(PercentileComparison {
                percentile: p,
                model: model_map,
                reference: reference_map,
                correlation,
            })
        })
        .collect()
}

/// Write `percentile,correlation` rows, replacing any existing file.
/// Undefined correlations are written as empty cells.
pub fn write_percentile_correlations(
    path: &Path,
    results: &[PercentileComparison],
) -> DiagResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["percentile", "correlation"])?;
    for result in results {
        let r = result
            .correlation
            .map(|r| r.to_string())
            .unwrap_or_default();
        writer.write_record([result.percentile.to_string(), r])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn steps_include_the_stop_value() {
        let steps = percentile_steps(0.0, 1.0, 0.05);
        assert_eq!(steps.len(), 21);
        assert!((steps[20] - 1.0).abs() < 1e-9);
        assert_eq!(percentile_steps(0.1, 0.3, 0.1).len(), 3);
        assert!(percentile_steps(0.0, 1.0, 0.0).is_empty());
    }

    #[test]
    fn correlation_of_linear_maps() {
        let a = MaskedMap::from_data(array![[1.0, 2.0], [3.0, 4.0]]);
        let b = MaskedMap::from_data(array![[2.0, 4.0], [6.0, f64::NAN]]);
        let c = MaskedMap::from_data(array![[4.0, 3.0], [2.0, 1.0]]);

        let r = spatial_correlation(&a, &b).unwrap().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = spatial_correlation(&a, &c).unwrap().unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_undefined_for_constant_or_tiny_overlap() {
        let a = MaskedMap::from_data(array![[1.0, 2.0]]);
        let flat = MaskedMap::from_data(array![[5.0, 5.0]]);
        let sparse = MaskedMap::from_data(array![[1.0, f64::NAN]]);
        assert_eq!(spatial_correlation(&a, &flat).unwrap(), None);
        assert_eq!(spatial_correlation(&a, &sparse).unwrap(), None);
    }

    #[test]
    fn comparison_writes_csv() {
        let data = Array3::from_shape_vec((2, 1, 3), vec![1.0, 2.0, 3.0, 2.0, 4.0, 6.0]).unwrap();
        let model = MaskedField::from_data("model", data.clone(), vec![2000, 2001]).unwrap();
        let reference = MaskedField::from_data("obs", data * 10.0, vec![2000, 2001]).unwrap();

        let results = percentile_comparison(&model, &reference, &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| (r.correlation.unwrap() - 1.0).abs() < 1e-12));
        assert_eq!(results[1].model.data, array![[1.5, 3.0, 4.5]]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sst_percentile_correlation.csv");
        write_percentile_correlations(&path, &results).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "percentile,correlation");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("0.5,"));
    }
}
