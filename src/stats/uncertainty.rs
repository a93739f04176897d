use std::collections::BTreeMap;

use log::debug;
use ndarray::Zip;

use super::field::MaskedField;
use crate::error::{DiagError, DiagResult};

/// Model-minus-reference differences shifted by ± `std_factor` model
/// standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyBand {
    pub std_factor: f64,
    /// `model - k*std(model) - mean(reference)`
    pub low: MaskedField,
    /// `model - mean(reference)`
    pub mid: MaskedField,
    /// `model + k*std(model) - mean(reference)`
    pub high: MaskedField,
}

impl UncertaintyBand {
    pub fn members(&self) -> [&MaskedField; 3] {
        [&self.low, &self.mid, &self.high]
    }
}

/// Compare a model against the temporal mean of a reference within the
/// model's own spread.
///
/// Only the middle year of the reference (`years[len / 2]`) is evaluated; the
/// result is keyed by that year. A pixel is masked where the model step, the
/// model standard deviation or the reference mean is masked.
pub fn year_uncertainty(
    model: &MaskedField,
    reference: &MaskedField,
    std_factor: f64,
) -> DiagResult<BTreeMap<String, UncertaintyBand>> {
    if model.grid_shape() != reference.grid_shape() {
        let (ml, mo) = model.grid_shape();
        let (rl, ro) = reference.grid_shape();
        return Err(DiagError::ShapeMismatch {
            left: vec![ml, mo],
            right: vec![rl, ro],
        });
    }
    if reference.n_times() == 0 {
        return Err(DiagError::EmptyField(reference.name.clone()));
    }
    if model.n_times() == 0 {
        return Err(DiagError::EmptyField(model.name.clone()));
    }

    let year = reference.years[reference.years.len() / 2];
    debug!("Evaluating uncertainty band for {year}");

    let model_std = model.temporal_std();
    let reference_mean = reference.temporal_mean();

    let mask = Zip::indexed(&model.mask).map_collect(|(_, i, j), &m| {
        m || model_std.mask[[i, j]] || reference_mean.mask[[i, j]]
    });
    let shifted = |k: f64| {
        Zip::indexed(&model.data).map_collect(|(_, i, j), &v| {
            v + k * model_std.data[[i, j]] - reference_mean.data[[i, j]]
        })
    };

    let field = |name: String, k: f64| MaskedField {
        name,
        data: shifted(k),
        mask: mask.clone(),
        years: model.years.clone(),
    };
    let band = UncertaintyBand {
        std_factor,
        low: field(format!("mean_m{std_factor}std_{year}"), -std_factor),
        mid: field(format!("mean_{year}"), 0.0),
        high: field(format!("mean_p{std_factor}std_{year}"), std_factor),
    };

    let mut result = BTreeMap::new();
    result.insert(year.to_string(), band);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn model() -> MaskedField {
        // 1x2 grid, two steps; pixel 1 is masked in the second step
        let data = Array3::from_shape_vec((2, 1, 2), vec![1.0, 5.0, 3.0, f64::NAN]).unwrap();
        MaskedField::from_data("model", data, vec![2001, 2002]).unwrap()
    }

    fn reference() -> MaskedField {
        let data = Array3::from_shape_vec((3, 1, 2), vec![1.0, f64::NAN, 2.0, f64::NAN, 3.0, f64::NAN])
            .unwrap();
        MaskedField::from_data("obs", data, vec![2000, 2001, 2002]).unwrap()
    }

    #[test]
    fn band_is_keyed_by_the_middle_reference_year() {
        let bands = year_uncertainty(&model(), &reference(), 2.0).unwrap();
        assert_eq!(bands.keys().collect::<Vec<_>>(), vec!["2001"]);
        let band = &bands["2001"];
        assert_eq!(band.low.name, "mean_m2std_2001");
        assert_eq!(band.high.name, "mean_p2std_2001");
    }

    #[test]
    fn band_arithmetic() {
        let bands = year_uncertainty(&model(), &reference(), 2.0).unwrap();
        let band = &bands["2001"];
        // pixel 0: model [1, 3], std 1, reference mean 2
        assert_eq!(band.mid.data[[0, 0, 0]], -1.0);
        assert_eq!(band.mid.data[[1, 0, 0]], 1.0);
        assert_eq!(band.low.data[[0, 0, 0]], -3.0);
        assert_eq!(band.high.data[[1, 0, 0]], 3.0);
        for member in band.members() {
            assert!(!member.mask[[0, 0, 0]]);
            assert!(!member.mask[[1, 0, 0]]);
        }
    }

    #[test]
    fn masks_combine_model_and_reference() {
        let bands = year_uncertainty(&model(), &reference(), 1.0).unwrap();
        let band = &bands["2001"];
        // pixel 1 has no reference data at all
        for member in band.members() {
            assert!(member.mask[[0, 0, 1]]);
            assert!(member.mask[[1, 0, 1]]);
        }
    }

    #[test]
    fn rejects_mismatched_or_empty_inputs() {
        let other_grid = MaskedField::from_data("obs", Array3::zeros((1, 2, 1)), vec![2000]).unwrap();
        assert!(matches!(
            year_uncertainty(&model(), &other_grid, 1.0),
            Err(DiagError::ShapeMismatch { .. })
        ));

        let empty = MaskedField::from_data("obs", Array3::zeros((0, 1, 2)), vec![]).unwrap();
        assert!(matches!(
            year_uncertainty(&model(), &empty, 1.0),
            Err(DiagError::EmptyField(name)) if name == "obs"
        ));
    }
}
