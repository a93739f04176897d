use ndarray::{Array2, Array3, Axis, Zip};

use crate::error::{DiagError, DiagResult};

// ---------------------------------------------------------------------------
// MaskedMap – one (lat, lon) slice with missing values
// ---------------------------------------------------------------------------

/// A `(lat, lon)` map. `mask` is `true` where the value is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedMap {
    pub data: Array2<f64>,
    pub mask: Array2<bool>,
}

impl MaskedMap {
    pub fn new(data: Array2<f64>, mask: Array2<bool>) -> DiagResult<Self> {
        if data.shape() != mask.shape() {
            return Err(DiagError::ShapeMismatch {
                left: data.shape().to_vec(),
                right: mask.shape().to_vec(),
            });
        }
        Ok(Self { data, mask })
    }

    /// Mask every non-finite value.
    pub fn from_data(data: Array2<f64>) -> Self {
        let mask = data.mapv(|v| !v.is_finite());
        Self { data, mask }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    fn check_grid(&self, other: &MaskedMap) -> DiagResult<()> {
        if self.shape() != other.shape() {
            return Err(DiagError::ShapeMismatch {
                left: self.data.shape().to_vec(),
                right: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Values where the pixel is not masked.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, &m)| !m)
            .map(|(&v, _)| v)
    }

    /// `self - other`, masked where either input is masked.
    pub fn difference(&self, other: &MaskedMap) -> DiagResult<MaskedMap> {
        self.check_grid(other)?;
        let data = &self.data - &other.data;
        let mask = Zip::from(&self.mask)
            .and(&other.mask)
            .map_collect(|&a, &b| a || b);
        Ok(MaskedMap { data, mask })
    }

    /// Unweighted mean over valid pixels, `None` if all are masked.
    pub fn global_mean(&self) -> Option<f64> {
        mean(self.valid_values())
    }

    /// Root-mean-square difference over pixels valid in both maps.
    pub fn rmsd(&self, other: &MaskedMap) -> DiagResult<Option<f64>> {
        let diff = self.difference(other)?;
        Ok(mean(diff.valid_values().map(|d| d * d)).map(f64::sqrt))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// ---------------------------------------------------------------------------
// MaskedField – a (time, lat, lon) stack of maps
// ---------------------------------------------------------------------------

/// Gridded data with one year per time step.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedField {
    pub name: String,
    pub data: Array3<f64>,
    pub mask: Array3<bool>,
    pub years: Vec<i32>,
}

impl MaskedField {
    pub fn new(
        name: impl Into<String>,
        data: Array3<f64>,
        mask: Array3<bool>,
        years: Vec<i32>,
    ) -> DiagResult<Self> {
        if data.shape() != mask.shape() {
            return Err(DiagError::ShapeMismatch {
                left: data.shape().to_vec(),
                right: mask.shape().to_vec(),
            });
        }
        if years.len() != data.len_of(Axis(0)) {
            return Err(DiagError::ShapeMismatch {
                left: vec![data.len_of(Axis(0))],
                right: vec![years.len()],
            });
        }
        Ok(Self {
            name: name.into(),
            data,
            mask,
            years,
        })
    }

    /// Mask every non-finite value.
    pub fn from_data(name: impl Into<String>, data: Array3<f64>, years: Vec<i32>) -> DiagResult<Self> {
        let mask = data.mapv(|v| !v.is_finite());
        Self::new(name, data, mask, years)
    }

    pub fn n_times(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// `(lat, lon)` of each time step.
    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, lat, lon) = self.data.dim();
        (lat, lon)
    }

    pub fn time_step(&self, t: usize) -> MaskedMap {
        MaskedMap {
            data: self.data.index_axis(Axis(0), t).to_owned(),
            mask: self.mask.index_axis(Axis(0), t).to_owned(),
        }
    }

    /// Reduce each pixel's valid time series to one value. Pixels where
    /// `reduce` returns `None` are masked.
    pub fn reduce_time<F>(&self, reduce: F) -> MaskedMap
    where
        F: Fn(&[f64]) -> Option<f64>,
    {
        let reduced = Zip::from(self.data.lanes(Axis(0)))
            .and(self.mask.lanes(Axis(0)))
            .map_collect(|values, mask| {
                let valid: Vec<f64> = values
                    .iter()
                    .zip(mask.iter())
                    .filter(|(_, &m)| !m)
                    .map(|(&v, _)| v)
                    .collect();
                reduce(&valid)
            });
        MaskedMap {
            data: reduced.mapv(|v| v.unwrap_or(f64::NAN)),
            mask: reduced.mapv(|v| v.is_none()),
        }
    }

    /// Mean over time; masked where every step is masked.
    pub fn temporal_mean(&self) -> MaskedMap {
        self.reduce_time(|values| mean(values.iter().copied()))
    }

    /// Population standard deviation over time.
    pub fn temporal_std(&self) -> MaskedMap {
        self.reduce_time(|values| {
            let m = mean(values.iter().copied())?;
            mean(values.iter().map(|v| (v - m) * (v - m))).map(f64::sqrt)
        })
    }

    /// Per-pixel percentile over time, `p` in `[0, 1]`, with linear
    /// interpolation between ranks.
    pub fn percentile(&self, p: f64) -> MaskedMap {
        self.reduce_time(|values| percentile_of(values, p))
    }
}

fn percentile_of(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}
