//! Gridded data with named coordinates, the form that variable derivations
//! and dataset fixes work on.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis};

use crate::error::{DiagError, DiagResult};

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Coordinate points, optionally with cell bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Coord {
    pub standard_name: String,
    pub var_name: String,
    pub points: ArrayD<f64>,
    /// Shape of `points` plus a trailing vertex axis.
    pub bounds: Option<ArrayD<f64>>,
}

impl Coord {
    pub fn new(
        standard_name: impl Into<String>,
        var_name: impl Into<String>,
        points: ArrayD<f64>,
    ) -> Self {
        Self {
            standard_name: standard_name.into(),
            var_name: var_name.into(),
            points,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: ArrayD<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Matches either the standard name or the variable name.
    pub fn is_named(&self, name: &str) -> bool {
        self.standard_name == name || self.var_name == name
    }
}

/// A coordinate and the data dimensions it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeCoord {
    pub coord: Coord,
    pub dims: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Cube
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    pub var_name: String,
    pub standard_name: Option<String>,
    pub long_name: Option<String>,
    pub units: String,
    pub data: ArrayD<f64>,
    pub coords: Vec<CubeCoord>,
    pub attributes: BTreeMap<String, String>,
}

impl Cube {
    pub fn new(var_name: impl Into<String>, units: impl Into<String>, data: ArrayD<f64>) -> Self {
        Self {
            var_name: var_name.into(),
            standard_name: None,
            long_name: None,
            units: units.into(),
            data,
            coords: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_standard_name(mut self, standard_name: impl Into<String>) -> Self {
        self.standard_name = Some(standard_name.into());
        self
    }

    /// Attach `coord` spanning `dims`; its points must have the shape of
    /// those data dimensions.
    pub fn add_coord(&mut self, coord: Coord, dims: Vec<usize>) -> DiagResult<()> {
        if dims.iter().any(|&d| d >= self.data.ndim()) {
            return Err(DiagError::InvalidCoordinate {
                coord: coord.standard_name,
                reason: format!("dimensions {dims:?} exceed a {}-d cube", self.data.ndim()),
            });
        }
        let expected: Vec<usize> = dims.iter().map(|&d| self.data.len_of(Axis(d))).collect();
        if coord.points.shape() != expected.as_slice() {
            return Err(DiagError::ShapeMismatch {
                left: coord.points.shape().to_vec(),
                right: expected,
            });
        }
        self.coords.push(CubeCoord { coord, dims });
        Ok(())
    }

    pub fn with_coord(mut self, coord: Coord, dims: Vec<usize>) -> DiagResult<Self> {
        self.add_coord(coord, dims)?;
        Ok(self)
    }

    pub fn coord(&self, name: &str) -> DiagResult<&CubeCoord> {
        self.coords
            .iter()
            .find(|c| c.coord.is_named(name))
            .ok_or_else(|| self.missing(name))
    }

    pub fn coord_mut(&mut self, name: &str) -> DiagResult<&mut CubeCoord> {
        let missing = self.missing(name);
        self.coords
            .iter_mut()
            .find(|c| c.coord.is_named(name))
            .ok_or(missing)
    }

    pub fn remove_coord(&mut self, name: &str) -> DiagResult<CubeCoord> {
        let idx = self
            .coords
            .iter()
            .position(|c| c.coord.is_named(name))
            .ok_or_else(|| self.missing(name))?;
        Ok(self.coords.remove(idx))
    }

    fn missing(&self, name: &str) -> DiagError {
        DiagError::MissingCoordinate {
            cube: self.var_name.clone(),
            coord: name.to_string(),
        }
    }

    /// Keep the points of dimension coordinate `name` that satisfy `keep` and
    /// sum the data over that dimension. The dimension and every coordinate
    /// spanning it are dropped.
    pub fn sum_where<F>(&self, name: &str, keep: F) -> DiagResult<Cube>
    where
        F: Fn(f64) -> bool,
    {
        let found = self.coord(name)?;
        let axis = match found.dims.as_slice() {
            [axis] if found.coord.points.ndim() == 1 => *axis,
            _ => {
                return Err(DiagError::InvalidCoordinate {
                    coord: name.to_string(),
                    reason: "not a dimension coordinate".to_string(),
                })
            }
        };
        let selected: Vec<usize> = found
            .coord
            .points
            .iter()
            .enumerate()
            .filter(|(_, &p)| keep(p))
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(DiagError::InvalidCoordinate {
                coord: name.to_string(),
                reason: "no points in the requested range".to_string(),
            });
        }

        let data = self
            .data
            .select(Axis(axis), &selected)
            .sum_axis(Axis(axis));
        let coords = self
            .coords
            .iter()
            .filter(|c| !c.dims.contains(&axis))
            .map(|c| CubeCoord {
                coord: c.coord.clone(),
                dims: c
                    .dims
                    .iter()
                    .map(|&d| if d > axis { d - 1 } else { d })
                    .collect(),
            })
            .collect();

        Ok(Cube {
            var_name: self.var_name.clone(),
            standard_name: self.standard_name.clone(),
            long_name: self.long_name.clone(),
            units: self.units.clone(),
            data,
            coords,
            attributes: self.attributes.clone(),
        })
    }

    /// Multiply every value by `factor`.
    pub fn scaled(mut self, factor: f64) -> Cube {
        self.data.mapv_inplace(|v| v * factor);
        self
    }
}
