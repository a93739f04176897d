//! Per-dataset corrections applied while loading model output.
//!
//! A [`Fix`] can rewrite the file before it is read, the cube metadata and
//! the data. [`get_fixes`] returns the fixes for one project, dataset and
//! variable; the hooks are applied in that order.

use std::path::{Path, PathBuf};

use log::debug;
use ndarray::{s, ArrayD, ArrayView2, ArrayView3, Ix2, Ix3};

use crate::cube::{Coord, Cube};
use crate::error::{DiagError, DiagResult};

pub trait Fix {
    /// Return the path to load, writing a corrected copy to `output_dir` if
    /// needed.
    fn fix_file(&self, path: &Path, _output_dir: &Path) -> DiagResult<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn fix_metadata(&self, cube: Cube) -> DiagResult<Cube> {
        Ok(cube)
    }

    fn fix_data(&self, cube: Cube) -> DiagResult<Cube> {
        Ok(cube)
    }
}

/// Fixes for `short_name` of `dataset` in `project`, common ones first.
pub fn get_fixes(project: &str, dataset: &str, short_name: &str) -> Vec<Box<dyn Fix>> {
    let mut fixes: Vec<Box<dyn Fix>> = Vec::new();
    match (project, dataset) {
        ("CMIP5", "GFDL-CM2p1") => {
            if short_name == "sftof" {
                fixes.push(Box::new(GfdlCm2p1Sftof));
            }
        }
        ("PRIMAVERA", "EC-Earth3-HR") => {
            fixes.push(Box::new(EcEarth3HrAllVars));
            match short_name {
                "tas" => fixes.push(Box::new(EcEarth3HrCurvilinear { lat_dim: 1, realm: true })),
                "zg" => fixes.push(Box::new(EcEarth3HrCurvilinear { lat_dim: 2, realm: false })),
                _ => {}
            }
        }
        _ => {}
    }
    debug!("{} fixes for {project}/{dataset}/{short_name}", fixes.len());
    fixes
}

pub fn fix_file(path: &Path, output_dir: &Path, fixes: &[Box<dyn Fix>]) -> DiagResult<PathBuf> {
    fixes
        .iter()
        .try_fold(path.to_path_buf(), |path, fix| fix.fix_file(&path, output_dir))
}

pub fn fix_metadata(cube: Cube, fixes: &[Box<dyn Fix>]) -> DiagResult<Cube> {
    fixes.iter().try_fold(cube, |cube, fix| fix.fix_metadata(cube))
}

pub fn fix_data(cube: Cube, fixes: &[Box<dyn Fix>]) -> DiagResult<Cube> {
    fixes.iter().try_fold(cube, |cube, fix| fix.fix_data(cube))
}

// ---------------------------------------------------------------------------
// CMIP5 GFDL-CM2p1
// ---------------------------------------------------------------------------

/// `sftof` is declared in percent but stored as a fraction.
#[derive(Debug, Clone, Copy)]
pub struct GfdlCm2p1Sftof;

impl Fix for GfdlCm2p1Sftof {
    fn fix_data(&self, cube: Cube) -> DiagResult<Cube> {
        Ok(cube.scaled(100.0))
    }
}

// ---------------------------------------------------------------------------
// PRIMAVERA EC-Earth3-HR
// ---------------------------------------------------------------------------

/// Names the horizontal coordinates `lat` and `lon`.
#[derive(Debug, Clone, Copy)]
pub struct EcEarth3HrAllVars;

impl Fix for EcEarth3HrAllVars {
    fn fix_metadata(&self, mut cube: Cube) -> DiagResult<Cube> {
        cube.coord_mut("latitude")?.coord.var_name = "lat".to_string();
        cube.coord_mut("longitude")?.coord.var_name = "lon".to_string();
        Ok(cube)
    }
}

/// Replaces the 2-D latitude/longitude of a regular grid with 1-D
/// coordinates on `lat_dim` and the dimension after it.
#[derive(Debug, Clone, Copy)]
pub struct EcEarth3HrCurvilinear {
    pub lat_dim: usize,
    /// Also set the `realm` attribute to `atmos`.
    pub realm: bool,
}

impl Fix for EcEarth3HrCurvilinear {
    fn fix_metadata(&self, mut cube: Cube) -> DiagResult<Cube> {
        if self.realm {
            cube.attributes
                .insert("realm".to_string(), "atmos".to_string());
        }

        let lat = cube.remove_coord("latitude")?.coord;
        let lat_points = as_2d(&lat, &lat.points)?.column(0).to_owned().into_dyn();
        let mut lat_1d = Coord::new(lat.standard_name.clone(), lat.var_name.clone(), lat_points);
        if let Some(bounds) = &lat.bounds {
            lat_1d = lat_1d.with_bounds(as_3d(&lat, bounds)?.slice(s![.., 0, 1..3]).to_owned().into_dyn());
        }

        let lon = cube.remove_coord("longitude")?.coord;
        let lon_points = as_2d(&lon, &lon.points)?.row(0).to_owned().into_dyn();
        let mut lon_1d = Coord::new(lon.standard_name.clone(), lon.var_name.clone(), lon_points);
        if let Some(bounds) = &lon.bounds {
            lon_1d = lon_1d.with_bounds(as_3d(&lon, bounds)?.slice(s![0, .., 0..2]).to_owned().into_dyn());
        }

        cube.add_coord(lat_1d, vec![self.lat_dim])?;
        cube.add_coord(lon_1d, vec![self.lat_dim + 1])?;
        Ok(cube)
    }
}

fn as_2d<'a>(coord: &Coord, values: &'a ArrayD<f64>) -> DiagResult<ArrayView2<'a, f64>> {
    values
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| DiagError::InvalidCoordinate {
            coord: coord.standard_name.clone(),
            reason: format!("expected 2-d points, found shape {:?}", values.shape()),
        })
}

fn as_3d<'a>(coord: &Coord, values: &'a ArrayD<f64>) -> DiagResult<ArrayView3<'a, f64>> {
    values
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| DiagError::InvalidCoordinate {
            coord: coord.standard_name.clone(),
            reason: format!("expected 3-d bounds, found shape {:?}", values.shape()),
        })
}
