//! The `map.json` metadata format.
//!
//! Unknown fields are ignored; semantic checks beyond what serde enforces
//! (cell sizing, grid shape, fog pairing) run in [`MapFile::validate`], so a
//! bad file reports the offending field by name.

use crate::{map::Fog, math::ilog2_exact};
use anyhow::{bail, Context, Result};
use bevy::math::Vec3;
use serde::Deserialize;
use std::{fs, path::Path};

pub const MIN_CELL_SIZE: u32 = 64;
pub const MAX_CELL_SIZE: u32 = 4096;

/// The raw deserialized form of `map.json`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MapFile {
    pub name: String,
    pub h_scale: f32,
    pub v_scale: f32,
    #[serde(default)]
    pub base_elev: f32,
    pub min_elev: f32,
    pub max_elev: f32,
    pub min_sky: f32,
    pub max_sky: f32,
    pub width: u32,
    pub height: u32,
    pub cell_size: u32,
    #[serde(default)]
    pub color_map: bool,
    #[serde(default)]
    pub normal_map: bool,
    #[serde(default)]
    pub water_map: bool,
    pub sun_dir: Option<[f32; 3]>,
    pub sun_intensity: Option<[f32; 3]>,
    pub ambient: Option<[f32; 3]>,
    pub fog_color: Option<[f32; 3]>,
    pub fog_density: Option<f32>,
    /// Cell subdirectory names in row-major order, north row first.
    pub grid: Vec<String>,
}

/// Reads and validates a `map.json` file.
pub fn read_map_file(path: &Path) -> Result<MapFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading map file {}", path.display()))?;
    let map: MapFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing map file {}", path.display()))?;
    map.validate()
        .with_context(|| format!("invalid map file {}", path.display()))?;
    Ok(map)
}

impl MapFile {
    /// The cell grid shape as (rows, columns).
    pub fn grid_dims(&self) -> (u32, u32) {
        (self.height / self.cell_size, self.width / self.cell_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width < 1 || self.height < 1 {
            bail!("width and height must be positive");
        }
        if ilog2_exact(self.cell_size).is_none()
            || !(MIN_CELL_SIZE..=MAX_CELL_SIZE).contains(&self.cell_size)
        {
            bail!(
                "cell-size must be a power of two in {MIN_CELL_SIZE}..={MAX_CELL_SIZE}, got {}",
                self.cell_size
            );
        }
        if self.width % self.cell_size != 0 {
            bail!("width must be a multiple of cell-size");
        }
        if self.height % self.cell_size != 0 {
            bail!("height must be a multiple of cell-size");
        }

        let (rows, cols) = self.grid_dims();
        if self.grid.len() != (rows * cols) as usize {
            bail!(
                "grid field has {} entries, expected {} ({rows} rows x {cols} cols)",
                self.grid.len(),
                rows * cols
            );
        }

        if self.fog_color.is_some() && self.fog_density.is_none() {
            bail!("fog-density is required when fog-color is present");
        }

        Ok(())
    }

    /// The sun direction; defaults to high noon.
    pub fn sun_dir(&self) -> Vec3 {
        Vec3::from(self.sun_dir.unwrap_or([0.0, 1.0, 0.0])).normalize()
    }

    /// The sun intensity; defaults to bright sunlight.
    pub fn sun_intensity(&self) -> Vec3 {
        Vec3::from(self.sun_intensity.unwrap_or([0.9, 0.9, 0.9]))
    }

    pub fn ambient(&self) -> Vec3 {
        Vec3::from(self.ambient.unwrap_or([0.1, 0.1, 0.1]))
    }

    pub fn fog(&self) -> Option<Fog> {
        self.fog_color.map(|color| Fog {
            color: Vec3::from(color),
            // validate() guarantees the density accompanies the color
            density: self.fog_density.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "name": "Test Range",
            "h-scale": 60.0,
            "v-scale": 0.1,
            "min-elev": 10.0,
            "max-elev": 900.0,
            "min-sky": -100.0,
            "max-sky": 3000.0,
            "width": 256,
            "height": 128,
            "cell-size": 128,
            "grid": ["nw", "ne"]
        })
    }

    fn parse(value: serde_json::Value) -> Result<MapFile> {
        let map: MapFile = serde_json::from_value(value)?;
        map.validate()?;
        Ok(map)
    }

    #[test]
    fn minimal_map_uses_defaults() {
        let map = parse(base_json()).unwrap();
        assert_eq!(map.base_elev, 0.0);
        assert!(!map.color_map && !map.normal_map && !map.water_map);
        assert_eq!(map.sun_dir(), Vec3::Y);
        assert_eq!(map.sun_intensity(), Vec3::splat(0.9));
        assert_eq!(map.ambient(), Vec3::splat(0.1));
        assert!(map.fog().is_none());
        assert_eq!(map.grid_dims(), (1, 2));
    }

    #[test]
    fn fog_requires_density() {
        let mut value = base_json();
        value["fog-color"] = serde_json::json!([0.7, 0.7, 0.8]);
        let err = parse(value.clone()).unwrap_err();
        assert!(err.to_string().contains("fog-density"));

        value["fog-density"] = serde_json::json!(0.004);
        let map = parse(value).unwrap();
        let fog = map.fog().unwrap();
        assert_eq!(fog.color, Vec3::new(0.7, 0.7, 0.8));
        assert_eq!(fog.density, 0.004);
    }

    #[test]
    fn cell_size_must_be_a_power_of_two_in_range() {
        for bad in [96, 32, 8192] {
            let mut value = base_json();
            value["cell-size"] = serde_json::json!(bad);
            let err = parse(value).unwrap_err();
            assert!(err.to_string().contains("cell-size"), "{err}");
        }
    }

    #[test]
    fn grid_shape_is_checked() {
        let mut value = base_json();
        value["grid"] = serde_json::json!(["only-one"]);
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("grid"), "{err}");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let mut value = base_json();
        value.as_object_mut().unwrap().remove("h-scale");
        assert!(serde_json::from_value::<MapFile>(value).is_err());
    }
}
