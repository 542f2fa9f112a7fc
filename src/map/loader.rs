//! Loads a map directory into the data model.

use crate::{
    formats::{cell::load_cell_file, map_json::read_map_file, tqt::TqtStore},
    map::{Cell, Map},
};
use anyhow::{bail, Context, Result};
use bevy::{log::info, math::DVec3};
use std::path::Path;

/// Loads `map.json` plus every cell's tile quadtree and texture quadtrees
/// from `dir`.
///
/// The returned tile bounds are world-space, anchored at each cell's NW
/// corner, so the screen-error metric and the chunks' recorded `max_error`
/// share units.
pub fn load_map(dir: &Path) -> Result<(Map, TqtStore)> {
    let meta = read_map_file(&dir.join("map.json"))?;
    let (n_rows, n_cols) = meta.grid_dims();

    info!(
        "map '{}': {}x{} vertices, {n_rows}x{n_cols} cells of {}, h-scale {}, v-scale {}",
        meta.name, meta.width, meta.height, meta.cell_size, meta.h_scale, meta.v_scale
    );

    let span = meta.cell_size as f64 * meta.h_scale as f64;
    let mut tqts = TqtStore::default();
    let mut cells = Vec::with_capacity((n_rows * n_cols) as usize);

    for row in 0..n_rows {
        for col in 0..n_cols {
            let stem = dir.join(&meta.grid[(row * n_cols + col) as usize]);
            let cell_file = load_cell_file(&stem.join("hf.cell"))
                .with_context(|| format!("loading cell ({row}, {col})"))?;

            if cell_file.tile_width != meta.cell_size {
                bail!(
                    "cell ({row}, {col}) is {} vertices wide, map declares {}",
                    cell_file.tile_width,
                    meta.cell_size
                );
            }
            if meta.cell_size >> (cell_file.depth - 1) == 0 {
                bail!(
                    "cell ({row}, {col}) declares {} LODs but is only {} vertices wide",
                    cell_file.depth,
                    meta.cell_size
                );
            }

            let nw_corner = DVec3::new(
                col as f64 * span,
                meta.base_elev as f64,
                row as f64 * span,
            );
            let mut cell = Cell::assemble(
                row,
                col,
                meta.cell_size,
                cell_file.depth,
                cell_file.chunks,
                nw_corner,
                meta.h_scale,
                meta.v_scale,
            );

            if meta.color_map {
                cell.color_tree = Some(
                    tqts.open(&stem.join("color.tqt"))
                        .with_context(|| format!("color tqt of cell ({row}, {col})"))?,
                );
            }
            if meta.normal_map {
                cell.normal_tree = Some(
                    tqts.open(&stem.join("norm.tqt"))
                        .with_context(|| format!("normal tqt of cell ({row}, {col})"))?,
                );
            }
            if let (Some(color), Some(normal)) = (cell.color_tree, cell.normal_tree) {
                debug_assert_eq!(tqts.get(color).depth(), tqts.get(normal).depth());
            }

            cells.push(cell);
        }
    }

    let map = Map {
        name: meta.name.clone(),
        h_scale: meta.h_scale,
        v_scale: meta.v_scale,
        base_elev: meta.base_elev,
        min_elev: meta.min_elev,
        max_elev: meta.max_elev,
        min_sky: meta.min_sky,
        max_sky: meta.max_sky,
        width: meta.width,
        height: meta.height,
        cell_size: meta.cell_size,
        n_rows,
        n_cols,
        has_color: meta.color_map,
        has_normals: meta.normal_map,
        has_water: meta.water_map,
        sun_dir: meta.sun_dir(),
        sun_intensity: meta.sun_intensity(),
        ambient: meta.ambient(),
        fog: meta.fog(),
        cells,
    };

    Ok((map, tqts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::cell::tests::write_cell;
    use std::fs;

    fn write_map_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("{name}-{}", std::process::id()));
        fs::create_dir_all(dir.join("a")).unwrap();
        fs::create_dir_all(dir.join("b")).unwrap();

        let json = serde_json::json!({
            "name": "Loader Test",
            "h-scale": 2.0,
            "v-scale": 0.5,
            "base-elev": 100.0,
            "min-elev": 0.0,
            "max-elev": 500.0,
            "min-sky": -10.0,
            "max-sky": 1000.0,
            "width": 128,
            "height": 64,
            "cell-size": 64,
            "grid": ["a", "b"]
        });
        fs::write(dir.join("map.json"), json.to_string()).unwrap();
        fs::write(dir.join("a/hf.cell"), write_cell(2, 64)).unwrap();
        fs::write(dir.join("b/hf.cell"), write_cell(2, 64)).unwrap();
        dir
    }

    #[test]
    fn loads_a_two_cell_map() {
        let dir = write_map_dir("loader-two-cell");
        let (map, _tqts) = load_map(&dir).unwrap();

        assert_eq!((map.n_rows, map.n_cols), (1, 2));
        assert_eq!(map.cells.len(), 2);
        assert_eq!(map.cell(0, 1).depth, 2);
        assert_eq!(map.cell(0, 1).tiles.len(), 5);

        // the second cell's bounds start one cell span to the east and sit
        // on the base elevation
        let root = &map.cell(0, 1).tiles[0];
        assert_eq!(root.bbox.min.x, 128.0);
        assert_eq!(root.bbox.min.y, 100.0);
        assert_eq!(root.bbox.max.y, 100.0 + 50.0 * 0.5);
        assert_eq!(map.nw_cell_corner(0, 1), DVec3::new(128.0, 100.0, 0.0));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn reports_the_failing_cell() {
        let dir = write_map_dir("loader-bad-cell");
        fs::write(dir.join("b/hf.cell"), b"garbage").unwrap();

        let err = load_map(&dir).unwrap_err();
        assert!(format!("{err:#}").contains("cell (0, 1)"));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_map_json_fails() {
        let dir = std::env::temp_dir().join(format!("loader-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        assert!(load_map(&dir).is_err());
        fs::remove_dir_all(dir).ok();
    }
}
