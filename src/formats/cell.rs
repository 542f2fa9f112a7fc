//! The binary `hf.cell` heightfield format.
//!
//! Little-endian layout: a 4-byte magic, the LOD count, the tile width in
//! vertex-grid units, then one record per tile in level order:
//! `{ max_error: f32, min_y: i16, max_y: i16, n_vertices: u32,
//! n_indices: u32, vertices: [i16; 4] each, indices: u16 each }`.

use crate::{
    map::chunk::{Chunk, TerrainVertex},
    math::quadtree_size,
};
use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::{fs::File, io::BufReader, io::Read, path::Path};

pub const CELL_MAGIC: u32 = 0x63656C6C; // 'cell'
pub const MIN_NUM_LODS: u32 = 1;
pub const MAX_NUM_LODS: u32 = 9;

/// Parsed contents of an `hf.cell` file.
#[derive(Debug)]
pub struct CellFile {
    /// Number of LOD levels (quadtree depth), 1..=9.
    pub depth: u32,
    /// Width of the cell in vertex-grid units.
    pub tile_width: u32,
    /// The complete quadtree of chunks in level order.
    pub chunks: Vec<Chunk>,
}

pub fn load_cell_file(path: &Path) -> Result<CellFile> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_cell(&mut BufReader::new(file)).with_context(|| format!("reading {}", path.display()))
}

pub fn read_cell<R: Read>(reader: &mut R) -> Result<CellFile> {
    let magic = reader.read_u32::<LittleEndian>().context("reading magic")?;
    if magic != CELL_MAGIC {
        bail!("bad magic {magic:#010x}, expected 'cell'");
    }

    let depth = reader.read_u32::<LittleEndian>().context("reading LOD count")?;
    if !(MIN_NUM_LODS..=MAX_NUM_LODS).contains(&depth) {
        bail!("LOD count {depth} outside {MIN_NUM_LODS}..={MAX_NUM_LODS}");
    }

    let tile_width = reader
        .read_u32::<LittleEndian>()
        .context("reading tile width")?;

    let n_tiles = quadtree_size(depth);
    let mut chunks = Vec::with_capacity(n_tiles);
    for id in 0..n_tiles {
        chunks.push(read_chunk(reader).with_context(|| format!("tile {id}"))?);
    }

    Ok(CellFile {
        depth,
        tile_width,
        chunks,
    })
}

fn read_chunk<R: Read>(reader: &mut R) -> Result<Chunk> {
    let max_error = reader.read_f32::<LittleEndian>().context("max error")?;
    let min_y = reader.read_i16::<LittleEndian>().context("min y")?;
    let max_y = reader.read_i16::<LittleEndian>().context("max y")?;
    let n_vertices = reader.read_u32::<LittleEndian>().context("vertex count")?;
    let n_indices = reader.read_u32::<LittleEndian>().context("index count")?;

    // u16 indices with 0xffff reserved for strip restarts
    if n_vertices > 0xffff {
        bail!("vertex count {n_vertices} does not fit 16-bit indices");
    }

    let mut vertices = Vec::with_capacity(n_vertices as usize);
    for _ in 0..n_vertices {
        vertices.push(TerrainVertex {
            x: reader.read_i16::<LittleEndian>()?,
            y: reader.read_i16::<LittleEndian>()?,
            z: reader.read_i16::<LittleEndian>()?,
            morph_delta: reader.read_i16::<LittleEndian>()?,
        });
    }

    let mut indices = Vec::with_capacity(n_indices as usize);
    for _ in 0..n_indices {
        indices.push(reader.read_u16::<LittleEndian>()?);
    }

    Ok(Chunk {
        max_error,
        min_y,
        max_y,
        vertices,
        indices,
    })
}
