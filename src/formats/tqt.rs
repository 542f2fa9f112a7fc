//! Texture quadtree (`.tqt`) files.
//!
//! A `.tqt` file stores one square texture per quadtree node, mirroring the
//! geometry quadtree of a cell. Little-endian layout: `u32` magic, `u32`
//! version, `u32` depth, `u32` tile size in pixels, then `(4^depth - 1)/3`
//! `u64` payload offsets in level order (row-major inside a level), then the
//! length-prefixed encoded images at those offsets. Images are decoded
//! lazily, one node at a time, as the texture cache requests them.

use crate::{cache::TqtId, math::quadtree_size};
use anyhow::{bail, Context, Result};
use bevy::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt};
use image::RgbaImage;
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

pub const TQT_MAGIC: u32 = 0x00747174; // "tqt\0"
pub const TQT_VERSION: u32 = 1;

/// A disk-backed texture quadtree; loads individual node images on demand.
#[derive(Debug)]
pub struct TextureQTree {
    /// Stream offsets of the per-node payloads, in level order.
    toc: Vec<u64>,
    depth: u32,
    tile_size: u32,
    source: BufReader<File>,
}

impl TextureQTree {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut source = BufReader::new(file);

        let magic = source.read_u32::<LittleEndian>().context("reading magic")?;
        if magic != TQT_MAGIC {
            bail!("bad magic {magic:#010x} in {}", path.display());
        }
        let version = source.read_u32::<LittleEndian>().context("reading version")?;
        if version != TQT_VERSION {
            bail!("unsupported tqt version {version} in {}", path.display());
        }

        let depth = source.read_u32::<LittleEndian>().context("reading depth")?;
        let tile_size = source
            .read_u32::<LittleEndian>()
            .context("reading tile size")?;

        let mut toc = Vec::with_capacity(quadtree_size(depth));
        for _ in 0..quadtree_size(depth) {
            toc.push(source.read_u64::<LittleEndian>()?);
        }

        Ok(Self {
            toc,
            depth,
            tile_size,
            source,
        })
    }

    /// `true` when the file starts with the tqt magic and a supported
    /// version.
    pub fn is_tqt_file(path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let mut reader = BufReader::new(file);
        matches!(
            (
                reader.read_u32::<LittleEndian>(),
                reader.read_u32::<LittleEndian>(),
            ),
            (Ok(TQT_MAGIC), Ok(TQT_VERSION))
        )
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Decodes the image of the node at `(level, row, col)`; the root is
    /// level 0, row 0 is the north edge, column 0 the west edge.
    pub fn load_image(&mut self, level: u32, row: u32, col: u32) -> Result<RgbaImage> {
        if level >= self.depth || row >= (1 << level) || col >= (1 << level) {
            bail!("node ({level}, {row}, {col}) outside tqt of depth {}", self.depth);
        }

        let index = quadtree_size(level) + ((row << level) | col) as usize;
        self.source.seek(SeekFrom::Start(self.toc[index]))?;

        let len = self.source.read_u32::<LittleEndian>()? as usize;
        let mut encoded = vec![0; len];
        self.source.read_exact(&mut encoded)?;

        let image = image::load_from_memory(&encoded)
            .with_context(|| format!("decoding tqt node ({level}, {row}, {col})"))?;
        Ok(image.to_rgba8())
    }
}

/// All texture quadtrees opened for the loaded map, addressed by the ids the
/// cells and the texture cache carry around.
#[derive(Debug, Default, Resource)]
pub struct TqtStore {
    trees: Vec<TextureQTree>,
}

impl TqtStore {
    pub fn open(&mut self, path: &Path) -> Result<TqtId> {
        let tree = TextureQTree::open(path)?;
        self.trees.push(tree);
        Ok(TqtId(self.trees.len() as u32 - 1))
    }

    pub fn get(&self, id: TqtId) -> &TextureQTree {
        &self.trees[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TqtId) -> &mut TextureQTree {
        &mut self.trees[id.0 as usize]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use image::{DynamicImage, Rgba};
    use std::io::Cursor;

    fn encode_png(shade: u8) -> Vec<u8> {
        let image = RgbaImage::from_pixel(2, 2, Rgba([shade, 0, 255 - shade, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Builds a tqt file image whose node shades encode their toc index.
    pub(crate) fn write_tqt(depth: u32) -> Vec<u8> {
        let n_nodes = quadtree_size(depth);
        let payloads: Vec<Vec<u8>> = (0..n_nodes).map(|i| encode_png(i as u8)).collect();

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(TQT_MAGIC).unwrap();
        out.write_u32::<LittleEndian>(TQT_VERSION).unwrap();
        out.write_u32::<LittleEndian>(depth).unwrap();
        out.write_u32::<LittleEndian>(2).unwrap();

        let mut offset = (16 + 8 * n_nodes) as u64;
        for payload in &payloads {
            out.write_u64::<LittleEndian>(offset).unwrap();
            offset += 4 + payload.len() as u64;
        }
        for payload in &payloads {
            out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
            out.extend_from_slice(payload);
        }
        out
    }

    pub(crate) fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.tqt", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn loads_nodes_by_level_row_col() {
        let path = write_temp("tqt-basic", &write_tqt(2));
        let mut tree = TextureQTree::open(&path).unwrap();

        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.tile_size(), 2);

        // root is node 0, the level-1 row 1 / col 0 node is toc index 3
        assert_eq!(tree.load_image(0, 0, 0).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(tree.load_image(1, 1, 0).unwrap().get_pixel(0, 0)[0], 3);

        assert!(tree.load_image(2, 0, 0).is_err());
        assert!(tree.load_image(1, 2, 0).is_err());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn detects_tqt_files() {
        let good = write_temp("tqt-good", &write_tqt(1));
        let bad = write_temp("tqt-bad", b"not a tqt file");

        assert!(TextureQTree::is_tqt_file(&good));
        assert!(!TextureQTree::is_tqt_file(&bad));

        std::fs::remove_file(good).ok();
        std::fs::remove_file(bad).ok();
    }
}
