//! Tiled-map facts consumed by the visibility engine.
#![forbid(unsafe_code)]

use std::collections::HashMap;

/// Maximum map darkness; higher configured values are clamped.
pub const MAX_DARKNESS: u8 = 5;

/// Handle for one map tile inside a [`MapSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

/// Cardinal seam of a map tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileSide {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl TileSide {
    pub const ALL: [TileSide; 4] = [
        TileSide::North,
        TileSide::East,
        TileSide::South,
        TileSide::West,
    ];
}

/// Result of resolving an absolute coordinate, possibly across a tile seam.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub map: MapId,
    pub x: i32,
    pub y: i32,
    pub out_of_bounds: bool,
    pub crossed_tile: bool,
}

impl Resolved {
    #[inline]
    fn nowhere(map: MapId, x: i32, y: i32) -> Self {
        Resolved {
            map,
            x,
            y,
            out_of_bounds: true,
            crossed_tile: false,
        }
    }
}

/// Per-cell and per-map facts the engine reads. `is_opaque` and
/// `light_emission` take coordinates already resolved onto `map`.
pub trait MapSource {
    fn resolve(&self, map: MapId, x: i32, y: i32) -> Resolved;
    fn is_opaque(&self, map: MapId, x: i32, y: i32) -> bool;
    fn light_emission(&self, map: MapId, x: i32, y: i32) -> i8;
    fn darkness(&self, map: MapId) -> u8;
    fn is_outdoor(&self, map: MapId) -> bool;
    fn dimensions(&self, map: MapId) -> (i32, i32);
    fn neighbor(&self, map: MapId, side: TileSide) -> Option<MapId>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellFacts {
    pub opaque: bool,
    pub glow: i8,
}

#[derive(Clone, Debug)]
struct Tile {
    w: i32,
    h: i32,
    darkness: u8,
    outdoor: bool,
    neighbors: [Option<MapId>; 4],
    cells: Vec<CellFacts>,
}

impl Tile {
    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        (y * self.w + x) as usize
    }

    #[inline]
    fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h
    }
}

/// In-memory tiled map store. Tiles are rectangular grids linked along
/// cardinal seams; links are established both ways by [`TileAtlas::link`].
#[derive(Default)]
pub struct TileAtlas {
    tiles: HashMap<MapId, Tile>,
    next_id: u32,
}

impl TileAtlas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_map(&mut self, w: i32, h: i32, darkness: u8, outdoor: bool) -> MapId {
        assert!(w > 0 && h > 0, "tile dimensions must be positive");
        let id = MapId(self.next_id);
        self.next_id += 1;
        let darkness = clamp_darkness(id, darkness);
        self.tiles.insert(
            id,
            Tile {
                w,
                h,
                darkness,
                outdoor,
                neighbors: [None; 4],
                cells: vec![CellFacts::default(); (w * h) as usize],
            },
        );
        id
    }

    /// Link `a`'s `side` seam to `b`, and `b`'s opposite seam back to `a`.
    pub fn link(&mut self, a: MapId, side: TileSide, b: MapId) {
        if let Some(t) = self.tiles.get_mut(&a) {
            t.neighbors[side as usize] = Some(b);
        }
        let back = match side {
            TileSide::North => TileSide::South,
            TileSide::East => TileSide::West,
            TileSide::South => TileSide::North,
            TileSide::West => TileSide::East,
        };
        if let Some(t) = self.tiles.get_mut(&b) {
            t.neighbors[back as usize] = Some(a);
        }
    }

    pub fn set_opaque(&mut self, map: MapId, x: i32, y: i32, opaque: bool) {
        if let Some(t) = self.tiles.get_mut(&map) {
            if t.contains(x, y) {
                let i = t.idx(x, y);
                t.cells[i].opaque = opaque;
            }
        }
    }

    pub fn set_glow(&mut self, map: MapId, x: i32, y: i32, glow: i8) {
        if let Some(t) = self.tiles.get_mut(&map) {
            if t.contains(x, y) {
                let i = t.idx(x, y);
                t.cells[i].glow = glow;
            }
        }
    }

    pub fn set_darkness(&mut self, map: MapId, darkness: u8) {
        let darkness = clamp_darkness(map, darkness);
        if let Some(t) = self.tiles.get_mut(&map) {
            t.darkness = darkness;
        }
    }

    pub fn set_outdoor(&mut self, map: MapId, outdoor: bool) {
        if let Some(t) = self.tiles.get_mut(&map) {
            t.outdoor = outdoor;
        }
    }

    #[inline]
    fn cell(&self, map: MapId, x: i32, y: i32) -> Option<CellFacts> {
        let t = self.tiles.get(&map)?;
        if !t.contains(x, y) {
            return None;
        }
        Some(t.cells[t.idx(x, y)])
    }
}

fn clamp_darkness(map: MapId, darkness: u8) -> u8 {
    if darkness > MAX_DARKNESS {
        log::warn!(
            target: "sightline_map",
            "map {:?} configured darkness {} above maximum {}, clamping",
            map,
            darkness,
            MAX_DARKNESS
        );
        MAX_DARKNESS
    } else {
        darkness
    }
}

impl MapSource for TileAtlas {
    fn resolve(&self, map: MapId, x: i32, y: i32) -> Resolved {
        let Some(t) = self.tiles.get(&map) else {
            return Resolved::nowhere(map, x, y);
        };
        if t.contains(x, y) {
            return Resolved {
                map,
                x,
                y,
                out_of_bounds: false,
                crossed_tile: false,
            };
        }
        // Step onto the adjacent tile and resolve the remainder there, one
        // seam at a time.
        let (next, nx, ny) = if x < 0 {
            let Some(n) = t.neighbors[TileSide::West as usize] else {
                return Resolved::nowhere(map, x, y);
            };
            let (nw, _) = self.dimensions(n);
            (n, x + nw, y)
        } else if x >= t.w {
            let Some(n) = t.neighbors[TileSide::East as usize] else {
                return Resolved::nowhere(map, x, y);
            };
            (n, x - t.w, y)
        } else if y < 0 {
            let Some(n) = t.neighbors[TileSide::North as usize] else {
                return Resolved::nowhere(map, x, y);
            };
            let (_, nh) = self.dimensions(n);
            (n, x, y + nh)
        } else {
            let Some(n) = t.neighbors[TileSide::South as usize] else {
                return Resolved::nowhere(map, x, y);
            };
            (n, x, y - t.h)
        };
        let mut r = self.resolve(next, nx, ny);
        r.crossed_tile = true;
        r
    }

    fn is_opaque(&self, map: MapId, x: i32, y: i32) -> bool {
        self.cell(map, x, y).map(|c| c.opaque).unwrap_or(true)
    }

    fn light_emission(&self, map: MapId, x: i32, y: i32) -> i8 {
        self.cell(map, x, y).map(|c| c.glow).unwrap_or(0)
    }

    fn darkness(&self, map: MapId) -> u8 {
        self.tiles.get(&map).map(|t| t.darkness).unwrap_or(0)
    }

    fn is_outdoor(&self, map: MapId) -> bool {
        self.tiles.get(&map).map(|t| t.outdoor).unwrap_or(false)
    }

    fn dimensions(&self, map: MapId) -> (i32, i32) {
        self.tiles.get(&map).map(|t| (t.w, t.h)).unwrap_or((0, 0))
    }

    fn neighbor(&self, map: MapId, side: TileSide) -> Option<MapId> {
        self.tiles.get(&map)?.neighbors[side as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_linked_maps() -> (TileAtlas, MapId, MapId) {
        let mut atlas = TileAtlas::new();
        let a = atlas.add_map(10, 10, 0, false);
        let b = atlas.add_map(10, 10, 0, false);
        atlas.link(a, TileSide::East, b);
        (atlas, a, b)
    }

    #[test]
    fn resolve_in_bounds_is_identity() {
        let (atlas, a, _) = two_linked_maps();
        let r = atlas.resolve(a, 3, 4);
        assert_eq!(
            r,
            Resolved {
                map: a,
                x: 3,
                y: 4,
                out_of_bounds: false,
                crossed_tile: false
            }
        );
    }

    #[test]
    fn resolve_crosses_east_seam() {
        let (atlas, a, b) = two_linked_maps();
        let r = atlas.resolve(a, 12, 4);
        assert_eq!(r.map, b);
        assert_eq!((r.x, r.y), (2, 4));
        assert!(r.crossed_tile);
        assert!(!r.out_of_bounds);
    }

    #[test]
    fn resolve_crosses_west_seam_back() {
        let (atlas, _, b) = two_linked_maps();
        // link() wires the reverse seam too
        let r = atlas.resolve(b, -1, 7);
        assert_eq!((r.x, r.y), (9, 7));
        assert!(r.crossed_tile);
    }

    #[test]
    fn resolve_into_nothing_is_out_of_bounds() {
        let (atlas, a, _) = two_linked_maps();
        let r = atlas.resolve(a, 3, -1);
        assert!(r.out_of_bounds);
    }

    #[test]
    fn unknown_cells_read_as_opaque_and_unlit() {
        let (atlas, a, _) = two_linked_maps();
        assert!(atlas.is_opaque(a, -5, -5));
        assert_eq!(atlas.light_emission(a, -5, -5), 0);
    }

    #[test]
    fn darkness_above_maximum_clamps() {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(5, 5, 9, false);
        assert_eq!(atlas.darkness(m), MAX_DARKNESS);
        atlas.set_darkness(m, 200);
        assert_eq!(atlas.darkness(m), MAX_DARKNESS);
    }

    #[test]
    fn cell_facts_roundtrip() {
        let (mut atlas, a, _) = two_linked_maps();
        atlas.set_opaque(a, 2, 2, true);
        atlas.set_glow(a, 4, 4, 3);
        assert!(atlas.is_opaque(a, 2, 2));
        assert_eq!(atlas.light_emission(a, 4, 4), 3);
        assert!(!atlas.is_opaque(a, 4, 4));
    }
}
