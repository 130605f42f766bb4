//! Viewer registry and recompute scheduling.

use std::error::Error;
use std::sync::Arc;

use hashbrown::HashMap;

use sightline_los::{BlockTable, Cell, LosMask, ViewState, Vision};
use sightline_map::{MapId, MapSource, TileSide};

use crate::config::EngineConfig;

/// Handle for one connected viewer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewerId(u64);

/// A connected viewer: position, vision flags, and the cached mask.
pub struct Viewer {
    pub map: MapId,
    pub x: i32,
    pub y: i32,
    pub vision: Vision,
    state: ViewState,
}

impl Viewer {
    #[inline]
    pub fn mask(&self) -> &LosMask {
        self.state.mask()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }
}

/// Owns the shared geometry table and every viewer's visibility state, and
/// decides which masks are stale each tick. Map facts come from the caller's
/// [`MapSource`]; the engine never stores them.
pub struct Engine {
    table: Arc<BlockTable>,
    config: EngineConfig,
    viewers: HashMap<ViewerId, Viewer>,
    next_id: u64,
}

impl Engine {
    /// Validate the configuration and precompute the geometry table. A
    /// degenerate window is fatal here; there is no degraded mode without a
    /// visibility table.
    pub fn new(config: EngineConfig) -> Result<Self, Box<dyn Error>> {
        config.validate()?;
        let table = Arc::new(BlockTable::build(config.table_width, config.table_height)?);
        Ok(Engine {
            table,
            config,
            viewers: HashMap::new(),
            next_id: 1,
        })
    }

    /// The shared geometry table; build once, read from everywhere.
    #[inline]
    pub fn table(&self) -> &Arc<BlockTable> {
        &self.table
    }

    fn alloc_id(&mut self) -> ViewerId {
        let id = ViewerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Register a session with the default view size. The new state is born
    /// dirty, so the first read computes.
    pub fn add_viewer(&mut self, map: MapId, x: i32, y: i32) -> ViewerId {
        let (w, h) = (self.config.view_width, self.config.view_height);
        self.add_viewer_sized(map, x, y, w, h)
            .expect("default view size was validated at startup")
    }

    /// Register a session with its own view size, which must be odd and no
    /// larger than the table.
    pub fn add_viewer_sized(
        &mut self,
        map: MapId,
        x: i32,
        y: i32,
        view_w: i32,
        view_h: i32,
    ) -> Result<ViewerId, Box<dyn Error>> {
        let cfg = EngineConfig {
            view_width: view_w,
            view_height: view_h,
            ..self.config
        };
        cfg.validate()?;
        let id = self.alloc_id();
        self.viewers.insert(
            id,
            Viewer {
                map,
                x,
                y,
                vision: Vision::default(),
                state: ViewState::new(view_w, view_h),
            },
        );
        Ok(id)
    }

    pub fn remove_viewer(&mut self, id: ViewerId) -> bool {
        self.viewers.remove(&id).is_some()
    }

    pub fn viewer(&self, id: ViewerId) -> Option<&Viewer> {
        self.viewers.get(&id)
    }

    pub fn mark_dirty(&mut self, id: ViewerId) {
        if let Some(v) = self.viewers.get_mut(&id) {
            v.state.mark_dirty();
        }
    }

    /// Move a viewer; any actual change of position owes a recompute.
    pub fn move_viewer(&mut self, id: ViewerId, map: MapId, x: i32, y: i32) {
        if let Some(v) = self.viewers.get_mut(&id) {
            if (v.map, v.x, v.y) != (map, x, y) {
                v.map = map;
                v.x = x;
                v.y = y;
                v.state.mark_dirty();
            }
        }
    }

    pub fn set_vision(&mut self, id: ViewerId, vision: Vision) {
        if let Some(v) = self.viewers.get_mut(&id) {
            if v.vision != vision {
                v.vision = vision;
                v.state.mark_dirty();
            }
        }
    }

    /// Run the pipeline if the viewer's mask is stale, then hand the mask
    /// back read-only.
    pub fn recompute_if_dirty<M: MapSource>(
        &mut self,
        id: ViewerId,
        source: &M,
    ) -> Option<&LosMask> {
        let v = self.viewers.get_mut(&id)?;
        v.state
            .recompute_if_dirty(&self.table, source, v.map, v.x, v.y, v.vision);
        Some(v.state.mask())
    }

    /// Per-tick sweep: recompute every stale mask, returning how many ran.
    pub fn run_pending<M: MapSource>(&mut self, source: &M) -> usize {
        let mut ran = 0;
        for v in self.viewers.values_mut() {
            if v.state
                .recompute_if_dirty(&self.table, source, v.map, v.x, v.y, v.vision)
            {
                ran += 1;
            }
        }
        if ran > 0 {
            log::debug!(target: "sightline", "recomputed {ran} viewer masks");
        }
        ran
    }

    /// A cell gained or lost the blocks-view property (or its glow): flag
    /// every viewer whose window covers it, including viewers standing on
    /// the four cardinal neighbor tiles.
    pub fn note_cell_changed<M: MapSource>(&mut self, source: &M, map: MapId, x: i32, y: i32) {
        let (mw, mh) = source.dimensions(map);
        let north = source.neighbor(map, TileSide::North);
        let east = source.neighbor(map, TileSide::East);
        let south = source.neighbor(map, TileSide::South);
        let west = source.neighbor(map, TileSide::West);

        for v in self.viewers.values_mut() {
            let hw = v.state.mask().width() / 2;
            let hh = v.state.mask().height() / 2;
            // Translate the changed cell into the viewer's tile frame; a
            // neighbor tile shifts it by the seam-side map height or width.
            let hit = if v.map == map {
                (v.x - x).abs() <= hw && (v.y - y).abs() <= hh
            } else if Some(v.map) == north {
                let (_, nh) = source.dimensions(v.map);
                (v.x - x).abs() <= hw && (y + nh - v.y).abs() <= hh
            } else if Some(v.map) == south {
                (v.x - x).abs() <= hw && (v.y + mh - y).abs() <= hh
            } else if Some(v.map) == east {
                (v.x + mw - x).abs() <= hw && (v.y - y).abs() <= hh
            } else if Some(v.map) == west {
                let (nw, _) = source.dimensions(v.map);
                (x + nw - v.x).abs() <= hw && (v.y - y).abs() <= hh
            } else {
                false
            };
            if hit {
                v.state.mark_dirty();
            }
        }
    }

    /// A map's global darkness changed: every viewer on it recomputes. Kept
    /// map-wide rather than window-scoped since the change is global.
    pub fn note_darkness_changed(&mut self, map: MapId) {
        for v in self.viewers.values_mut() {
            if v.map == map {
                v.state.mark_dirty();
            }
        }
    }

    /// Force a single map cell visible in every covering mask, outside the
    /// normal pipeline. No recompute is scheduled; the next full recompute
    /// owns the cell again.
    pub fn mark_visible_through_walls(&mut self, map: MapId, x: i32, y: i32) {
        self.poke(map, x, y, Cell::Visible);
    }

    /// Undo [`Engine::mark_visible_through_walls`]: the cell reads blocked,
    /// failing safe, until the next full recompute. The viewer's own cell is
    /// never poked.
    pub fn unmark_visible_through_walls(&mut self, map: MapId, x: i32, y: i32) {
        self.poke(map, x, y, Cell::Blocked);
    }

    fn poke(&mut self, map: MapId, x: i32, y: i32, cell: Cell) {
        for v in self.viewers.values_mut() {
            if v.map != map {
                continue;
            }
            let (vx, vy) = (v.x, v.y);
            let mask = v.state.mask_mut();
            let (ccx, ccy) = mask.center();
            let ax = ccx + x - vx;
            let ay = ccy + y - vy;
            if !mask.in_bounds(ax, ay) {
                continue;
            }
            if cell.is_blocked() && (ax, ay) == (ccx, ccy) {
                continue;
            }
            mask.set(ax, ay, cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_map::TileAtlas;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    fn atlas_with_map() -> (TileAtlas, MapId) {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(31, 31, 0, false);
        (atlas, m)
    }

    #[test]
    fn fresh_viewers_compute_once_then_settle() {
        let (atlas, m) = atlas_with_map();
        let mut eng = engine();
        let a = eng.add_viewer(m, 15, 15);
        let b = eng.add_viewer(m, 5, 5);
        assert!(eng.viewer(a).unwrap().is_dirty());
        assert_eq!(eng.run_pending(&atlas), 2);
        assert_eq!(eng.run_pending(&atlas), 0);
        assert!(!eng.viewer(b).unwrap().is_dirty());
    }

    #[test]
    fn recompute_if_dirty_returns_the_cached_mask_when_clean() {
        let (mut atlas, m) = atlas_with_map();
        atlas.set_opaque(m, 15, 14, true);
        let mut eng = engine();
        let id = eng.add_viewer(m, 15, 15);
        let before = eng.recompute_if_dirty(id, &atlas).unwrap().clone();
        // Mutating the map without notifying the engine changes nothing.
        atlas.set_opaque(m, 15, 14, false);
        let after = eng.recompute_if_dirty(id, &atlas).unwrap().clone();
        assert_eq!(before, after);
        // Until someone reports the change.
        eng.note_cell_changed(&atlas, m, 15, 14);
        let refreshed = eng.recompute_if_dirty(id, &atlas).unwrap();
        assert_ne!(&before, refreshed);
    }

    #[test]
    fn cell_changes_flag_only_covering_windows() {
        let (atlas, m) = atlas_with_map();
        let mut eng = engine();
        let near = eng.add_viewer(m, 15, 15);
        let far = eng.add_viewer(m, 2, 2);
        eng.run_pending(&atlas);
        eng.note_cell_changed(&atlas, m, 17, 13);
        assert!(eng.viewer(near).unwrap().is_dirty());
        assert!(!eng.viewer(far).unwrap().is_dirty());
    }

    #[test]
    fn cell_changes_cross_tile_seams() {
        let mut atlas = TileAtlas::new();
        let a = atlas.add_map(31, 31, 0, false);
        let b = atlas.add_map(31, 31, 0, false);
        atlas.link(a, TileSide::East, b);
        let mut eng = engine();
        // Standing on b just past the seam; a change near a's east edge is
        // three cells away in the viewer's frame.
        let onb = eng.add_viewer(b, 2, 15);
        let deep = eng.add_viewer(b, 20, 15);
        eng.run_pending(&atlas);
        eng.note_cell_changed(&atlas, a, 30, 15);
        assert!(eng.viewer(onb).unwrap().is_dirty());
        assert!(!eng.viewer(deep).unwrap().is_dirty());
    }

    #[test]
    fn darkness_changes_flag_the_whole_map() {
        let mut atlas = TileAtlas::new();
        let a = atlas.add_map(31, 31, 0, false);
        let b = atlas.add_map(31, 31, 0, false);
        let mut eng = engine();
        let on_a = eng.add_viewer(a, 3, 3);
        let far_a = eng.add_viewer(a, 28, 28);
        let on_b = eng.add_viewer(b, 15, 15);
        eng.run_pending(&atlas);
        atlas.set_darkness(a, 4);
        eng.note_darkness_changed(a);
        assert!(eng.viewer(on_a).unwrap().is_dirty());
        assert!(eng.viewer(far_a).unwrap().is_dirty());
        assert!(!eng.viewer(on_b).unwrap().is_dirty());
    }

    #[test]
    fn vision_and_movement_mark_dirty() {
        let (atlas, m) = atlas_with_map();
        let mut eng = engine();
        let id = eng.add_viewer(m, 15, 15);
        eng.run_pending(&atlas);

        eng.move_viewer(id, m, 15, 15);
        assert!(!eng.viewer(id).unwrap().is_dirty());
        eng.move_viewer(id, m, 16, 15);
        assert!(eng.viewer(id).unwrap().is_dirty());
        eng.run_pending(&atlas);

        eng.set_vision(id, Vision::default());
        assert!(!eng.viewer(id).unwrap().is_dirty());
        eng.set_vision(
            id,
            Vision {
                blind: true,
                ..Vision::default()
            },
        );
        assert!(eng.viewer(id).unwrap().is_dirty());
    }

    #[test]
    fn pokes_edit_masks_without_scheduling() {
        let (mut atlas, m) = atlas_with_map();
        // Ring of walls two cells out; the outside stays hidden even after
        // corner smoothing.
        for dy in -2i32..=2 {
            for dx in -2i32..=2 {
                if dx.abs().max(dy.abs()) == 2 {
                    atlas.set_opaque(m, 15 + dx, 15 + dy, true);
                }
            }
        }
        let mut eng = engine();
        let id = eng.add_viewer(m, 15, 15);
        eng.run_pending(&atlas);
        let (ccx, ccy) = eng.viewer(id).unwrap().mask().center();
        assert_eq!(
            eng.viewer(id).unwrap().mask().get(ccx + 4, ccy),
            Cell::Blocked
        );

        eng.mark_visible_through_walls(m, 19, 15);
        let v = eng.viewer(id).unwrap();
        assert_eq!(v.mask().get(ccx + 4, ccy), Cell::Visible);
        assert!(!v.is_dirty());

        eng.unmark_visible_through_walls(m, 19, 15);
        let v = eng.viewer(id).unwrap();
        assert_eq!(v.mask().get(ccx + 4, ccy), Cell::Blocked);
        assert!(!v.is_dirty());

        // The viewer's own cell cannot be poked dark.
        eng.unmark_visible_through_walls(m, 15, 15);
        assert_ne!(eng.viewer(id).unwrap().mask().get(ccx, ccy), Cell::Blocked);
    }

    #[test]
    fn viewer_sized_views_are_validated() {
        let (_, m) = atlas_with_map();
        let mut eng = engine();
        assert!(eng.add_viewer_sized(m, 15, 15, 9, 9).is_ok());
        assert!(eng.add_viewer_sized(m, 15, 15, 10, 9).is_err());
        assert!(eng.add_viewer_sized(m, 15, 15, 27, 27).is_err());
    }

    #[test]
    fn removal_forgets_the_session() {
        let (atlas, m) = atlas_with_map();
        let mut eng = engine();
        let id = eng.add_viewer(m, 15, 15);
        assert!(eng.remove_viewer(id));
        assert!(!eng.remove_viewer(id));
        assert!(eng.recompute_if_dirty(id, &atlas).is_none());
    }
}
