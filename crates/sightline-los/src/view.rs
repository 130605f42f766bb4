//! Per-viewer vision flags and cached mask state.

use sightline_map::{MapId, MapSource};

use crate::compute::update_view;
use crate::mask::LosMask;
use crate::table::BlockTable;

/// Vision capabilities and afflictions for one viewer. Omniscient sight
/// bypasses everything; blindness beats x-ray; dark vision only shifts the
/// effective darkness of the lighting pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vision {
    pub blind: bool,
    pub xray: bool,
    pub see_in_dark: bool,
    pub omniscient: bool,
}

/// A viewer's cached mask plus the recompute-owed flag. Fresh states start
/// dirty so the first read computes.
#[derive(Clone, Debug)]
pub struct ViewState {
    mask: LosMask,
    dirty: bool,
}

impl ViewState {
    pub fn new(view_w: i32, view_h: i32) -> Self {
        ViewState {
            mask: LosMask::new(view_w, view_h),
            dirty: true,
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn mask(&self) -> &LosMask {
        &self.mask
    }

    /// Direct cell access for the see-through-walls exception hooks; does
    /// not touch the dirty flag.
    #[inline]
    pub fn mask_mut(&mut self) -> &mut LosMask {
        &mut self.mask
    }

    /// Run the full pipeline unconditionally and clear the dirty flag.
    pub fn recompute<M: MapSource>(
        &mut self,
        table: &BlockTable,
        source: &M,
        map: MapId,
        x: i32,
        y: i32,
        vision: Vision,
    ) {
        update_view(table, source, map, x, y, vision, &mut self.mask);
        self.dirty = false;
    }

    /// Recompute only when owed; returns whether a recompute ran.
    pub fn recompute_if_dirty<M: MapSource>(
        &mut self,
        table: &BlockTable,
        source: &M,
        map: MapId,
        x: i32,
        y: i32,
        vision: Vision,
    ) -> bool {
        if !self.dirty {
            return false;
        }
        self.recompute(table, source, map, x, y, vision);
        true
    }
}
