//! Dirty tracking and progressive accumulation state of the path tracer.
//!
//! Each frame runs [`FrameSync::begin`], which applies these steps in a fixed order:
//! 1. advance or reset the progressive counters (reset when the camera is dirty)
//! 2. mark the composite block dirty, since its counters just changed
//! 3. hand back every dirty slot for upload and clear the set
//!
//! A camera change therefore restarts accumulation in the same frame its block
//! reaches the GPU.

/// One uniform block of the path-trace pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    /// Progressive counters and resolution.
    Composite,
    /// Both light blocks.
    Lights,
    /// Global march parameters.
    RenderParams,
    /// Camera basis.
    Camera,
    /// Per-channel optical properties.
    Channels,
    /// Tonemap exposure.
    Exposure,
}

impl UniformSlot {
    /// Every slot in upload order.
    pub const ALL: [UniformSlot; 6] = [
        UniformSlot::Composite,
        UniformSlot::Lights,
        UniformSlot::RenderParams,
        UniformSlot::Camera,
        UniformSlot::Channels,
        UniformSlot::Exposure,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of uniform blocks whose CPU copy is newer than the GPU copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtySet(u8);

impl DirtySet {
    /// A set with every slot dirty.
    #[must_use]
    pub fn all() -> Self {
        let mut set = Self::default();
        for slot in UniformSlot::ALL {
            set.mark(slot);
        }
        set
    }

    pub fn mark(&mut self, slot: UniformSlot) {
        self.0 |= slot.bit();
    }

    pub fn clear(&mut self, slot: UniformSlot) {
        self.0 &= !slot.bit();
    }

    #[must_use]
    pub fn contains(self, slot: UniformSlot) -> bool {
        self.0 & slot.bit() != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Dirty slots in upload order.
    pub fn iter(self) -> impl Iterator<Item = UniformSlot> {
        UniformSlot::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

/// Frame and sample counters of the progressive integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressiveState {
    pub frame_counter: u32,
    pub sample_counter: u32,
}

impl ProgressiveState {
    /// Resets both counters when the camera changed, otherwise advances both by one.
    pub fn advance(&mut self, camera_dirty: bool) {
        if camera_dirty {
            self.frame_counter = 0;
            self.sample_counter = 0;
        } else {
            self.frame_counter = self.frame_counter.saturating_add(1);
            self.sample_counter = self.sample_counter.saturating_add(1);
        }
    }
}

/// Slots to upload this frame, produced by [`FrameSync::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    pending: DirtySet,
}

impl FrameSync {
    /// Advances `progressive`, then moves every dirty slot out of `dirty`.
    pub fn begin(dirty: &mut DirtySet, progressive: &mut ProgressiveState) -> Self {
        progressive.advance(dirty.contains(UniformSlot::Camera));
        dirty.mark(UniformSlot::Composite);
        let pending = *dirty;
        *dirty = DirtySet::default();
        Self { pending }
    }

    /// Returns true if `slot` must be written this frame.
    #[must_use]
    pub fn needs_upload(&self, slot: UniformSlot) -> bool {
        self.pending.contains(slot)
    }

    /// Slots to write this frame, in upload order.
    pub fn slots(&self) -> impl Iterator<Item = UniformSlot> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_set_bits() {
        let mut set = DirtySet::default();
        assert!(set.is_empty());
        set.mark(UniformSlot::Camera);
        set.mark(UniformSlot::Exposure);
        assert!(set.contains(UniformSlot::Camera));
        assert!(!set.contains(UniformSlot::Lights));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![UniformSlot::Camera, UniformSlot::Exposure]
        );
        set.clear(UniformSlot::Camera);
        assert!(!set.contains(UniformSlot::Camera));
        assert_eq!(DirtySet::all().iter().count(), 6);
    }

    #[test]
    fn test_camera_dirty_resets_counters() {
        let mut dirty = DirtySet::all();
        let mut progressive = ProgressiveState {
            frame_counter: 17,
            sample_counter: 17,
        };
        let sync = FrameSync::begin(&mut dirty, &mut progressive);
        assert_eq!(progressive, ProgressiveState::default());
        assert!(sync.needs_upload(UniformSlot::Camera));
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_clean_frame_advances_by_one() {
        let mut dirty = DirtySet::default();
        let mut progressive = ProgressiveState::default();
        let sync = FrameSync::begin(&mut dirty, &mut progressive);
        assert_eq!(progressive.frame_counter, 1);
        assert_eq!(progressive.sample_counter, 1);
        assert_eq!(sync.slots().collect::<Vec<_>>(), vec![UniformSlot::Composite]);

        FrameSync::begin(&mut dirty, &mut progressive);
        assert_eq!(progressive.frame_counter, 2);
    }

    #[test]
    fn test_non_camera_dirt_keeps_accumulating() {
        let mut dirty = DirtySet::default();
        let mut progressive = ProgressiveState {
            frame_counter: 4,
            sample_counter: 4,
        };
        dirty.mark(UniformSlot::Exposure);
        let sync = FrameSync::begin(&mut dirty, &mut progressive);
        assert_eq!(progressive.frame_counter, 5);
        assert!(sync.needs_upload(UniformSlot::Exposure));
        assert!(!sync.needs_upload(UniformSlot::Camera));
    }
}
