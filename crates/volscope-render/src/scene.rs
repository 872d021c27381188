//! Drawable objects and their placement.

use glam::Mat4;
use volscope_core::{ChannelState, ObjectId};

use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::mesh::Mesh;
use crate::volume::Volume;

/// Tint and percentile window a channel's LUT was last built from.
type LutInputs = ([f32; 3], (f32, f32));

/// A volume placed in a scene, with the per-view channel settings.
pub struct SceneVolume {
    pub volume: Volume,
    /// One entry per channel of `volume`.
    pub channel_states: Vec<ChannelState>,
    pub enabled: bool,
    applied: Vec<Option<LutInputs>>,
}

impl SceneVolume {
    /// Wraps `volume` with default channel states: the first four channels enabled.
    #[must_use]
    pub fn new(volume: Volume) -> Self {
        let channel_states = ChannelState::default_for_count(volume.channel_count());
        Self {
            volume,
            channel_states,
            enabled: true,
            applied: Vec::new(),
        }
    }

    /// Adds states for channels loaded after this wrapper was created.
    pub fn sync_channel_states(&mut self) {
        let count = self.volume.channel_count();
        while self.channel_states.len() < count {
            let i = self.channel_states.len();
            self.channel_states.push(ChannelState::for_index(i));
        }
        self.channel_states.truncate(count);
    }

    /// Rebuilds the LUT of every channel whose color or window changed since
    /// the last call, and returns how many were rebuilt.
    ///
    /// Both renderers call this before fusing, so edits to `channel_states`
    /// reach the next frame. Toggling `enabled` alone uploads nothing.
    pub fn apply_channel_states(&mut self, ctx: &GpuContext) -> RenderResult<usize> {
        self.sync_channel_states();
        self.applied.resize(self.channel_states.len(), None);
        let mut rebuilt = 0;
        for (channel, state) in self.channel_states.iter().enumerate() {
            let inputs = (state.color, state.window);
            if self.applied[channel] == Some(inputs) {
                continue;
            }
            let (imin, imax) = state.window;
            self.volume.update_lut(ctx, channel, imin, imax, state.color)?;
            self.applied[channel] = Some(inputs);
            rebuilt += 1;
        }
        if rebuilt > 0 {
            log::debug!("rebuilt {rebuilt} channel LUT(s) from view state");
        }
        Ok(rebuilt)
    }

    /// Enables or disables one channel. Out-of-range indices are ignored.
    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) {
        if let Some(state) = self.channel_states.get_mut(channel) {
            state.enabled = enabled;
        }
    }
}

/// What a scene object draws.
pub enum SceneObjectKind {
    Mesh(Mesh),
    Volume(SceneVolume),
}

/// A drawable with a stable id and an object-to-world transform.
pub struct SceneObject {
    pub id: ObjectId,
    pub transform: Mat4,
    pub kind: SceneObjectKind,
}

impl SceneObject {
    #[must_use]
    pub fn is_volume(&self) -> bool {
        matches!(self.kind, SceneObjectKind::Volume(_))
    }

    #[must_use]
    pub fn as_volume(&self) -> Option<&SceneVolume> {
        match &self.kind {
            SceneObjectKind::Volume(v) => Some(v),
            SceneObjectKind::Mesh(_) => None,
        }
    }

    pub fn as_volume_mut(&mut self) -> Option<&mut SceneVolume> {
        match &mut self.kind {
            SceneObjectKind::Volume(v) => Some(v),
            SceneObjectKind::Mesh(_) => None,
        }
    }
}

/// An ordered list of drawable objects.
#[derive(Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a volume and returns its id.
    pub fn add_volume(&mut self, volume: Volume, transform: Mat4) -> ObjectId {
        self.add(SceneObjectKind::Volume(SceneVolume::new(volume)), transform)
    }

    /// Adds a mesh and returns its id.
    pub fn add_mesh(&mut self, mesh: Mesh, transform: Mat4) -> ObjectId {
        self.add(SceneObjectKind::Mesh(mesh), transform)
    }

    fn add(&mut self, kind: SceneObjectKind, transform: Mat4) -> ObjectId {
        let id = ObjectId::next();
        self.objects.push(SceneObject {
            id,
            transform,
            kind,
        });
        id
    }

    /// Removes an object. Renderers keep cached resources until told to forget the id.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(index))
    }

    #[must_use]
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Volume objects in insertion order.
    pub fn volumes(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter().filter(|o| o.is_volume())
    }

    pub fn volumes_mut(&mut self) -> impl Iterator<Item = &mut SceneObject> {
        self.objects.iter_mut().filter(|o| o.is_volume())
    }

    /// The first volume object, if any.
    #[must_use]
    pub fn first_volume(&self) -> Option<&SceneObject> {
        self.volumes().next()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
