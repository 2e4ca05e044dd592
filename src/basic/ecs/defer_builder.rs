//! Deferred bundle spawning.
//!
//! Record intake spawns thousands of entities whose component sets differ
//! per record (optional record ids, optional markers, optional tap data).
//! The builder parks component values in a bump arena and queues one
//! `(ComponentId, pointer)` pair per component, so the whole set lands on the
//! entity in a single insert; the [`OptBundle`] derive skips `None` fields,
//! letting one struct per record type describe the full component set.

use std::ptr::NonNull;

use bevy_ecs::{
    component::ComponentId,
    prelude::*,
    ptr::{Aligned, OwningPtr},
};
use bumpalo::Bump;

pub use gridsolve_proc_macro::OptBundle;

/// Queues arena-parked components for one entity and commits them at once.
pub struct DeferredBundleBuilder<'a> {
    entity: &'a mut EntityWorldMut<'a>,
    parts: Vec<(ComponentId, OwningPtr<'a, Aligned>)>,
    bump: &'a Bump,
}

impl<'a> DeferredBundleBuilder<'a> {
    pub fn new(entity: &'a mut EntityWorldMut<'a>, bump: &'a Bump) -> Self {
        Self {
            entity,
            parts: Vec::new(),
            bump,
        }
    }

    /// Queues one component value. The value moves into the arena; only its
    /// id/pointer pair is kept until the commit.
    pub fn insert<T: Component>(&mut self, value: T) {
        let id = self.component_id_of::<T>();
        let parked: &mut T = self.bump.alloc(value);
        // SAFETY: `parked` is a live, aligned `T` inside the arena. The
        // arena is only reset after the commit handed ownership of every
        // pointee to the world, and nothing else reads the slot again.
        let ptr = unsafe { OwningPtr::new(NonNull::from(parked).cast()) };
        self.parts.push((id, ptr));
    }

    /// Queues a type-erased component, for intake paths where the component
    /// type is not statically known.
    pub fn insert_by_id(&mut self, id: ComponentId, ptr: OwningPtr<'a>) {
        self.parts.push((id, ptr));
    }

    fn component_id_of<T: Component>(&mut self) -> ComponentId {
        // SAFETY: the world reference is only used to look up (or register)
        // component metadata; the parked entity handle is not moved and no
        // structural change to its archetype happens here.
        let world = unsafe { self.entity.world_mut() };
        world
            .component_id::<T>()
            .unwrap_or_else(|| world.register_component::<T>())
    }

    /// Hands every queued component to the entity in one insert.
    pub fn commit(self) {
        let (ids, ptrs): (Vec<ComponentId>, Vec<OwningPtr<'a, Aligned>>) =
            self.parts.into_iter().unzip();
        // SAFETY: ids and pointers were queued pairwise; each pointer owns a
        // value of exactly the type its id describes, and is consumed once.
        unsafe { self.entity.insert_by_ids(&ids, ptrs.into_iter()) };
    }
}

/// A component set that can insert itself into a [`DeferredBundleBuilder`];
/// `Option` fields are inserted only when present. Derived via
/// `#[derive(OptBundle)]`.
pub trait OptBundle {
    fn insert_to(self, builder: &mut DeferredBundleBuilder);
}

/// Batch spawner backed by one bump arena, reset between batches.
pub struct DeferBundleSpawner {
    bump: Bump,
}

impl Default for DeferBundleSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferBundleSpawner {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Spawns one entity per bundle and returns their ids in order.
    pub fn spawn_batch<T: OptBundle, U>(&mut self, world: &mut World, data: U) -> Vec<Entity>
    where
        U: IntoIterator<Item = T>,
    {
        let mut spawned = Vec::new();
        for bundle in data {
            let mut entity = world.spawn_empty();
            spawned.push(entity.id());
            let mut builder = DeferredBundleBuilder::new(&mut entity, &self.bump);
            bundle.insert_to(&mut builder);
            builder.commit();
        }
        self.bump.reset();
        spawned
    }

    /// Spawns a single bundle.
    pub fn spawn_one<T: OptBundle>(&mut self, world: &mut World, data: T) -> Entity {
        self.spawn_batch(world, std::iter::once(data))[0]
    }
}
