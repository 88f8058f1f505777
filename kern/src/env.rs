//! Environments.

use crate::pgdir::AddressSpace;
use abyss::{
    KernelError,
    syscall::{ENVGENSHIFT, EnvId, EnvStatus, NENV},
};
use ulib::syscall::UpcallEntry;

/// An environment: an address space plus the kernel's bookkeeping for it.
pub struct Env {
    /// Identity.
    pub id: EnvId,
    /// Creator, or [`EnvId::CURRENT`] for environments the kernel spawned.
    pub parent: EnvId,
    /// Run state.
    pub status: EnvStatus,
    /// Address space.
    pub space: AddressSpace,
    /// Registered page fault upcall.
    pub upcall: Option<UpcallEntry>,
    /// Set by exofork; the next exofork issued by this environment returns
    /// `0` instead of creating anything.
    pub(crate) exofork_pending: bool,
}

/// The table of environments.
pub struct EnvTable {
    slots: Vec<Option<Env>>,
    last_ids: Vec<i32>,
}

impl EnvTable {
    /// A table with room for `capacity` environments (at most [`NENV`]).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, NENV);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            last_ids: vec![0; capacity],
        }
    }

    /// Create an environment in the lowest free slot.
    ///
    /// # Errors
    /// - [`KernelError::NoFreeEnv`] if every slot is taken.
    pub fn alloc(
        &mut self,
        parent: EnvId,
        status: EnvStatus,
        space: AddressSpace,
    ) -> Result<EnvId, KernelError> {
        let idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::NoFreeEnv)?;
        let mut generation = (self.last_ids[idx] + (1 << ENVGENSHIFT)) & !(NENV as i32 - 1);
        if generation <= 0 {
            generation = 1 << ENVGENSHIFT;
        }
        let id = EnvId(generation | idx as i32);
        self.last_ids[idx] = id.0;
        self.slots[idx] = Some(Env {
            id,
            parent,
            status,
            space,
            upcall: None,
            exofork_pending: false,
        });
        Ok(id)
    }

    /// The live environment `id`.
    pub fn get(&self, id: EnvId) -> Option<&Env> {
        self.slots
            .get(id.envx())?
            .as_ref()
            .filter(|env| env.id == id)
    }

    /// The live environment `id`, mutably.
    pub fn get_mut(&mut self, id: EnvId) -> Option<&mut Env> {
        self.slots
            .get_mut(id.envx())?
            .as_mut()
            .filter(|env| env.id == id)
    }

    /// Free the slot of `id`.
    pub fn remove(&mut self, id: EnvId) -> Option<Env> {
        self.get(id)?;
        self.slots[id.envx()].take()
    }

    /// Resolve `id` as named by `caller`.
    ///
    /// [`EnvId::CURRENT`] names the caller. With `checkperm`, the target must
    /// be the caller itself or one of its immediate children.
    ///
    /// # Errors
    /// - [`KernelError::BadEnv`] if the target does not exist or `checkperm`
    ///   fails.
    pub fn envid2env(&self, caller: EnvId, id: EnvId, checkperm: bool) -> Result<EnvId, KernelError> {
        if id == EnvId::CURRENT {
            return Ok(caller);
        }
        let env = self.get(id).ok_or(KernelError::BadEnv)?;
        if checkperm && env.id != caller && env.parent != caller {
            return Err(KernelError::BadEnv);
        }
        Ok(env.id)
    }

    /// Number of live environments.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no environment is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
