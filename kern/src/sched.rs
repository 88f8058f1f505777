//! Resuming forked children.

use crate::handle::EnvHandle;
use abyss::{KernelError, syscall::{EnvId, EnvStatus}};
use ulib::{Process, syscall::ForkResult};

/// Run the child `child` of `parent` up to the return of its fork.
///
/// A child created by fork starts with an image of its parent's memory, so
/// its process descriptor is the parent's, attached to the child's own
/// environment. Resuming it re-enters [`Process::fork`], where the pending
/// exofork returns in the child.
///
/// # Errors
/// - [`KernelError::BadEnv`] if `child` is not a runnable environment
///   waiting to return from exofork.
pub fn resume_forked(parent: &Process<EnvHandle>, child: EnvId) -> Result<Process<EnvHandle>, KernelError> {
    let machine = parent.kernel().machine();
    if machine.status(child) != Some(EnvStatus::Runnable) || !machine.is_fork_pending(child) {
        return Err(KernelError::BadEnv);
    }
    let mut process = parent.clone().with_kernel(machine.handle(child));
    match process.fork()? {
        ForkResult::Child => Ok(process),
        ForkResult::Parent(_) => Err(KernelError::Unspecified),
    }
}
