//! # A host model of the exokernel
//!
//! The kernel exports mechanism only. This crate implements that mechanism
//! on the host so the user-level library above it can be driven
//! deterministically:
//!
//! - [`mm`]: physical frames with reference counts.
//! - [`pgdir`]: two-level address spaces built from those frames.
//! - [`env`]: the environment table, ids with generations, and the rule
//!   that an environment may only act on itself or its children.
//! - [`machine`]: the system call dispatcher and the kernel's own view of
//!   every environment.
//! - [`handle`]: [`EnvHandle`], code running inside one environment.
//! - [`cpu`]: user loads and stores, page faults and upcall delivery.
//! - [`sched`]: resuming a child after fork.
//!
//! ## Example
//!
//! ```
//! use kern::MachineBuilder;
//! use ulib::{Process, syscall::ForkResult};
//!
//! let machine = MachineBuilder::new().quiet(true).build();
//! let mut parent = Process::new(machine.spawn().unwrap());
//! let ForkResult::Parent(child) = parent.fork().unwrap() else { unreachable!() };
//! let child = kern::sched::resume_forked(&parent, child).unwrap();
//! assert_eq!(child.thisenv(), child.kernel().id());
//! ```

pub mod cpu;
pub mod env;
pub mod handle;
pub mod machine;
pub mod mm;
pub mod pgdir;
pub mod sched;

pub use handle::{EnvHandle, UPCALL_ENTRY};
pub use machine::{EnvKilled, Machine, MachineBuilder};
pub use mm::{track_alloc, validate_alloc};
