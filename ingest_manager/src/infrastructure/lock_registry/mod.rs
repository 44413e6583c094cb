//! Realizations of the domain's `UriLockRegistry` port.

mod in_process;

pub use in_process::InProcessLockRegistry;
