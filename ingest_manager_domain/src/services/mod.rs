//! Stateless domain services.

mod change_decider;

pub use change_decider::ChangeDecider;
