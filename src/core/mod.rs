//! Store-agnostic leave and gate domain: credential codec, lifecycle
//! state machine, gate scan validator and the presence projection.
//! Nothing in here touches HTTP or SQL; collaborators come in through
//! the traits in [`store`] and [`clock`].

pub mod clock;
pub mod credential;
pub mod error;
pub mod gate;
pub mod lifecycle;
#[cfg(test)]
pub mod memory;
pub mod presence;
pub mod routing;
pub mod store;
