pub mod composer;
pub mod persona;
pub mod selector;

pub use composer::compose;
pub use persona::{Persona, PersonaKind, ResponseLength, RuntimePatch, SessionOverrides};
pub use selector::{Selection, pick_other, select};
