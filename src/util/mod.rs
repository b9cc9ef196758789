//! Small arithmetic helpers shared by the wrappers and adapters.

pub(crate) mod layout;
pub(crate) mod size;
