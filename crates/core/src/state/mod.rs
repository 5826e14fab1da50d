pub mod design_state;
pub mod history;

pub use design_state::{
    DesignSnapshot, DesignState, SharedDesignState, StateEvent, StateEventKind,
    DEFAULT_LOCK_TTL_SECS,
};
pub use history::{ChangeTrail, DEFAULT_CAPACITY};
