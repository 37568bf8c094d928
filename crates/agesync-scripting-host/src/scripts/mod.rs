pub mod combo_lock;
pub mod subworld_gate;

pub use combo_lock::ComboLock;
pub use subworld_gate::{AvatarLocation, SubworldGate};
