//! Hash-game rooms: round lifecycle, bet acceptance, settlement and the
//! manager that runs one room per variant and stake tier.

pub mod manager;
pub mod registry;
pub mod room;
pub mod settlement;
pub mod types;

pub use manager::{Game, GameManager};
pub use registry::{default_room_factory, RoomFactory, StrategyRegistry};
pub use room::{GameRoom, RoomContext};
pub use types::*;
