mod blocks;
mod chunk;
mod entity;
mod player;
mod storage;
mod time;

pub use blocks::*;
pub use chunk::*;
pub use entity::*;
pub use player::*;
pub use storage::*;
pub use time::*;
