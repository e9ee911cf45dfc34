pub mod coach;
pub mod error;
pub mod game;
pub mod net;
pub mod selfplay;
pub mod ttt;
pub mod util;
