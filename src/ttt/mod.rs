pub mod ttt_game;
mod ttt_test;
