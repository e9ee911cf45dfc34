pub mod common;
mod common_test;
