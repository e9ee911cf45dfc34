pub mod dispatcher;
pub mod pool;
pub mod samples;
pub mod simulator;
pub mod slot;
