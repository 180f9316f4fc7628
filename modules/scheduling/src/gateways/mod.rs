pub mod local;

pub use local::SchedulingLocalClient;
