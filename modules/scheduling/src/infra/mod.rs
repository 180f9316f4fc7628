pub mod events;
pub mod locks;
pub mod storage;
