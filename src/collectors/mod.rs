pub mod gpu;
pub mod models;
pub mod system;
