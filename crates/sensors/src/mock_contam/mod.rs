pub mod generator;

pub use generator::{generate, sample_type_at, unix_now_secs};
