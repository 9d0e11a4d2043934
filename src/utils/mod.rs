//! Utility functions and types

pub mod data_loader;
pub mod parallel;
pub mod persist;

pub use data_loader::{DataLoader, DataSaver, column_names, column_values, frame_to_array, observed_values};
pub use parallel::{build_pool, ordered_map};
pub use persist::{copy_atomic, load_json, save_json, write_atomic};
