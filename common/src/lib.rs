#[macro_use]
pub mod macros;
pub mod file_format;
pub mod key_index_vec;
pub mod log_setup;
pub mod serde_format;
pub mod shared;

pub use file_format::FileFormat;
pub use serde_format::{deserialize, serialize, SerdeFormatError, SerdeFormatResult};
pub use shared::Shared;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
