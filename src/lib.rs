pub mod types;
pub mod error;
pub mod object_reader;
pub mod section_cache;
pub mod decoder;
pub mod model;
pub mod indexes;
pub mod disasm;
pub mod patch;
pub mod session;

pub use error::{Error, Result};
pub use session::{Session, SessionOptions};
pub use types::{Bitness, Vma};
