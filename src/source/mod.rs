pub mod reader;
pub mod tail;

pub use reader::{FileReader, SourceError};
pub use tail::TailWatcher;
