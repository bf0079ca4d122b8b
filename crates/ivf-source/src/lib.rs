pub mod ivf;
pub mod source;

pub use ivf::{IvfError, IvfFrame, IvfHeader};
pub use source::IvfSource;
