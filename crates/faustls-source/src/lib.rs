mod file;
mod position;

pub use file::FileKind;
pub use position::apply_change;
pub use position::LineCol;
pub use position::LineIndex;
pub use position::PositionEncoding;
pub use position::PositionError;
