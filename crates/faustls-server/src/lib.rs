mod ext;
pub mod logging;
mod session;

pub use ext::negotiate_position_encoding;
pub use ext::PositionEncodingExt;
pub use ext::PositionEncodingKindExt;
pub use ext::PositionExt;
pub use ext::UriExt;
pub use session::Session;
