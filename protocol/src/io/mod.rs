mod buf;

pub use buf::{ByteBuf, DEFAULT_MAX_UTF_LENGTH};
