mod filename;
mod patterns;

pub use filename::{NameParser, ParsedName, ParserConfig};
