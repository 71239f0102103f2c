pub mod errors;
pub mod split;
pub mod tsv;

pub use errors::ParserError;
pub use split::{split_day, SplitReport};
pub use tsv::{convert_tsv_file, parse_tsv_reader, ConversionReport, DEFAULT_BATCH_ROWS};
