//! C source access
//!
//! - [`lexer`]: tolerant tokenizer shared by the extractor and the trackers
//! - [`files`]: cached line reader with stale-path recovery
//! - [`extractor`]: cuts whole functions out of files for stack frames
//!
//! Nothing here understands C beyond tokens and brace balance. There is no
//! preprocessor and no type information.

pub mod extractor;
pub mod files;
pub mod lexer;

pub use extractor::{ExtractedFunction, SourceContextExtractor};
pub use files::SourceFiles;
