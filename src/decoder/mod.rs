pub mod algo;
pub mod builder;
pub mod grouper;
pub mod ingest;
pub mod processing;
pub mod types;

pub use self::builder::*;
pub use self::grouper::*;
pub use self::ingest::*;
pub use self::processing::*;
pub use self::types::*;
