pub mod config;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod reader;
pub mod replace;
pub mod results;
pub mod sink;
pub mod worker;

pub use config::{JobConfig, LineLimit, OverflowPolicy, Parallelism, Settings};
pub use dispatch::{run, Dispatcher};
pub use errors::{SedError, SedResult};
pub use replace::{replace, replace_ci, Replacer};
pub use results::{BatchResult, FileOutcome, FileStatus};
pub use sink::{OutputSink, SharedBuffer};
