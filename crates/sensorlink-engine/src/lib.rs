pub mod dispatcher;
pub mod image_assembler;
pub mod reaper;
pub mod source_table;
pub mod supervisor;

pub use dispatcher::Dispatcher;
pub use image_assembler::ImageAssembler;
pub use reaper::{reap_interval, reap_once};
pub use source_table::{SourceState, SourceTable, TransferStats};
pub use supervisor::{Backoff, run_engine_once, supervise};
