pub mod client;
pub mod config;
pub mod export;
pub mod init_tracing;
pub mod payload;
pub mod response;
pub mod roster;
pub mod settings;
pub mod state;
mod time_trace;

pub use payload::{normalize, AttendanceRecord, ScanPayload};
pub use response::{summarize, ScanResponse};
pub use roster::{count_for_day, AttendanceSummary};
