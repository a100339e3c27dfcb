mod histogram;
mod table_stats;

pub use histogram::{IntHistogram, StringHistogram};
pub use table_stats::TableStats;

/// Default cost of reading one page
pub const IO_COST_PER_PAGE: usize = 1000;

/// Buckets per column histogram
pub const NUM_HIST_BINS: usize = 100;
