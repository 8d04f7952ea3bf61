use owo_colors::OwoColorize;

use crate::util::human_bytes;

/// Running totals for one invocation. Mutated sequentially by the walk and
/// the transfer unit; printed once on exit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub files_downloaded: u64,
    pub files_uploaded: u64,
    pub dirs_created: u64,
    pub bytes_transferred: u64,
    pub errors: u64,
}

impl Statistics {
    pub fn print_summary(&self, elapsed_secs: f64) {
        let transferred = human_bytes(self.bytes_transferred);
        let rate = if elapsed_secs > 0.0 {
            self.bytes_transferred as f64 / 1024.0 / 1024.0 / elapsed_secs
        } else {
            0.0
        };
        println!(
            "{} downloaded: {} | uploaded: {} | dirs created: {} | {} in {:.2}s ({:.2} MB/s) | errors: {}",
            "Summary".green(),
            self.files_downloaded,
            self.files_uploaded,
            self.dirs_created,
            transferred,
            elapsed_secs,
            rate,
            self.errors,
        );
    }
}
