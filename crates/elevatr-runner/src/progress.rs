use elevatr_dem::DownloadProgress;
use indicatif::{ProgressBar, ProgressStyle};

/// Tile download bar; hidden in quiet mode.
pub fn bar(quiet: bool) -> ProgressBar {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_prefix("Fetching tiles");
    pb.set_style(
        ProgressStyle::with_template("{prefix} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Progress callback driving `pb`.
pub fn tracker(pb: ProgressBar) -> impl Fn(&DownloadProgress) + Send + Sync + 'static {
    move |progress: &DownloadProgress| {
        pb.set_length(progress.total as u64);
        pb.set_position(progress.completed as u64);
        let source = if progress.cached { "cached" } else { "downloaded" };
        pb.set_message(format!("{} {}", progress.coord, source));
    }
}
