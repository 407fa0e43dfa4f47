use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Mutex;

/// Observer for reporting incremental progress while streaming genotype blocks.
pub trait BetaProgressObserver {
    fn on_start(&self, total_loci: Option<usize>, block_size: usize) {
        let _ = (total_loci, block_size);
    }
    fn on_block(&self, processed_loci: usize, total_loci: Option<usize>) {
        let _ = (processed_loci, total_loci);
    }
    fn on_finish(&self, processed_loci: usize) {
        let _ = processed_loci;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl BetaProgressObserver for NoopProgress {}

/// Draws a progress bar on stderr. The bar is hidden when stderr is not a terminal.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_progress_bar(total_loci: Option<usize>) -> ProgressBar {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };

        let pb = ProgressBar::with_draw_target(total_loci.map(|n| n as u64), draw_target);
        let template = if total_loci.is_some() {
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} loci ({eta}) {msg}"
        } else {
            "> [{elapsed_precise}] {spinner} {pos} loci {msg}"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message("IBS beta accumulation");
        pb
    }
}

impl BetaProgressObserver for ConsoleProgress {
    fn on_start(&self, total_loci: Option<usize>, block_size: usize) {
        let pb = Self::create_progress_bar(total_loci);
        pb.set_message(format!("IBS beta accumulation (internal increment: {block_size})"));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(pb);
        }
    }

    fn on_block(&self, processed_loci: usize, total_loci: Option<usize>) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                if let Some(total) = total_loci {
                    pb.set_length(total as u64);
                }
                pb.set_position(processed_loci as u64);
            }
        }
    }

    fn on_finish(&self, processed_loci: usize) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.set_position(processed_loci as u64);
                pb.finish_with_message("Done.");
            }
        }
    }
}
