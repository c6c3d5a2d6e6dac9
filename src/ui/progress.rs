//! Progress indicators with CI fallback

use super::context::UiContext;
use super::output;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Stage progress for a pipeline build.
///
/// Shows an indicatif bar over the stages in interactive mode, one line
/// per stage otherwise.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
    total: usize,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, total: usize) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total as u64);
            // Template is static; a parse failure only loses styling
            if let Ok(bar_style) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} {bar:20.cyan/dim} {pos}/{len} {msg}  {elapsed:.dim}",
            ) {
                bar.set_style(
                    bar_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar, total }
    }

    /// A stage is being looked up
    pub fn start(&self, index: usize, name: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.set_position(index as u64);
                bar.set_message(name.to_string());
            }
            None => println!("[{}/{}] {}", index + 1, self.total, name),
        }
    }

    /// A stage finished, either restored or built
    pub fn finish_stage(&self, ctx: &UiContext, name: &str, detail: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.println(format!(
                    "  {} {} ({})",
                    style("✓").green(),
                    name,
                    style(detail).dim()
                ));
                bar.inc(1);
            }
            None => output::step_ok_detail(ctx, name, detail),
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
