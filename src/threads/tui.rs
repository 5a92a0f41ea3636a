/*
 * Copyright (c) 2022 McSib
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{error, warn};

const FALLBACK_TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar} {pos}/{len}";

/// A builder that helps in making a new [ProgressStyle] for use.
pub(crate) struct ProgressStyleBuilder {
    /// The [ProgressStyle] being built.
    progress_style: ProgressStyle,
}

impl ProgressStyleBuilder {
    /// Starts from the default spinner style.
    pub(crate) fn spinner() -> Self {
        Self {
            progress_style: ProgressStyle::default_spinner(),
        }
    }

    /// Sets the template of the progress style.
    ///
    /// A template indicatif rejects falls back to a plain bar.
    pub(crate) fn template(mut self, msg_template: &str) -> Self {
        match self.progress_style.clone().template(msg_template) {
            Ok(style) => self.progress_style = style,
            Err(err) => {
                warn!("Template error with '{}': {}. Using fallback template.", msg_template, err);
                match self.progress_style.clone().template(FALLBACK_TEMPLATE) {
                    Ok(style) => self.progress_style = style,
                    Err(e) => {
                        error!("Fallback template also failed: {}. Using default bar.", e);
                        self.progress_style = ProgressStyle::default_bar();
                    }
                }
            }
        }
        self
    }

    /// Sets the progress style chars.
    pub(crate) fn progress_chars(mut self, chars: &str) -> Self {
        self.progress_style = self.progress_style.progress_chars(chars);
        self
    }

    pub(crate) fn build(self) -> ProgressStyle {
        self.progress_style
    }
}

impl Default for ProgressStyleBuilder {
    fn default() -> Self {
        Self {
            progress_style: ProgressStyle::default_bar(),
        }
    }
}

/// A builder that helps in initializing and configuring a new [ProgressBar] for use.
pub(crate) struct ProgressBarBuilder {
    progress_bar: ProgressBar,
}

impl ProgressBarBuilder {
    /// A bar of `len` steps, or a spinner when `len` is `None`.
    pub(crate) fn new(len: Option<u64>) -> Self {
        let progress_bar = match len {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        Self { progress_bar }
    }

    pub(crate) fn style(self, progress_style: ProgressStyle) -> Self {
        self.progress_bar.set_style(progress_style);
        self
    }

    /// Hides the bar entirely when `visible` is false.
    pub(crate) fn visible(self, visible: bool) -> Self {
        if !visible {
            self.progress_bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        self
    }

    pub(crate) fn steady_tick(self, duration: Duration) -> Self {
        if !self.progress_bar.is_hidden() {
            self.progress_bar.enable_steady_tick(duration);
        }
        self
    }

    pub(crate) fn build(self) -> ProgressBar {
        self.progress_bar
    }
}

/// Spinner showing the running count of collected media.
pub(crate) fn collection_spinner(visible: bool) -> ProgressBar {
    let style = ProgressStyleBuilder::spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .build();
    let spinner = ProgressBarBuilder::new(None)
        .style(style)
        .visible(visible)
        .steady_tick(Duration::from_millis(120))
        .build();
    spinner.set_message("Collected 0 media");
    spinner
}

/// Bar tracking finished downloads out of `len`.
pub(crate) fn download_bar(len: u64, visible: bool) -> ProgressBar {
    let style = ProgressStyleBuilder::default()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .progress_chars("=>-")
        .build();
    ProgressBarBuilder::new(Some(len))
        .style(style)
        .visible(visible)
        .steady_tick(Duration::from_millis(200))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bars_track_position() {
        let bar = download_bar(10, false);
        assert!(bar.is_hidden());
        bar.inc(3);
        assert_eq!(bar.position(), 3);
        assert_eq!(bar.length(), Some(10));
    }

    #[test]
    fn test_bad_template_falls_back() {
        let style = ProgressStyleBuilder::default().template("{bar:not-a-width}").build();
        let bar = ProgressBarBuilder::new(Some(1)).style(style).visible(false).build();
        bar.finish();
        assert!(bar.is_finished());
    }
}
