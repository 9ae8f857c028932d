// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tree-style summaries of an imaging run, and warnings queued up while
//! arguments are parsed.

#[cfg(test)]
mod tests;

use std::{borrow::Cow, sync::Mutex};

lazy_static::lazy_static! {
    static ref QUEUED_WARNINGS: Mutex<Vec<String>> = Mutex::new(vec![]);
}

/// Prefix every line of every block with a box-drawing character. The first
/// line of a block opens a branch; the branch is closed only when it is a
/// single-line final block.
fn tree_lines<S: AsRef<str>>(blocks: &[Vec<S>]) -> Vec<String> {
    let mut lines = vec![];
    for (i_block, block) in blocks.iter().enumerate() {
        let closes = i_block + 1 == blocks.len() && block.len() == 1;
        for (i_line, line) in block.iter().enumerate() {
            let symbol = match i_line {
                0 if closes => '└',
                0 => '├',
                _ => '│',
            };
            lines.push(format!("{symbol} {}", line.as_ref()));
        }
    }
    lines
}

/// Collects lines under a bold title, then logs them at the "info" level.
pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Vec<Cow<'static, str>>>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Vec<Cow<'static, str>>) {
        self.blocks.push(block);
    }

    pub(crate) fn display(self) {
        log::info!("{}", console::style(&self.title).bold());
        for line in tree_lines(&self.blocks) {
            log::info!("{line}");
        }
        log::info!("");
    }
}

fn with_queue<T>(f: impl FnOnce(&mut Vec<String>) -> T) -> T {
    // The queue is still usable if another thread panicked while holding it.
    let mut queue = match QUEUED_WARNINGS.lock() {
        Ok(q) => q,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut queue)
}

/// Queue a warning to be shown by [`display_warnings`].
pub(crate) trait Warn {
    fn warn(self);
}

impl Warn for &str {
    fn warn(self) {
        with_queue(|q| q.push(self.to_string()));
    }
}

impl Warn for String {
    fn warn(self) {
        with_queue(|q| q.push(self));
    }
}

/// Log and forget any warnings queued while arguments were parsed.
pub fn display_warnings() {
    let warnings = with_queue(std::mem::take);
    if warnings.is_empty() {
        return;
    }
    let blocks: Vec<Vec<String>> = warnings.into_iter().map(|w| vec![w]).collect();
    log::warn!("{}", console::style("Warnings").bold());
    for line in tree_lines(&blocks) {
        log::warn!("{line}");
    }
    log::warn!("");
}
