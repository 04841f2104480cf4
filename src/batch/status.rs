// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Live batch status table.
//!
//! Every source of a batch owns one row of the table. Rows move through
//! `pending -> building -> queued -> pushing -> done | failed`. Rows, success and
//! failure counters, and the error list all live behind a single lock, so
//! readers never see a row and the counters disagree. The lock is only held
//! for in-memory updates and redrawing the row's progress line.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

/// Stage of a single batch item.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ItemStatus {
    Pending,
    Building,
    Queued,
    Pushing,
    Done,
    Failed,
}

impl ItemStatus {
    /// Item reached a final stage.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "·",
            Self::Building => "~",
            Self::Queued => "…",
            Self::Pushing => "^",
            Self::Done => "✓",
            Self::Failed => "✗",
        }
    }
}

impl Display for ItemStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Queued => "queued",
            Self::Pushing => "pushing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        fmt.write_str(label)
    }
}

/// One row of the status table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StatusRow {
    pub name: String,
    pub status: ItemStatus,
    pub detail: String,
}

#[derive(Debug, Default)]
struct BoardState {
    rows: Vec<StatusRow>,
    succeeded: usize,
    failed: usize,
    errors: Vec<(String, String)>,
}

/// Shared status table of a running batch.
#[derive(Debug)]
pub struct StatusBoard {
    state: Mutex<BoardState>,
    multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

impl StatusBoard {
    /// Construct new board with one pending row per name.
    ///
    /// Rows are drawn to the terminal only if `live` is set.
    ///
    /// # Errors
    ///
    /// - Return [`indicatif::style::TemplateError`] if the row style cannot
    ///   be built.
    pub fn new(
        names: impl IntoIterator<Item = impl Into<String>>,
        live: bool,
    ) -> Result<Self, indicatif::style::TemplateError> {
        let target = if live {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);
        let style = ProgressStyle::with_template("{spinner:.yellow} {prefix:<40.bold} {msg}")?
            .tick_chars("-\\|/ ");

        let rows = names
            .into_iter()
            .map(|name| StatusRow {
                name: name.into(),
                status: ItemStatus::Pending,
                detail: String::new(),
            })
            .collect::<Vec<_>>();
        let bars = rows
            .iter()
            .map(|row| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(row.name.clone());
                bar.set_message(ItemStatus::Pending.to_string());
                bar
            })
            .collect();

        Ok(Self {
            state: Mutex::new(BoardState {
                rows,
                ..Default::default()
            }),
            multi,
            bars,
        })
    }

    /// Move row into an intermediate stage.
    pub fn set(&self, index: usize, status: ItemStatus, detail: impl Into<String>) {
        let mut state = self.lock();
        let detail = detail.into();
        if let Some(row) = state.rows.get_mut(index) {
            row.status = status;
            row.detail = detail;
        }
        self.redraw(&state, index);
    }

    /// Replace display name of a row.
    pub fn rename(&self, index: usize, name: impl Into<String>) {
        let mut state = self.lock();
        let name = name.into();
        if let Some(bar) = self.bars.get(index) {
            bar.set_prefix(name.clone());
        }
        if let Some(row) = state.rows.get_mut(index) {
            row.name = name;
        }
    }

    /// Finish row successfully.
    pub fn succeed(&self, index: usize, detail: impl Into<String>) {
        let mut state = self.lock();
        let detail = detail.into();
        let Some(row) = state.rows.get_mut(index) else {
            return;
        };
        if row.status.is_final() {
            return;
        }

        row.status = ItemStatus::Done;
        row.detail = detail;
        state.succeeded += 1;
        self.redraw(&state, index);
        if let Some(bar) = self.bars.get(index) {
            bar.finish();
        }
    }

    /// Finish row with failure, recording its error.
    pub fn fail(&self, index: usize, message: impl Into<String>) {
        let mut state = self.lock();
        let message = message.into();
        let Some(row) = state.rows.get_mut(index) else {
            return;
        };
        if row.status.is_final() {
            return;
        }

        row.status = ItemStatus::Failed;
        row.detail = message.clone();
        let name = row.name.clone();
        state.failed += 1;
        state.errors.push((name, message));
        self.redraw(&state, index);
        if let Some(bar) = self.bars.get(index) {
            bar.finish();
        }
    }

    /// Fail every row still stuck in `status`.
    pub fn fail_stuck(&self, status: ItemStatus, message: &str) {
        let stuck = self
            .lock()
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status == status)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        for index in stuck {
            self.fail(index, message);
        }
    }

    /// Number of rows finished successfully.
    pub fn succeeded(&self) -> usize {
        self.lock().succeeded
    }

    /// Number of failures recorded.
    pub fn failed(&self) -> usize {
        self.lock().failed
    }

    /// Recorded errors as `(name, message)` pairs in recording order.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.lock().errors.clone()
    }

    pub fn rows(&self) -> Vec<StatusRow> {
        self.lock().rows.clone()
    }

    /// Render table as plain text.
    pub fn render_table(&self) -> String {
        let state = self.lock();
        let width = state
            .rows
            .iter()
            .map(|row| row.name.chars().count())
            .max()
            .unwrap_or(0)
            .max("DECK".len());

        let mut table = format!("  {:<width$}  {:<8}  DETAIL\n", "DECK", "STATUS");
        for row in &state.rows {
            table.push_str(&format!(
                "{} {:<width$}  {:<8}  {}\n",
                row.status.marker(),
                row.name,
                row.status.to_string(),
                row.detail
            ));
        }

        table
    }

    /// Stop drawing rows.
    pub fn finish(&self) {
        let _state = self.lock();
        for bar in &self.bars {
            if !bar.is_finished() {
                bar.finish();
            }
        }
        let _ = self.multi.clear();
    }

    /// Start animating rows that are in progress.
    pub fn tick(&self, interval: Duration) {
        for bar in &self.bars {
            bar.enable_steady_tick(interval);
        }
    }

    fn redraw(&self, state: &BoardState, index: usize) {
        if let (Some(bar), Some(row)) = (self.bars.get(index), state.rows.get(index)) {
            if row.detail.is_empty() {
                bar.set_message(row.status.to_string());
            } else {
                bar.set_message(format!("{}: {}", row.status, row.detail));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // INVARIANT: Board stays readable after a panicking push task.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_board_counts_final_transitions_once() -> anyhow::Result<()> {
        let board = StatusBoard::new(["a", "b", "c"], false)?;
        board.set(0, ItemStatus::Building, "");
        board.succeed(0, "built");
        board.succeed(0, "again");
        board.set(1, ItemStatus::Pushing, "");
        board.fail(1, "boom");
        board.fail(1, "boom again");

        assert_eq!(board.succeeded(), 1);
        assert_eq!(board.failed(), 1);
        assert_eq!(board.errors(), vec![("b".to_string(), "boom".to_string())]);
        assert_eq!(board.rows()[2].status, ItemStatus::Pending);

        Ok(())
    }

    #[test]
    fn status_board_fails_stuck_rows() -> anyhow::Result<()> {
        let board = StatusBoard::new(["a", "b", "c"], false)?;
        board.set(0, ItemStatus::Pushing, "");
        board.set(1, ItemStatus::Pushing, "");
        board.succeed(1, "pushed");
        board.set(2, ItemStatus::Queued, "");

        board.fail_stuck(ItemStatus::Queued, "push task aborted");
        board.fail_stuck(ItemStatus::Pushing, "push task aborted");
        assert_eq!(board.rows()[0].status, ItemStatus::Failed);
        assert_eq!(board.rows()[2].status, ItemStatus::Failed);
        assert_eq!(board.failed(), 2);

        Ok(())
    }

    #[test]
    fn render_table_lists_every_row() -> anyhow::Result<()> {
        let board = StatusBoard::new(["Spanish", "French::Verbs", "German"], false)?;
        board.succeed(0, "2 notes");
        board.fail(1, "bad toml");
        board.set(2, ItemStatus::Queued, "");

        let expect = concat!(
            "  DECK           STATUS    DETAIL\n",
            "✓ Spanish        done      2 notes\n",
            "✗ French::Verbs  failed    bad toml\n",
            "… German         queued    \n",
        );
        assert_eq!(board.render_table(), expect);

        Ok(())
    }
}
