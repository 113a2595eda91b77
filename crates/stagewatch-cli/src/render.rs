//! Transcript rendering
//!
//! Prints each new stage event as it lands and a progress strip whenever the
//! current stage moves. Works from snapshots only, so it never holds on to
//! session state between updates.

use std::io::{self, Write};

use crossterm::style::{StyledContent, Stylize};
use stagewatch_core::{
    ProgressMark, SessionId, SessionSnapshot, SessionState, StageName, StageProgress,
};

/// Incremental renderer for one output stream
pub struct TranscriptRenderer<W: Write> {
    out: W,
    color: bool,
    /// Session the printed entries belong to
    session: Option<SessionId>,
    /// Log entries already printed for that session
    printed: usize,
    last_stage: Option<StageName>,
    finished: bool,
}

impl<W: Write> TranscriptRenderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            session: None,
            printed: 0,
            last_stage: None,
            finished: false,
        }
    }

    /// Render everything new in `snapshot`
    pub fn update(
        &mut self,
        snapshot: &SessionSnapshot,
        progress: &[StageProgress],
    ) -> io::Result<()> {
        if snapshot.session.is_none() {
            return Ok(());
        }
        if snapshot.session != self.session {
            self.begin(snapshot)?;
        }

        for event in snapshot.log.entries().iter().skip(self.printed) {
            let title = self.paint(event.stage.as_str().to_uppercase().bold());
            writeln!(self.out, "{}", title)?;
            let body = serde_json::to_string_pretty(&event.payload)
                .unwrap_or_else(|_| event.payload.to_string());
            for line in body.lines() {
                writeln!(self.out, "  {}", line)?;
            }
        }
        self.printed = snapshot.log.len();

        if snapshot.current_stage != self.last_stage {
            self.last_stage = snapshot.current_stage.clone();
            self.progress_strip(progress)?;
        }

        if !snapshot.loading && !self.finished {
            self.finished = true;
            self.status_line(snapshot)?;
        }
        self.out.flush()
    }

    fn begin(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        if self.session.is_some() && !self.finished {
            let note = self.paint("(superseded)".dim());
            writeln!(self.out, "{}", note)?;
        }
        self.session = snapshot.session;
        self.printed = 0;
        self.last_stage = None;
        self.finished = false;
        let marker = self.paint("?".cyan().bold());
        let query = self.paint(snapshot.query.as_str().bold());
        writeln!(self.out, "{} {}", marker, query)
    }

    fn progress_strip(&mut self, progress: &[StageProgress]) -> io::Result<()> {
        let cells: Vec<String> = progress
            .iter()
            .map(|p| {
                let label = p.stage.as_str().to_uppercase();
                match p.mark {
                    ProgressMark::Completed => self.paint(format!("[{}]", label).blue().bold()),
                    ProgressMark::Upcoming => self.paint(format!("<{}>", label).yellow()),
                    ProgressMark::Idle => self.paint(format!(" {} ", label).dark_grey()),
                }
            })
            .collect();
        writeln!(self.out, "{}", cells.join(" "))
    }

    fn status_line(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        let line = match snapshot.state {
            Some(SessionState::ClosedDone) => self.paint("done".green().bold()),
            Some(SessionState::ClosedSuperseded) => return Ok(()),
            _ => self.paint(format!("stopped after {} stages", snapshot.log.len()).red()),
        };
        writeln!(self.out, "{}", line)?;
        if snapshot.rejected > 0 {
            let note =
                self.paint(format!("{} malformed events skipped", snapshot.rejected).yellow());
            writeln!(self.out, "{}", note)?;
        }
        Ok(())
    }

    fn paint<D: std::fmt::Display>(&self, content: StyledContent<D>) -> String {
        if self.color {
            content.to_string()
        } else {
            content.content().to_string()
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
