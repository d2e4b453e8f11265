//! Terminal front-end for the operator
//!
//! Implements the library's [`Oracle`] and [`CollectionControl`] with line
//! prompts. End of input counts as abort/cancel so a closed terminal never
//! leaves a search waiting forever.

use can_search_core::{
    Answer, CaptureSession, CollectionControl, Frame, MinimizationAction, Oracle,
};
use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Line based operator console over any reader/writer pair
pub struct Console<R, W> {
    input: R,
    output: W,
    bell: bool,
}

impl Console<io::StdinLock<'static>, io::Stderr> {
    /// Console on the process terminal; prompts go to stderr
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            bell: true,
        }
    }

    /// Builder method: ring the terminal bell before each question
    pub fn with_bell(mut self, enabled: bool) -> Self {
        self.bell = enabled;
        self
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.output
    }

    /// Ask until one of `choices` is typed; `None` on end of input
    fn ask(&mut self, question: &str, choices: &[char]) -> Option<char> {
        loop {
            let _ = write!(self.output, "{} ", question);
            let _ = self.output.flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    log::error!("Failed to read operator input: {}", e);
                    return None;
                }
            }

            let choice = line.trim().chars().next().map(|c| c.to_ascii_lowercase());
            match choice {
                Some(c) if choices.contains(&c) => return Some(c),
                _ => {
                    let _ = writeln!(self.output, "Please answer one of {:?}", choices);
                }
            }
        }
    }

    fn wait_for_enter(&mut self) {
        let mut line = String::new();
        if let Err(e) = self.input.read_line(&mut line) {
            log::error!("Failed to read operator input: {}", e);
        }
    }
}

impl<R: BufRead, W: Write> Oracle for Console<R, W> {
    fn effect_occurred(&mut self, chunk: &[Frame]) -> Answer {
        let question = format!(
            "Sent {} frame(s). Did the effect occur? [y]es/[n]o/[a]bort:",
            chunk.len()
        );
        match self.ask(&question, &['y', 'n', 'a']) {
            Some('y') => Answer::Yes,
            Some('n') => Answer::No,
            _ => Answer::Abort,
        }
    }

    fn minimization_action(&mut self, last_working: &[Frame]) -> MinimizationAction {
        let question = format!(
            "No chunk worked. Last working chunk has {} frame(s). [r]etry/re[t]est/[c]ancel:",
            last_working.len()
        );
        match self.ask(&question, &['r', 't', 'c']) {
            Some('r') => MinimizationAction::Retry,
            Some('t') => MinimizationAction::ReTest,
            _ => MinimizationAction::Cancel,
        }
    }

    fn transition_cue(&mut self) {
        if self.bell {
            let _ = write!(self.output, "\x07");
            let _ = self.output.flush();
        }
    }
}

impl<R: BufRead, W: Write> CollectionControl for Console<R, W> {
    fn noise_progress(&mut self, elapsed: Duration, total: Duration, captured: usize) -> bool {
        let _ = write!(
            self.output,
            "\rCollecting noise: {}s of {}s, {} frame(s)",
            elapsed.as_secs(),
            total.as_secs(),
            captured
        );
        if elapsed >= total {
            let _ = writeln!(self.output);
        }
        let _ = self.output.flush();
        true
    }

    fn close_sample(&mut self, index: usize, total: usize, session: &CaptureSession) {
        let _ = writeln!(
            self.output,
            "Recording sample {}/{}. Trigger the effect, then press Enter.",
            index, total
        );
        let _ = self.output.flush();
        self.wait_for_enter();
        let _ = writeln!(self.output, "Sample {} captured {} frame(s)", index, session.frames_so_far());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_effect_answers() {
        let mut console = console("y\nN\nmaybe\na\n");
        assert_eq!(console.effect_occurred(&[]), Answer::Yes);
        assert_eq!(console.effect_occurred(&[]), Answer::No);
        // Unknown input is asked again
        assert_eq!(console.effect_occurred(&[]), Answer::Abort);

        let output = String::from_utf8(console.into_output()).unwrap();
        assert!(output.contains("Please answer"));
    }

    #[test]
    fn test_end_of_input_stops() {
        let mut console = console("");
        assert_eq!(console.effect_occurred(&[]), Answer::Abort);
        assert_eq!(console.minimization_action(&[]), MinimizationAction::Cancel);
    }

    #[test]
    fn test_minimization_actions() {
        let mut console = console("r\nt\nc\n");
        assert_eq!(console.minimization_action(&[]), MinimizationAction::Retry);
        assert_eq!(console.minimization_action(&[]), MinimizationAction::ReTest);
        assert_eq!(console.minimization_action(&[]), MinimizationAction::Cancel);
    }

    #[test]
    fn test_bell_cue() {
        let mut console = console("");
        console.transition_cue();
        assert_eq!(console.into_output(), b"\x07".to_vec());

        let mut quiet = self::console("").with_bell(false);
        quiet.transition_cue();
        assert!(quiet.into_output().is_empty());
    }
}
