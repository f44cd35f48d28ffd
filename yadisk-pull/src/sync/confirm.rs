use std::io::{self, BufRead, Write};

use super::model::{Change, Op};

/// Operator gate between resolution and apply.
pub trait Confirm: Send + Sync {
    fn confirm(&self, changes: &[Change]) -> bool;
}

/// Approves every change list without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _changes: &[Change]) -> bool {
        true
    }
}

/// Prints the change list to stdout and reads a y/N answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, changes: &[Change]) -> bool {
        let stdin = io::stdin();
        let stdout = io::stdout();
        prompt(changes, &mut stdin.lock(), &mut stdout.lock()).unwrap_or(false)
    }
}

pub fn describe(change: &Change) -> String {
    let marker = match change.op() {
        Op::Add => '+',
        Op::Mod => 'M',
        Op::Delete => '-',
    };
    format!("{marker} {}", change.path())
}

fn prompt(
    changes: &[Change],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    for change in changes {
        writeln!(output, "{}", describe(change))?;
    }
    write!(output, "Apply {} change(s)? [y/N] ", changes.len())?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
