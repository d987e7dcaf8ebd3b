//! Operator confirmation prompts.

use std::io::{self, BufRead, Write};

use crate::error::{DeliveryError, DeliveryResult};

/// Asks the operator a yes/no question
pub trait ConfirmationPort: Send + Sync {
    fn confirm(&self, prompt: &str) -> DeliveryResult<bool>;
}

/// Prompts on stdout and reads answers from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

impl ConfirmationPort for TerminalConfirmation {
    fn confirm(&self, prompt: &str) -> DeliveryResult<bool> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        ask(&mut stdin.lock(), &mut stdout.lock(), prompt)
    }
}

/// Repeat the question until the answer is a recognizable yes or no
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> DeliveryResult<bool> {
    write!(output, "{prompt}")?;
    output.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(DeliveryError::IoError(
                "Input closed before the question was answered".to_string(),
            ));
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "ye" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {
                write!(output, "Please respond with 'yes' or 'no': ")?;
                output.flush()?;
            }
        }
    }
}
