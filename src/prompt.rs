//! This module implements prompting.

use libc::{tcgetattr, tcsetattr, termios, ECHO, ECHOE, ICANON, STDIN_FILENO, TCSANOW, VMIN};
use std::io;
use std::io::{BufRead, Write};
use std::mem::MaybeUninit;

/// Show a prompt. This function returns when a newline is received.
///
/// Arguments:
/// - `prompt` is the prompt's text.
/// - `hidden` tells whether the input is hidden.
///
/// Returns `None` when the input stream is closed.
pub fn prompt(prompt: &str, hidden: bool) -> Option<String> {
    // Saving termios state
    let saved_termios = unsafe {
        let mut t: termios = MaybeUninit::zeroed().assume_init();
        tcgetattr(STDIN_FILENO, &mut t);
        t
    };
    if hidden {
        // Setting temporary termios
        let mut termios = saved_termios;
        termios.c_lflag &= !(ICANON | ECHO | ECHOE);
        termios.c_cc[VMIN] = 1;
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &termios);
        }
    }

    print!("{prompt}");
    let _ = io::stdout().flush();

    let input = io::stdin().lock().lines().next();

    if hidden {
        println!();
        // Restoring termios state
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &saved_termios);
        }
    }
    Some(input?.unwrap_or_default())
}
