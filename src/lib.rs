//! Command line driver for the notebook processors in [nbproc].

pub mod config;
pub mod run;

use console::style;

/// Prints an error and its causes to stderr. Returns the value on success.
pub fn print_err<T>(res: anyhow::Result<T>) -> Option<T> {
    match res {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            e.chain()
                .skip(1)
                .for_each(|cause| eprintln!(" {} {}", style("caused by:").bold(), cause));
            None
        }
    }
}
