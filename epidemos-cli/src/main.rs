//! Command line program for working with `epidemos` simulations.

#[macro_use]
extern crate log;

extern crate epidemos_core as epidemos;

pub mod cli;
pub mod init;

use colored::*;

fn main() {
    // Run the program based on user input
    match cli::start(cli::app().get_matches()) {
        Ok(_) => (),
        Err(e) => {
            println!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                println!("Caused by:\n{}", e.root_cause())
            }
        }
    }
}
