//! Scrambles or unscrambles one point given in decimal.
//!
//! ```text
//! ob fein 65536         # 1111384255
//! ob fynd 1111384255    # 65536
//! ```
//!
//! Build with: `cargo run --bin ob --features cli -- fein 65536`

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Exit status when the argument is not a non-negative decimal integer.
const CODE_ERROR_RETURNED: u8 = 3;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "ob", version, about = "Reversible scrambler for ship addresses")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scramble a point into its public form
    #[command(visible_alias = "scramble")]
    Fein {
        /// Point as a decimal integer
        #[arg(allow_hyphen_values = true)]
        point: String,
    },
    /// Recover the point behind a scrambled value
    #[command(visible_alias = "unscramble")]
    Fynd {
        /// Scrambled value as a decimal integer
        #[arg(allow_hyphen_values = true)]
        point: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = match &args.command {
        Command::Fein { point } => urbit_ob::fein_str(point),
        Command::Fynd { point } => urbit_ob::fynd_str(point),
    };

    match result {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(CODE_ERROR_RETURNED)
        }
    }
}
