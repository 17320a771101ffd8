use std::process;

use yangmods::ui::output;

fn main() {
    if let Err(err) = yangmods::cli::run() {
        output::error(format!("{:#}", err));
        process::exit(1);
    }
}
