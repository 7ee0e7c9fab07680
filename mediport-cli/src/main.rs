//! The `mediport` command line client.
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    mediport_cli::cli::execute()
}
