use clap::Parser;

fn main() {
    dbbake::logfmt::init();

    if let Err(error) = dbbake::cli::Cli::parse().run() {
        // Fatal conditions always leave through here: one CRITICAL line, non-zero exit.
        dbbake::logfmt::critical("dbbake", &error.to_string());
        std::process::exit(1);
    }
}
