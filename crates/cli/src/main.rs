fn main() {
    if let Err(e) = autoroute_cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
