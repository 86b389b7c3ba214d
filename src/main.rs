fn main() {
    if let Err(err) = lazylms::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
