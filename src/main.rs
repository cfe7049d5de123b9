fn main() {
    if let Err(err) = sheet_analytics::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
