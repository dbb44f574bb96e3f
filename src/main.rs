fn main() {
    if let Err(error) = xbrl_lookup_lib::run() {
        eprintln!("error: {:#}", error);
        std::process::exit(xbrl_lookup_lib::exit_code(&error));
    }
}
