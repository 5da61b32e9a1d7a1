use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let matches = cdconf_cli::cli().get_matches();
    init_tracing(matches.get_flag("json"));

    let mut stdout = std::io::stdout().lock();
    match cdconf_cli::execute(&matches, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(cdconf_cli::exit_code(&e))
        }
    }
}
