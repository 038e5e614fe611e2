use std::process::ExitCode;

use clap::Parser;

use lessonscan_lib::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        lessonscan_lib::init_logging(&["lessonscan=debug", "lessonscan_core=debug"]);
    } else {
        lessonscan_lib::init_logging(&["lessonscan=info", "lessonscan_core=info"]);
    }

    match lessonscan_lib::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            // Machine-readable error on stderr, `{"code": ..., "message": ...}`
            match serde_json::to_string(&e) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", e),
            }
            ExitCode::FAILURE
        }
    }
}
