use dbgate::{policy, Gate, GateConfig, GateError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

fn main() -> ExitCode {
    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let root = args.get(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let config = match GateConfig::discover(&root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let gate = Gate::new(config);

    if let Err(e) = policy::install_process_hooks(&gate) {
        // Without a configuration source nothing else can run.
        eprintln!("{}", gate.render_failure(&e));
        return ExitCode::FAILURE;
    }

    info!("Checking database connection for {:?}", root);
    match gate.connection() {
        Ok(_) => {
            println!("Database connection successful!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let notice = gate.render_failure(&e);
            match e {
                // Already filtered by run mode; name the key or point at the log.
                GateError::ConfigurationMissing(_) | GateError::ConnectionFailure { .. } => {
                    println!("{}", e)
                }
                _ => println!("{}", notice),
            }
            ExitCode::FAILURE
        }
    }
}
