use log::error;
use registry_gate::config::{get_config, Command};
use registry_gate::registry_gate::{describe_schema, RegistryGate, RegistryGateError};
use registry_gate::utils::initialize_logger;
use serde::Serialize;
use std::process::ExitCode;

extern crate log;

#[tokio::main]
async fn main() -> ExitCode {
    let config = get_config();
    initialize_logger(config.log_level);

    let Some(command) = config.command.clone() else {
        error!("No command given, run with --help to list them");
        return ExitCode::FAILURE;
    };

    if let Command::Schema(args) = &command {
        return print(&describe_schema(args));
    }

    let gate = match RegistryGate::new(config.clone()) {
        Ok(gate) => gate,
        Err(e) => {
            error!("Unable to initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&gate, command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(gate: &RegistryGate, command: Command) -> Result<ExitCode, RegistryGateError> {
    match command {
        Command::Schema(args) => Ok(print(&describe_schema(&args))),
        Command::Validate(args) => {
            let errors = gate.validate(&args)?;
            let code = print(&errors);
            Ok(if errors.is_empty() {
                code
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Test(args) => {
            let result = gate.test(&args).await?;
            println!("{}", result.status);
            match result.error_detail {
                Some(detail) => {
                    error!("{}", detail);
                    Ok(ExitCode::FAILURE)
                }
                None => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Create(args) => {
            let created = gate.create(&args).await?;
            println!("{}", created.id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Revalidate { configuration_id } => {
            gate.revalidate(&configuration_id).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Unable to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}
