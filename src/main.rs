use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use dirauth::{Authenticator, Config};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;

const EXIT_REJECTED: i32 = 1;
const EXIT_BACKEND: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("dirauth")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Authenticate a user against an LDAP directory")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("dirauth.yml"),
        )
        .arg(
            Arg::new("generate-config")
                .short('g')
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .conflicts_with_all(["config", "user"]),
        )
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .value_name("NAME")
                .help("User name to authenticate")
                .required_unless_present("generate-config"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .value_name("PASSWORD")
                .help("Password; read from stdin when omitted"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .help("Enable verbose logging")
                .action(clap::ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .help("Suppress all output except errors")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .get_matches();

    if let Some(config_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(config_path)?;
        return Ok(());
    }

    let config_path = matches
        .get_one::<String>("config")
        .ok_or_else(|| anyhow!("No configuration file given"))?;
    let config = Config::load_from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let guard = setup_logging(&config, &matches)?;
    info!("Loaded configuration from {}", config_path);

    let user = matches
        .get_one::<String>("user")
        .ok_or_else(|| anyhow!("--user is required"))?;
    let password = match matches.get_one::<String>("password") {
        Some(password) => password.clone(),
        None => read_password()?,
    };

    let mut authenticator = config.directory.authenticator(user, &password)?;

    let code = match authenticator.authenticate().await {
        Ok(()) => {
            println!("authenticated {}", user);
            for (name, values) in authenticator.post_auth_attributes() {
                for value in values {
                    println!("{}: {}", name, value);
                }
            }
            0
        }
        Err(e) if e.is_backend_error() => {
            error!("Directory unavailable: {}", e);
            eprintln!("error: {}", e);
            EXIT_BACKEND
        }
        Err(e) => {
            eprintln!("authentication failed: {}", e);
            EXIT_REJECTED
        }
    };

    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

fn generate_default_config(path: &str) -> Result<()> {
    let config = Config::default();
    config.save_to_file(path)?;

    println!("Generated default configuration file: {}", path);
    println!("Edit this file to point at your directory servers.");

    Ok(())
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn setup_logging(config: &Config, matches: &ArgMatches) -> Result<Option<WorkerGuard>> {
    let log_level = if matches.get_flag("quiet") {
        Level::ERROR
    } else {
        match matches.get_count("verbose") {
            0 => match config.logging.level.as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            },
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let (file_writer, guard) = match &config.logging.file {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid log file path: {}", file))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.logging.console.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(log_level))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
