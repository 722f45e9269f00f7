use std::{env, fs, process};

use sqlitesync::{
    Environments, Introspector, Schema, SyncConfig, SyncEngine, SyncError, SyncRequest,
    client::CommandLineConfig, identify_associations, normalize,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match config.command.as_str() {
        "resolve" => run_resolve(&config),
        "normalize" => run_normalize(&config),
        "sync" => run_sync(&config),
        "help" => {
            println!("{}", CommandLineConfig::help());
            return;
        }
        other => {
            eprintln!("error: unknown command {other}");
            process::exit(2);
        }
    };
    match outcome {
        Ok(output) => println!("{output}"),
        Err(err @ SyncError::Configuration(_)) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
        Err(err) => {
            eprintln!("command failed: {err}");
            process::exit(1);
        }
    }
}

fn load_schema(config: &CommandLineConfig) -> Result<Schema, SyncError> {
    let path = config.require(&config.schema, "--schema")?;
    let json = fs::read_to_string(path)
        .map_err(|e| SyncError::configuration(format!("cannot read {path}: {e}")))?;
    Schema::from_json_str(&json)
}

fn load_environments(config: &CommandLineConfig) -> Result<Environments, SyncError> {
    let path = config.require(&config.config, "--config")?;
    Environments::from_config(&SyncConfig::load(path)?)
}

fn run_resolve(config: &CommandLineConfig) -> Result<String, SyncError> {
    let model = config.require(&config.model, "--model")?;
    let schema = load_schema(config)?;
    let environments = load_environments(config)?;
    let store = match &config.env {
        Some(name) => environments.store(name)?,
        None => environments.current()?,
    };
    let introspector = Introspector::new(&schema, store);
    let resolved = identify_associations(&introspector, model, &config.hints())?;
    Ok(resolved.map_or(serde_json::Value::Null, |d| d.to_json()).to_string())
}

fn run_normalize(config: &CommandLineConfig) -> Result<String, SyncError> {
    let input = config.require(&config.input, "--input")?;
    let descriptor = sqlitesync::Descriptor::from_json_str(input)?;
    let paths = normalize(&descriptor)?;
    Ok(sqlitesync::normalize::to_json(&paths).to_string())
}

fn run_sync(config: &CommandLineConfig) -> Result<String, SyncError> {
    let model = config.require(&config.model, "--model")?;
    let source = config.require(&config.from, "--from")?;
    let mut request = SyncRequest::new(model).associations(config.descriptor()?);
    request.id = config.id;
    request.filter = config.filter();
    request.selector()?;

    let schema = load_schema(config)?;
    let environments = load_environments(config)?;
    let report = SyncEngine::new(&environments, &schema, source).run(request)?;

    let mut lines = vec![format!("identified={}", report.identified)];
    for (model, count) in &report.written {
        lines.push(format!("{model}={count}"));
    }
    lines.push(format!("join_rows={}", report.join_rows));
    Ok(lines.join("\n"))
}
