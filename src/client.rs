use serde_json::Value;

use crate::{
    descriptor::Descriptor,
    errors::SyncError,
    hint::{BasicHint, HintPolicy},
    store::Filter,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CommandLineConfig {
    pub command: String,
    pub config: Option<String>,
    pub schema: Option<String>,
    pub model: Option<String>,
    pub env: Option<String>,
    pub from: Option<String>,
    pub id: Option<i64>,
    pub filters: Vec<(String, Value)>,
    pub associations: Option<String>,
    pub input: Option<String>,
    pub deny: Vec<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut config = Self {
            command: String::from("help"),
            config: None,
            schema: None,
            model: None,
            env: None,
            from: None,
            id: None,
            filters: Vec::new(),
            associations: None,
            input: None,
            deny: Vec::new(),
        };
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .map(|v| v.to_string())
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match *arg {
                "--config" => config.config = Some(value("--config")?),
                "--schema" => config.schema = Some(value("--schema")?),
                "--model" => config.model = Some(value("--model")?),
                "--env" => config.env = Some(value("--env")?),
                "--from" => config.from = Some(value("--from")?),
                "--id" => {
                    let raw = value("--id")?;
                    let id = raw
                        .parse::<i64>()
                        .map_err(|_| format!("--id expects an integer, got {raw}"))?;
                    config.id = Some(id);
                }
                "--where" => {
                    let raw = value("--where")?;
                    config.filters.push(parse_condition(&raw)?);
                }
                "--associations" => config.associations = Some(value("--associations")?),
                "--input" => config.input = Some(value("--input")?),
                "--deny" => config.deny.push(value("--deny")?),
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                _ => {
                    config.command = arg.to_string();
                }
            }
        }
        Ok(config)
    }

    pub fn help() -> &'static str {
        "Usage: sqlitesync <command> [flags]\n\
         \n\
         Commands:\n\
         \x20 resolve    --config FILE --schema FILE --model MODEL [--env NAME] [--deny MODEL]...\n\
         \x20 normalize  --input JSON\n\
         \x20 sync       --config FILE --schema FILE --model MODEL --from NAME\n\
         \x20            (--id N | --where COLUMN=VALUE...) [--associations JSON]\n\
         \n\
         Set RUST_LOG to control log output (default: info).\n"
    }

    pub fn require<'a>(&self, value: &'a Option<String>, flag: &str) -> Result<&'a str, SyncError> {
        value
            .as_deref()
            .ok_or_else(|| SyncError::configuration(format!("{} requires {flag}", self.command)))
    }

    /// Root filter built from every `--where`, `None` when none were given.
    pub fn filter(&self) -> Option<Filter> {
        if self.filters.is_empty() {
            return None;
        }
        let filter = self
            .filters
            .iter()
            .fold(Filter::new(), |filter, (column, value)| {
                filter.eq(column.clone(), value.clone())
            });
        Some(filter)
    }

    /// Traversal descriptor from `--associations`; nothing beyond the roots when absent.
    pub fn descriptor(&self) -> Result<Descriptor, SyncError> {
        match &self.associations {
            Some(json) => Descriptor::from_json_str(json),
            None => Ok(Descriptor::default()),
        }
    }

    /// One deny hint per `--deny` target model.
    pub fn hints(&self) -> HintPolicy {
        self.deny
            .iter()
            .map(|model| BasicHint::deny().to_models([model.clone()]))
            .collect::<Vec<_>>()
            .into()
    }
}

fn parse_condition(raw: &str) -> Result<(String, Value), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("--where expects COLUMN=VALUE, got {raw}"))?;
    if column.trim().is_empty() {
        return Err(format!("--where expects COLUMN=VALUE, got {raw}"));
    }
    let value = match value.parse::<i64>() {
        Ok(number) => Value::from(number),
        Err(_) => Value::from(value),
    };
    Ok((column.trim().to_string(), value))
}
