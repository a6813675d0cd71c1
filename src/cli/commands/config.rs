//! hs config - Show the effective configuration

use clap::Args;

use crate::app::AppContext;
use crate::cli::output;
use crate::config::Config;
use crate::error::{Result, SearchError};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Dotted key to print (e.g. fusion.rrf_k); omit for the whole config
    pub key: Option<String>,
}

pub fn run(ctx: &AppContext, args: &ConfigArgs) -> Result<()> {
    match args.key.as_deref() {
        Some(key) => get_key(ctx, key),
        None => emit_config(ctx),
    }
}

fn emit_config(ctx: &AppContext) -> Result<()> {
    if ctx.json {
        return output::emit_json(&output::envelope(&ctx.config));
    }

    if let Some(ref path) = ctx.config_path {
        println!("# {}", path.display());
    }
    println!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn get_key(ctx: &AppContext, key: &str) -> Result<()> {
    let value = config_value_at(&ctx.config, key)?;
    if ctx.json {
        return output::emit_json(&value);
    }
    println!("{}", format_value(&value));
    Ok(())
}

fn config_value_at(config: &Config, key: &str) -> Result<toml::Value> {
    let doc = toml::Value::try_from(config)
        .map_err(|err| SearchError::Config(format!("serialize config: {err}")))?;
    let mut current = &doc;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| SearchError::Config(format!("unknown key: {key}")))?;
    }
    Ok(current.clone())
}

fn format_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
