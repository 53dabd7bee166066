//! Model catalog commands for chatrelay
//!
//! Lists the static model catalog as a table or as JSON. The catalog is
//! compiled in, so no provider is contacted.

use crate::config::Config;
use crate::error::{ChatRelayError, Result};
use crate::providers::{catalog, Provider, ProviderModel};
use prettytable::{row, Table};

/// List known models
///
/// # Arguments
///
/// * `config` - Configuration; its current model is marked in the table
/// * `provider` - Optional provider filter
/// * `json` - Print JSON instead of a table
///
/// # Examples
///
/// ```
/// use chatrelay::config::Config;
/// use chatrelay::commands::models::list_models;
/// use chatrelay::providers::Provider;
///
/// list_models(&Config::default(), Some(Provider::Groq), true).unwrap();
/// ```
pub fn list_models(config: &Config, provider: Option<Provider>, json: bool) -> Result<()> {
    let models = select_models(provider);
    tracing::debug!("Listing {} catalog models", models.len());

    if json {
        output_models_json(&models)?;
    } else {
        output_models_table(config, &models, provider);
    }

    Ok(())
}

/// Catalog entries, optionally for one provider
pub fn select_models(provider: Option<Provider>) -> Vec<&'static ProviderModel> {
    match provider {
        Some(provider) => catalog::models_for(provider).collect(),
        None => catalog::all_models().iter().collect(),
    }
}

/// Serialize a serializable value into pretty JSON string.
fn serialize_pretty<T: serde::Serialize + ?Sized>(
    value: &T,
) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Output models in JSON format
///
/// # Errors
///
/// Returns `ChatRelayError::Serialization` if serialization fails
fn output_models_json(models: &[&ProviderModel]) -> Result<()> {
    let json = serialize_pretty(models).map_err(ChatRelayError::Serialization)?;
    println!("{}", json);
    Ok(())
}

/// Output models in table format
fn output_models_table(config: &Config, models: &[&ProviderModel], provider: Option<Provider>) {
    let mut table = Table::new();
    table.add_row(row![
        "Model",
        "Display Name",
        "Provider",
        "Context Window",
        "Description"
    ]);

    for model in models {
        let current = config.resolve_model(model.provider) == model.id;
        let id = if current {
            format!("{} *", model.id)
        } else {
            model.id.to_string()
        };

        table.add_row(row![
            id,
            model.display_name,
            model.provider,
            format!("{} tokens", model.context_length),
            model.description
        ]);
    }

    match provider {
        Some(provider) => println!("\nKnown models for {}:\n", provider),
        None => println!("\nKnown models:\n"),
    }
    table.printstd();
    println!("\n* = model used by default for that provider\n");
}
