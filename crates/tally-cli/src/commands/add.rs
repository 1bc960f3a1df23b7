use tally_core::{FieldId, FieldValue, Value};

use crate::cli::AddArgs;
use crate::dataset;
use crate::errors::CliError;
use crate::passphrase::PromptResolver;

pub fn handle(args: &AddArgs, quiet: bool) -> anyhow::Result<()> {
    if args.fields.is_empty() && args.secrets.is_empty() {
        return Err(CliError::invalid_input("Provide at least one --field or --secret").into());
    }
    let plain = parse_assignments(&args.fields)?;
    let secret = parse_assignments(&args.secrets)?;
    check_unique(plain.iter().chain(secret.iter()).map(|(field, _)| *field))?;

    let mut file = dataset::read(&args.path)?;
    let hierarchy = dataset::unlock(&file, &mut PromptResolver::new()?)?;
    let mut list = dataset::load_list(&file, &hierarchy)?;

    let id = list.create_item(
        plain
            .into_iter()
            .map(|(field, value)| (field, FieldValue::Plain(value))),
    );
    let cipher = hierarchy.cipher_set();
    for (field, value) in secret {
        list.edit(id, |item| item.set_secret(field, cipher, value))?;
    }

    file.records = list.to_records()?;
    dataset::write(&args.path, &file)?;
    tracing::info!(item = %id, total = list.len(), "record added");

    if quiet {
        println!("{}", id);
    } else {
        println!("Added record {}", id);
    }
    Ok(())
}

/// Parse `ID=VALUE` pairs; VALUE uses the `kind:value` literal syntax.
pub fn parse_assignments(raw: &[String]) -> anyhow::Result<Vec<(FieldId, Value)>> {
    raw.iter().map(|item| parse_assignment(item)).collect()
}

fn parse_assignment(raw: &str) -> anyhow::Result<(FieldId, Value)> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::invalid_input(format!("Expected ID=VALUE, got '{}'", raw)))?;
    let id: u16 = id
        .trim()
        .parse()
        .map_err(|_| CliError::invalid_input(format!("Invalid field id '{}'", id)))?;
    let value = Value::parse_literal(value).map_err(|e| CliError::invalid_input(e.to_string()))?;
    Ok((FieldId::new(id), value))
}

fn check_unique(fields: impl Iterator<Item = FieldId>) -> anyhow::Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for field in fields {
        if !seen.insert(field) {
            return Err(CliError::invalid_input(format!("Field {} given more than once", field)).into());
        }
    }
    Ok(())
}
