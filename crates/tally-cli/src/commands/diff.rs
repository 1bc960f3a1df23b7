use tally_core::NeverCancel;

use crate::cli::DiffArgs;
use crate::constants::{NEW_PASSPHRASE_ENV, PASSPHRASE_ENV};
use crate::dataset;
use crate::output;
use crate::passphrase::PromptResolver;

/// Report what changed between two versions of a dataset.
///
/// A dataset copied before a `passwd` or `rekey` may no longer share the
/// other's hierarchy; the newer one is then unlocked with
/// `TALLY_NEW_PASSPHRASE` first.
pub fn handle(args: &DiffArgs) -> anyhow::Result<()> {
    let old_file = dataset::read(&args.old)?;
    let new_file = dataset::read(&args.new)?;

    let old_keys = dataset::unlock(&old_file, &mut PromptResolver::new()?)?;
    let new_keys = if new_file.hierarchy == old_file.hierarchy {
        None
    } else {
        let mut resolver = PromptResolver::with_env(&[NEW_PASSPHRASE_ENV, PASSPHRASE_ENV])?;
        Some(dataset::unlock(&new_file, &mut resolver)?)
    };

    let old_list = dataset::load_list(&old_file, &old_keys)?;
    let new_list = dataset::load_list(&new_file, new_keys.as_ref().unwrap_or(&old_keys))?;
    let differences = new_list.derive_differences(&old_list, &NeverCancel)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output::diff_json(&differences)?)?);
    } else {
        println!("{}", output::diff_text(&differences)?);
    }
    Ok(())
}
