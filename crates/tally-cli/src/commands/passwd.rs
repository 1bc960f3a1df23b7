use crate::cli::DatasetArgs;
use crate::config::TallyConfig;
use crate::dataset;
use crate::passphrase::{self, PromptResolver};

/// Rewrap the keys under a new passphrase. Records are written back untouched.
pub fn handle(args: &DatasetArgs, config: &TallyConfig, quiet: bool) -> anyhow::Result<()> {
    let mut file = dataset::read(&args.path)?;
    let mut hierarchy = dataset::unlock(&file, &mut PromptResolver::new()?)?;
    let new_passphrase = passphrase::new_passphrase()?;

    hierarchy.rewrap(&new_passphrase, &config.keys.kdf)?;
    file.hierarchy = hierarchy.to_stored();
    dataset::write(&args.path, &file)?;

    if !quiet {
        println!("Passphrase changed for {}", args.path.display());
    }
    Ok(())
}
