use tally_core::KeyHierarchy;

use crate::cli::InitArgs;
use crate::config::TallyConfig;
use crate::dataset::{self, DatasetFile};
use crate::errors::CliError;
use crate::passphrase;

pub fn handle(args: &InitArgs, config: &TallyConfig, quiet: bool) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        return Err(CliError::invalid_input(format!(
            "Dataset already exists at {} (use --force to replace it)",
            args.path.display()
        ))
        .into());
    }

    let passphrase = passphrase::init_passphrase()?;
    let hierarchy = KeyHierarchy::create(&passphrase, &config.keys)?;
    dataset::write(&args.path, &DatasetFile::new(hierarchy.to_stored()))?;

    if !quiet {
        println!("Created dataset at {}", args.path.display());
    }
    Ok(())
}
