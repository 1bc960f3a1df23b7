use std::io::{self, IsTerminal};

use indicatif::{ProgressBar, ProgressStyle};
use signal_hook::consts::SIGINT;
use tally_core::crypto::Rekeyed;
use tally_core::{CancelFlag, Cancellation, KeyConfig, KeyHierarchy, VersionedList};

use crate::cli::DatasetArgs;
use crate::config::TallyConfig;
use crate::dataset;
use crate::errors::CliError;
use crate::passphrase::{self, PromptResolver};

/// Replace the key hierarchy and re-encrypt every protected field.
///
/// The dataset is only written if every record migrated; otherwise the
/// file keeps its old keys and ciphertext. Ctrl-C stops the migration at the
/// next record.
pub fn handle(args: &DatasetArgs, config: &TallyConfig, quiet: bool) -> anyhow::Result<()> {
    let mut file = dataset::read(&args.path)?;
    let hierarchy = dataset::unlock(&file, &mut PromptResolver::new()?)?;
    let mut list = dataset::load_list(&file, &hierarchy)?;
    let new_passphrase = passphrase::new_passphrase()?;

    let cancel = CancelFlag::new();
    signal_hook::flag::register(SIGINT, cancel.handle())?;

    let bar = progress_bar(list.len() as u64, config.ui.progress && !quiet);
    let rekeyed = rekey_with_progress(&hierarchy, &new_passphrase, &config.keys, &mut list, &bar, &cancel)?;
    bar.finish_and_clear();

    let report = rekeyed.report;
    if report.is_cancelled() {
        return Err(CliError::incomplete(format!(
            "Re-key cancelled after {} record(s); {} was not modified",
            report.processed,
            args.path.display()
        ))
        .into());
    }
    if !report.is_clean() {
        for failure in &report.errors {
            match failure.id {
                Some(id) => eprintln!("  #{}: {}", id, failure.error),
                None => eprintln!("  {}", failure.error),
            }
        }
        return Err(CliError::incomplete(format!(
            "Re-key stopped after {} record(s) with {} failure(s); {} was not modified",
            report.processed,
            report.errors.len(),
            args.path.display()
        ))
        .into());
    }

    file.hierarchy = rekeyed.hierarchy.to_stored();
    file.records = list.to_records()?;
    dataset::write(&args.path, &file)?;

    if !quiet {
        println!(
            "Re-keyed {} record(s) ({} with encrypted fields)",
            report.processed, report.changed
        );
    }
    Ok(())
}

fn rekey_with_progress(
    hierarchy: &KeyHierarchy,
    new_passphrase: &str,
    keys: &KeyConfig,
    list: &mut VersionedList,
    bar: &ProgressBar,
    cancel: &CancelFlag,
) -> tally_core::Result<Rekeyed> {
    let tick = || {
        if cancel.is_cancelled() {
            return true;
        }
        bar.inc(1);
        false
    };
    hierarchy.rekey_dataset(new_passphrase, keys, &mut [list], &tick)
}

fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{spinner} re-keying [{bar:30}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ItemId, KdfParams, Value, VersionedItem};

    fn setup() -> (KeyHierarchy, KeyConfig, VersionedList) {
        let keys = KeyConfig::default().with_kdf(KdfParams::insecure_fast());
        let hierarchy = KeyHierarchy::create("old-passphrase", &keys).unwrap();
        let mut list = VersionedList::new(tally_core::ListStyle::Core);
        for id in 1..=3 {
            let mut item = VersionedItem::new(ItemId::new(id), 0);
            item.set_secret(tally_core::FieldId::new(1), hierarchy.cipher_set(), Value::Integer(i64::from(id)))
                .unwrap();
            list.add_item(item).unwrap();
        }
        (hierarchy, keys, list)
    }

    #[test]
    fn test_rekey_ticks_every_record() {
        let (hierarchy, keys, mut list) = setup();
        let bar = ProgressBar::hidden();
        let rekeyed =
            rekey_with_progress(&hierarchy, "new-passphrase", &keys, &mut list, &bar, &CancelFlag::new()).unwrap();
        assert!(rekeyed.report.is_clean());
        assert_eq!(rekeyed.report.processed, 3);
    }

    #[test]
    fn test_raised_flag_cancels_rekey() {
        let (hierarchy, keys, mut list) = setup();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let rekeyed =
            rekey_with_progress(&hierarchy, "new-passphrase", &keys, &mut list, &ProgressBar::hidden(), &cancel)
                .unwrap();
        assert!(rekeyed.report.is_cancelled());
        assert_eq!(rekeyed.report.processed, 0);
    }
}
