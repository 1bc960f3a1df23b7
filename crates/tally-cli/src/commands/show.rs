use tally_core::View;

use crate::cli::ShowArgs;
use crate::dataset;
use crate::output;
use crate::passphrase::PromptResolver;

pub fn handle(args: &ShowArgs) -> anyhow::Result<()> {
    let file = dataset::read(&args.path)?;
    let hierarchy = dataset::unlock(&file, &mut PromptResolver::new()?)?;
    let list = dataset::load_list(&file, &hierarchy)?;
    let view = if args.all { View::All } else { View::Active };

    if args.json {
        let items = list
            .iter(view)
            .map(output::item_json)
            .collect::<anyhow::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if list.iter(view).len() == 0 {
        println!("No records.");
        return Ok(());
    }
    for item in list.iter(view) {
        println!("{}", output::item_text(item)?);
    }
    Ok(())
}
