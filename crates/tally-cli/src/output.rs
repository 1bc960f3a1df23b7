//! Text and JSON rendering for `show` and `diff`.

use serde_json::{json, Value as Json};
use tally_core::{DiffTag, Differences, FieldId, FieldValue, VersionedItem};

fn value_json(value: Option<&FieldValue>) -> anyhow::Result<Json> {
    match value {
        Some(value) => Ok(serde_json::to_value(value.value()?)?),
        None => Ok(Json::Null),
    }
}

fn value_text(value: Option<&FieldValue>) -> anyhow::Result<String> {
    match value {
        Some(value) => Ok(value.value()?.to_string()),
        None => Ok("-".to_string()),
    }
}

pub fn item_json(item: &VersionedItem) -> anyhow::Result<Json> {
    let mut fields = Vec::with_capacity(item.field_count());
    for (field, value) in item.fields() {
        fields.push(json!({
            "field": field.get(),
            "encrypted": value.is_encrypted(),
            "value": value_json(Some(value))?,
        }));
    }
    Ok(json!({
        "id": item.id().get(),
        "deleted": item.is_deleted(),
        "fields": fields,
    }))
}

pub fn item_text(item: &VersionedItem) -> anyhow::Result<String> {
    let mut out = format!("#{}", item.id());
    if item.is_deleted() {
        out.push_str(" (deleted)");
    }
    for (field, value) in item.fields() {
        out.push_str(&format!("\n  {:>5}  {}", field, value_text(Some(value))?));
        if value.is_encrypted() {
            out.push_str("  [encrypted]");
        }
    }
    Ok(out)
}

/// Fields whose old value was recorded for a changed entry, with the new value.
fn changed_fields(item: &VersionedItem) -> Vec<(FieldId, Option<&FieldValue>, Option<&FieldValue>)> {
    item.history()
        .top()
        .map(|snapshot| {
            snapshot
                .fields()
                .map(|(field, old)| (field, old, item.field(field)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn diff_json(differences: &Differences) -> anyhow::Result<Json> {
    let mut entries = Vec::with_capacity(differences.len());
    for (tag, item) in differences.iter() {
        let mut entry = json!({ "tag": tag, "id": item.id().get() });
        if tag == DiffTag::Changed {
            let mut fields = Vec::new();
            for (field, old, new) in changed_fields(item) {
                fields.push(json!({
                    "field": field.get(),
                    "old": value_json(old)?,
                    "new": value_json(new)?,
                }));
            }
            entry["difference"] = serde_json::to_value(item.difference())?;
            entry["fields"] = Json::Array(fields);
        }
        entries.push(entry);
    }
    let errors: Vec<Json> = differences
        .report()
        .errors
        .iter()
        .map(|failure| {
            json!({
                "id": failure.id.map(|id| id.get()),
                "error": failure.error.to_string(),
            })
        })
        .collect();
    Ok(json!({
        "summary": differences.report().summary(),
        "entries": entries,
        "errors": errors,
    }))
}

pub fn diff_text(differences: &Differences) -> anyhow::Result<String> {
    let mut lines = Vec::new();
    for (tag, item) in differences.iter() {
        let marker = match tag {
            DiffTag::Added => '+',
            DiffTag::Changed => '~',
            DiffTag::Deleted => '-',
        };
        lines.push(format!("{} #{}", marker, item.id()));
        if tag == DiffTag::Changed {
            let security_only = item.difference() == tally_core::Difference::SecurityChanged;
            if security_only {
                lines.push("    (re-encrypted, values unchanged)".to_string());
            }
            for (field, old, new) in changed_fields(item) {
                if security_only {
                    continue;
                }
                lines.push(format!("  {:>5}  {} -> {}", field, value_text(old)?, value_text(new)?));
            }
        }
    }
    for failure in &differences.report().errors {
        let id = failure
            .id
            .map(|id| format!("#{}", id))
            .unwrap_or_else(|| "?".to_string());
        lines.push(format!("! {} {}", id, failure.error));
    }
    let summary = differences.report().summary();
    lines.push(format!(
        "{} added, {} changed, {} deleted, {} failed",
        summary.added, summary.changed, summary.deleted, summary.errored
    ));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{ItemId, ListStyle, NeverCancel, Value, VersionedList};

    const AMOUNT: FieldId = FieldId::new(1);

    fn list_of(entries: &[(u32, i64)]) -> VersionedList {
        let mut list = VersionedList::new(ListStyle::Core);
        for (id, amount) in entries {
            list.add_item(VersionedItem::new(ItemId::new(*id), 0).with_field(AMOUNT, Value::Money(*amount)))
                .unwrap();
        }
        list
    }

    #[test]
    fn test_diff_text_lists_changes() {
        let old = list_of(&[(1, 100), (2, 200)]);
        let new = list_of(&[(2, 250), (3, 300)]);
        let differences = new.derive_differences(&old, &NeverCancel).unwrap();

        let text = diff_text(&differences).unwrap();
        assert!(text.contains("~ #2"));
        assert!(text.contains("2.00 -> 2.50"));
        assert!(text.contains("+ #3"));
        assert!(text.contains("- #1"));
        assert!(text.ends_with("1 added, 1 changed, 1 deleted, 0 failed"));
    }

    #[test]
    fn test_diff_json_shape() {
        let old = list_of(&[(1, 100)]);
        let new = list_of(&[(1, 150)]);
        let differences = new.derive_differences(&old, &NeverCancel).unwrap();

        let json = diff_json(&differences).unwrap();
        assert_eq!(json["summary"]["changed"], 1);
        assert_eq!(json["entries"][0]["tag"], "changed");
        assert_eq!(json["entries"][0]["difference"], "value_changed");
        assert_eq!(json["entries"][0]["fields"][0]["old"]["value"], 100);
        assert_eq!(json["entries"][0]["fields"][0]["new"]["value"], 150);
    }

    #[test]
    fn test_item_text() {
        let mut item = VersionedItem::new(ItemId::new(4), 0).with_field(AMOUNT, Value::Money(1250));
        item.set_deleted(true, 0);
        let text = item_text(&item).unwrap();
        assert!(text.starts_with("#4 (deleted)"));
        assert!(text.contains("12.50"));
    }
}
