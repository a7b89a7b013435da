//! In-place edits of `lockstep.toml`
//!
//! Uses `toml_edit` so comments and formatting around the edited entry are
//! kept as the user wrote them.

use crate::error::{LockstepError, LockstepResult};
use toml_edit::{value, DocumentMut, Item, Table};

/// Set `inputs.<name>.url`, creating the input if it does not exist.
///
/// Works for both `[inputs.name]` tables and inline `name = { url = .. }`.
pub fn set_input_url(content: &str, name: &str, url: &str) -> LockstepResult<String> {
    let mut doc: DocumentMut = content.parse()?;

    let inputs = doc
        .entry("inputs")
        .or_insert_with(|| {
            let mut table = Table::new();
            table.set_implicit(true);
            Item::Table(table)
        })
        .as_table_like_mut()
        .ok_or_else(|| LockstepError::User("`inputs` in lockstep.toml is not a table".into()))?;

    match inputs.get_mut(name).and_then(Item::as_table_like_mut) {
        Some(entry) => {
            entry.insert("url", value(url));
        }
        None => {
            let mut table = Table::new();
            table.insert("url", value(url));
            inputs.insert(name, Item::Table(table));
        }
    }

    Ok(doc.to_string())
}
