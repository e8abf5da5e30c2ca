//! Parent name derivation from the children's imported names

use std::collections::BTreeSet;

use super::error::NameConflict;
use super::models::ChildCompany;

/// Derive the parent's display name from its children.
///
/// Imported names are compared after trimming; blank values are ignored. The
/// result is the single distinct value, or a conflict when there is none or
/// more than one.
pub fn resolve_name(children: &[ChildCompany]) -> Result<String, NameConflict> {
    let candidates: BTreeSet<&str> = children
        .iter()
        .map(|child| child.imported_company_name.trim())
        .filter(|name| !name.is_empty())
        .collect();

    let mut names = candidates.iter();
    match (names.next(), names.next()) {
        (Some(name), None) => Ok(name.to_string()),
        (None, _) => Err(NameConflict::NoSourceName {
            child_ids: children.iter().map(|c| c.id.clone()).collect(),
        }),
        _ => Err(NameConflict::Ambiguous {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }),
    }
}
