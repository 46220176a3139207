use crate::core::model::PluginRecord;

/// First record whose `Name` or `InternalName` equals `target` exactly.
pub fn find_plugin<'a>(records: &'a [PluginRecord], target: &str) -> Option<&'a PluginRecord> {
    records.iter().find(|r| r.matches(target))
}
