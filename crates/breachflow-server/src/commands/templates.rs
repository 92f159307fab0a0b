//! `breachflow templates`: list the built-in notification templates.

use anyhow::Result;
use breachflow_workflow::{MemoryTemplateStore, TemplateStore};

pub fn list() -> Result<()> {
    let store = MemoryTemplateStore::with_system_templates();

    for template in store.list() {
        println!(
            "{:<40} {:<16} {:<6} {}",
            template.name,
            template.recipient_type.as_str(),
            template.method.as_str(),
            template.subject
        );
    }
    Ok(())
}
