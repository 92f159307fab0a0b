//! Notification templates and rendering.
//!
//! Rendering is flat `{{placeholder}}` substitution over a fixed set of keys
//! (see [`TemplateContext`]). Unknown placeholders are left as written. The
//! [`TemplateRenderer`] trait is the seam for swapping in a richer engine.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::PoisonError;

use breachflow_types::{NotificationMethod, RecipientType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::incident::BreachIncident;

pub const DPB_NOTIFICATION_TEMPLATE: &str = "dpb_notification_template";
pub const DATA_PRINCIPAL_NOTIFICATION_TEMPLATE: &str = "data_principal_notification_template";
pub const DATA_PRINCIPAL_NOTIFICATION_SMS: &str = "data_principal_notification_sms";
pub const DPB_FOLLOWUP_TEMPLATE: &str = "dpb_followup_template";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{recipient_type} notification template not found: {name}")]
    NotFound {
        name: String,
        recipient_type: RecipientType,
    },

    #[error("system template {name} ({recipient_type}) cannot be replaced")]
    SystemTemplate {
        name: String,
        recipient_type: RecipientType,
    },
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub name: String,
    pub recipient_type: RecipientType,
    pub method: NotificationMethod,
    pub subject: String,
    pub body: String,
    pub language: String,
    pub is_system: bool,
}

pub trait TemplateStore: Send + Sync {
    fn get_template(&self, name: &str, recipient_type: RecipientType)
    -> Result<NotificationTemplate>;

    fn list(&self) -> Vec<NotificationTemplate>;
}

/// Templates held in memory, keyed by `(name, recipient_type)`.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<BTreeMap<(String, RecipientType), NotificationTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the four built-in DPDP templates.
    pub fn with_system_templates() -> Self {
        let store = Self::new();
        {
            let mut templates = store
                .templates
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for template in system_templates() {
                templates.insert((template.name.clone(), template.recipient_type), template);
            }
        }
        store
    }

    /// Adds or replaces a tenant template. System templates are read-only.
    pub fn insert(&self, template: NotificationTemplate) -> Result<()> {
        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (template.name.clone(), template.recipient_type);

        if templates.get(&key).is_some_and(|existing| existing.is_system) {
            return Err(TemplateError::SystemTemplate {
                name: key.0,
                recipient_type: key.1,
            });
        }

        templates.insert(key, template);
        Ok(())
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn get_template(
        &self,
        name: &str,
        recipient_type: RecipientType,
    ) -> Result<NotificationTemplate> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(name.to_string(), recipient_type))
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
                recipient_type,
            })
    }

    fn list(&self) -> Vec<NotificationTemplate> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

fn system_templates() -> Vec<NotificationTemplate> {
    let system = |name: &str, recipient_type, method, subject: &str, body: &str| {
        NotificationTemplate {
            name: name.to_string(),
            recipient_type,
            method,
            subject: subject.to_string(),
            body: body.to_string(),
            language: "en".to_string(),
            is_system: true,
        }
    };

    vec![
        system(
            DPB_NOTIFICATION_TEMPLATE,
            RecipientType::Dpb,
            NotificationMethod::Email,
            "Data Breach Notification - {{breach_title}}",
            include_str!("../templates/dpb_notification.txt"),
        ),
        system(
            DATA_PRINCIPAL_NOTIFICATION_TEMPLATE,
            RecipientType::DataPrincipal,
            NotificationMethod::Email,
            "Important Security Notice - Data Breach Notification",
            include_str!("../templates/data_principal_notification.txt"),
        ),
        system(
            DATA_PRINCIPAL_NOTIFICATION_SMS,
            RecipientType::DataPrincipal,
            NotificationMethod::Sms,
            "",
            include_str!("../templates/data_principal_notification_sms.txt"),
        ),
        system(
            DPB_FOLLOWUP_TEMPLATE,
            RecipientType::Dpb,
            NotificationMethod::Email,
            "Follow-up on Data Breach Notification - {{breach_title}}",
            include_str!("../templates/dpb_followup.txt"),
        ),
    ]
}

// ============================================================================
// Rendering
// ============================================================================

/// Placeholder values for one incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<&'static str, String>,
}

impl TemplateContext {
    pub fn from_incident(incident: &BreachIncident) -> Self {
        let mut values = BTreeMap::new();
        values.insert("breach_id", incident.id.to_string());
        values.insert("breach_title", incident.title.clone());
        values.insert("breach_description", incident.description.clone());
        values.insert(
            "breach_date",
            incident.breach_date.format("%Y-%m-%d").to_string(),
        );
        values.insert(
            "detection_date",
            incident.detection_date().format("%Y-%m-%d").to_string(),
        );
        values.insert("affected_count", incident.affected_users_count.to_string());
        values.insert(
            "severity",
            incident
                .severity
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
        );
        values.insert(
            "breach_type",
            incident.breach_type.clone().unwrap_or_default(),
        );
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &TemplateContext) -> String;
}

/// Literal `{{key}}` replacement in a single left-to-right pass.
///
/// Substituted values are never rescanned, and unknown placeholders are
/// left as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &TemplateContext) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                rendered.push_str(&rest[open..]);
                return rendered;
            };

            let key = &after[..close];
            match context.get(key) {
                Some(value) => rendered.push_str(value),
                None => {
                    rendered.push_str("{{");
                    rendered.push_str(key);
                    rendered.push_str("}}");
                }
            }
            rest = &after[close + 2..];
        }

        rendered.push_str(rest);
        rendered
    }
}

/// A subject and body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub template_name: String,
    pub method: NotificationMethod,
    pub subject: String,
    pub body: String,
}

impl RenderedMessage {
    pub fn render(
        template: &NotificationTemplate,
        renderer: &dyn TemplateRenderer,
        context: &TemplateContext,
    ) -> Self {
        Self {
            template_name: template.name.clone(),
            method: template.method,
            subject: renderer.render(&template.subject, context),
            body: renderer.render(&template.body, context),
        }
    }
}
