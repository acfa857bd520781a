//! Context templates, context values and the inference rule between them.

use std::collections::BTreeMap;

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

use super::{Id, MemProfiles};

/// A node in the context template hierarchy, e.g. `time` > `day_of_week`.
///
/// Templates are equal when their ids are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTemplate {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub parent: Option<Box<ContextTemplate>>,
}

impl ContextTemplate {
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ContextTemplate) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Iterates over the parent chain, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &ContextTemplate> {
        std::iter::successors(self.parent.as_deref(), |t| t.parent.as_deref())
    }

    /// A general template can be inferred from any of its descendants.
    pub fn can_infer_from(&self, other: &ContextTemplate) -> bool {
        other.ancestors().any(|ancestor| ancestor == self)
    }
}

impl PartialEq for ContextTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// A template bound to an optional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub template: ContextTemplate,
    pub value: Option<ContextValue>,
}

impl Context {
    pub fn new(template: ContextTemplate, value: Option<ContextValue>) -> Self {
        Self { template, value }
    }

    /// Whether this context can be inferred from `other`.
    ///
    /// Holds when both are equal, when `other` has the same template and no
    /// value, or when this template is an ancestor of the other template.
    pub fn can_infer_from(&self, other: &Context) -> bool {
        if self == other {
            true
        } else if self.template == other.template {
            other.value.is_none()
        } else {
            self.template.can_infer_from(&other.template)
        }
    }
}

/// Contexts attached to a rating or used as a query.
#[derive(Debug, Clone, Default, PartialEq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextList(Vec<Context>);

impl ContextList {
    pub fn push(&mut self, context: Context) {
        self.0.push(context);
    }

    /// Whether every context here can be inferred from some context in
    /// `query`. An empty query infers nothing.
    pub fn can_infer_from(&self, query: &ContextList) -> bool {
        if query.is_empty() {
            return false;
        }

        self.0
            .iter()
            .all(|ctx| query.0.iter().any(|other| ctx.can_infer_from(other)))
    }
}

/// All context templates of a dataset, keyed by template id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextTemplateSchema {
    templates: BTreeMap<Id, ContextTemplate>,
}

impl ContextTemplateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, template: ContextTemplate) {
        self.templates.insert(template.id, template);
    }

    pub fn get(&self, id: Id) -> Option<&ContextTemplate> {
        self.templates.get(&id)
    }

    pub fn ids(&self) -> Vec<Id> {
        self.templates.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Profile tables attached to context templates, keyed by template id.
pub type CtsProfiles = BTreeMap<Id, MemProfiles>;

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> (ContextTemplate, ContextTemplate) {
        let time = ContextTemplate::new(1, "time");
        let weekday = ContextTemplate::new(2, "weekday").with_parent(time.clone());
        (time, weekday)
    }

    #[test]
    fn general_template_infers_from_descendant() {
        let (time, weekday) = hierarchy();

        assert!(time.can_infer_from(&weekday));
        assert!(!weekday.can_infer_from(&time));
        assert!(!time.can_infer_from(&time));
    }

    #[test]
    fn context_inference() {
        let (time, weekday) = hierarchy();
        let monday = Context::new(weekday.clone(), Some(ContextValue::Text("monday".into())));
        let any_weekday = Context::new(weekday, None);
        let any_time = Context::new(time, None);

        assert!(monday.can_infer_from(&monday));
        assert!(monday.can_infer_from(&any_weekday));
        assert!(!any_weekday.can_infer_from(&monday));
        assert!(any_time.can_infer_from(&monday));
    }

    #[test]
    fn empty_query_infers_nothing() {
        let (time, _) = hierarchy();
        let list = ContextList::from(vec![Context::new(time, None)]);

        assert!(!list.can_infer_from(&ContextList::default()));
        assert!(ContextList::default().can_infer_from(&list));
    }
}
