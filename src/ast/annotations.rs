//! Per-node metadata.
//!
//! The well-known entries are plain fields. Anything else goes in a side
//! table keyed by an [`AnnotationKey`] the caller mints once and keeps.
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use crate::value::Value;

pub type MessageFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Opaque key of a caller-defined annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotationKey(u64);

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

impl AnnotationKey {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self { AnnotationKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed)) }
}

#[derive(Clone, Default)]
pub struct Annotations {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub documentation: Option<String>,
    pub examples: Option<Vec<Json>>,
    pub default: Option<Json>,
    pub message: Option<MessageFn>,     // replaces the whole error line
    pub json_schema: Option<Map<String, Json>>,
    pub brands: Vec<String>,
    custom: IndexMap<AnnotationKey, Arc<dyn Any + Send + Sync>>,
}

impl Annotations {
    pub fn new() -> Self { Self::default() }

    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
    }
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }
    pub fn examples(mut self, examples: Vec<Json>) -> Self {
        self.examples = Some(examples);
        self
    }
    pub fn default_value(mut self, default: Json) -> Self {
        self.default = Some(default);
        self
    }
    pub fn message(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.message = Some(Arc::new(f));
        self
    }
    pub fn json_schema(mut self, fragment: Map<String, Json>) -> Self {
        self.json_schema = Some(fragment);
        self
    }
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brands.push(brand.into());
        self
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: AnnotationKey, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: AnnotationKey, value: T) {
        self.custom.insert(key, Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: AnnotationKey) -> Option<&T> {
        self.custom.get(&key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.identifier.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.documentation.is_none()
            && self.examples.is_none()
            && self.default.is_none()
            && self.message.is_none()
            && self.json_schema.is_none()
            && self.brands.is_empty()
            && self.custom.is_empty()
    }

    /// Identifier, else title, else description.
    pub fn expected(&self) -> Option<&str> {
        self.identifier
            .as_deref()
            .or(self.title.as_deref())
            .or(self.description.as_deref())
    }

    /// Entries set on `other` win; brands accumulate.
    pub fn merge(&mut self, other: Annotations) {
        let Annotations {
            identifier,
            title,
            description,
            documentation,
            examples,
            default,
            message,
            json_schema,
            brands,
            custom,
        } = other;
        if identifier.is_some() { self.identifier = identifier; }
        if title.is_some() { self.title = title; }
        if description.is_some() { self.description = description; }
        if documentation.is_some() { self.documentation = documentation; }
        if examples.is_some() { self.examples = examples; }
        if default.is_some() { self.default = default; }
        if message.is_some() { self.message = message; }
        if json_schema.is_some() { self.json_schema = json_schema; }
        self.brands.extend(brands);
        self.custom.extend(custom);
    }
}

impl fmt::Debug for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Annotations");
        if let Some(v) = &self.identifier { s.field("identifier", v); }
        if let Some(v) = &self.title { s.field("title", v); }
        if let Some(v) = &self.description { s.field("description", v); }
        if let Some(v) = &self.json_schema { s.field("json_schema", v); }
        if self.message.is_some() { s.field("message", &"<fn>"); }
        if !self.brands.is_empty() { s.field("brands", &self.brands); }
        if !self.custom.is_empty() { s.field("custom", &self.custom.len()); }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn custom_entries_are_typed() {
        let key = AnnotationKey::new();
        let other = AnnotationKey::new();
        let a = Annotations::new().with(key, 42u32);
        assert_eq!(a.get::<u32>(key), Some(&42));
        assert_eq!(a.get::<String>(key), None);
        assert_eq!(a.get::<u32>(other), None);
    }

    #[test]
    fn expected_prefers_identifier() {
        let a = Annotations::new().description("d").title("t");
        assert_eq!(a.expected(), Some("t"));
        let a = a.identifier("Id");
        assert_eq!(a.expected(), Some("Id"));
    }

    #[test]
    fn merge_overrides_and_accumulates() {
        let mut a = Annotations::new().title("a").brand("A").default_value(json!(1));
        a.merge(Annotations::new().title("b").brand("B"));
        assert_eq!(a.title.as_deref(), Some("b"));
        assert_eq!(a.brands, vec!["A", "B"]);
        assert_eq!(a.default, Some(json!(1)));
        assert!(Annotations::new().is_empty());
    }
}
