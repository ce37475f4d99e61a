//! Metric tags: per-parameter declarations and the values read from
//! handler arguments.
//!
//! Handlers declare, per parameter position, whether that argument
//! contributes a tag ([`MetricTag`]). The declarations are compiled once into
//! a [`TagExtractor`] when the resource is registered; at call time the
//! extractor reads the arguments through the [`TagSource`] trait.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::error::{RestimeError, Result};

/// Scalar value a metric tag can take.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl TagValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TagValue::Null)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Null => f.write_str("null"),
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::UInt(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! tag_value_from {
    ($variant:ident as $target:ty: $($t:ty),+) => {
        $(
            impl From<$t> for TagValue {
                fn from(v: $t) -> Self {
                    TagValue::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

tag_value_from!(Int as i64: i8, i16, i32, i64);
tag_value_from!(UInt as u64: u8, u16, u32, u64);
tag_value_from!(Float as f64: f32, f64);

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        TagValue::UInt(v as u64)
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl<T: Into<TagValue>> From<Option<T>> for TagValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(TagValue::Null, Into::into)
    }
}

/// Failure raised by an accessor while reading a tag property.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AccessorError(pub String);

pub type AccessorResult = std::result::Result<TagValue, AccessorError>;

/// A handler argument that can contribute metric tags.
///
/// `Sync` so borrowed arguments can be held inside `Send` handler futures.
pub trait TagSource: Sync {
    /// Runtime type name, reported when a property cannot be read.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The value used when a tag declares no property.
    fn tag_value(&self) -> TagValue;

    /// Invoke the no-argument accessor called `name`.
    ///
    /// Returns `None` when the type exposes no accessor with that exact name.
    fn accessor(&self, name: &str) -> Option<AccessorResult> {
        let _ = name;
        None
    }
}

impl<T: TagSource + ?Sized> TagSource for &T {
    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
    fn tag_value(&self) -> TagValue {
        (**self).tag_value()
    }
    fn accessor(&self, name: &str) -> Option<AccessorResult> {
        (**self).accessor(name)
    }
}

macro_rules! scalar_tag_source {
    ($($t:ty),+) => {
        $(
            impl TagSource for $t {
                fn tag_value(&self) -> TagValue {
                    TagValue::from(*self)
                }
            }
        )+
    };
}

scalar_tag_source!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

impl TagSource for str {
    fn tag_value(&self) -> TagValue {
        TagValue::Str(self.to_string())
    }
}

impl TagSource for String {
    fn tag_value(&self) -> TagValue {
        TagValue::Str(self.clone())
    }
}

impl TagSource for TagValue {
    fn tag_value(&self) -> TagValue {
        self.clone()
    }
}

/// One handler argument as seen by tag extraction. `None` is a null argument.
pub type Arg<'a> = Option<&'a dyn TagSource>;

/// Wrap a present argument.
pub fn arg<T: TagSource>(value: &T) -> Arg<'_> {
    Some(value)
}

/// Wrap an optional argument; `None` becomes a null argument.
pub fn opt_arg<T: TagSource>(value: &Option<T>) -> Arg<'_> {
    value.as_ref().map(|v| v as &dyn TagSource)
}

/// Tag declaration for one handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTag {
    pub tag: String,
    /// Accessor to read from the argument; blank means the argument itself.
    pub property: String,
}

impl MetricTag {
    /// Tag whose value is the raw argument.
    pub fn raw(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), property: String::new() }
    }

    /// Tag whose value is read from `property` on the argument.
    pub fn new(tag: impl Into<String>, property: impl Into<String>) -> Self {
        Self { tag: tag.into(), property: property.into() }
    }
}

/// Insertion-ordered tag mapping.
///
/// Inserting an existing name overwrites the value but keeps the position
/// of the first insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTags {
    entries: Vec<(String, TagValue)>,
}

impl MetricTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: TagValue) {
        let tag = tag.into();
        match self.entries.iter_mut().find(|(k, _)| *k == tag) {
            Some((_, v)) => *v = value,
            None => self.entries.push((tag, value)),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == tag).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, TagValue)> for MetricTags {
    fn from_iter<I: IntoIterator<Item = (K, TagValue)>>(iter: I) -> Self {
        let mut tags = MetricTags::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

#[derive(Debug, Clone)]
enum TagRead {
    Raw,
    Property {
        property: String,
        /// `get<P>`, `is<P>`, `<p>`, tried in order.
        candidates: [String; 3],
    },
}

#[derive(Debug, Clone)]
struct TagSlot {
    index: usize,
    tag: String,
    read: TagRead,
}

/// Compiled tag declarations of one handler signature.
#[derive(Debug, Clone, Default)]
pub struct TagExtractor {
    slots: Vec<TagSlot>,
}

impl TagExtractor {
    /// Compile per-parameter declarations, in parameter order.
    pub fn new<I>(params: I) -> Self
    where
        I: IntoIterator<Item = Option<MetricTag>>,
    {
        let slots = params
            .into_iter()
            .enumerate()
            .filter_map(|(index, decl)| {
                let decl = decl?;
                let property = decl.property.trim();
                let read = if property.is_empty() {
                    TagRead::Raw
                } else {
                    let cap = capitalize(property);
                    TagRead::Property {
                        property: property.to_string(),
                        candidates: [format!("get{cap}"), format!("is{cap}"), property.to_string()],
                    }
                };
                Some(TagSlot { index, tag: decl.tag, read })
            })
            .collect();
        Self { slots }
    }

    /// Extractor for handlers without tagged parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Declared tag names, in parameter order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.tag.as_str())
    }

    /// Every declared tag with a null value.
    pub fn null_tags(&self) -> MetricTags {
        self.slots.iter().map(|s| (s.tag.as_str(), TagValue::Null)).collect()
    }

    /// Read tag values from the call's arguments.
    pub fn extract(&self, args: &[Arg<'_>]) -> Result<MetricTags> {
        let mut tags = MetricTags::new();
        for slot in &self.slots {
            let arg = args.get(slot.index).ok_or_else(|| RestimeError::MissingArgument {
                tag: slot.tag.clone(),
                index: slot.index,
            })?;
            let value = match (&slot.read, arg) {
                (_, None) => TagValue::Null,
                (TagRead::Raw, Some(src)) => src.tag_value(),
                (TagRead::Property { property, candidates }, Some(src)) => {
                    read_property(*src, property, candidates)?
                }
            };
            tags.insert(slot.tag.clone(), value);
        }
        Ok(tags)
    }
}

fn read_property(src: &dyn TagSource, property: &str, candidates: &[String; 3]) -> Result<TagValue> {
    let found = candidates.iter().find_map(|name| src.accessor(name));
    match found {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(invalid_property(src, property, Some(e))),
        None => Err(invalid_property(src, property, None)),
    }
}

fn invalid_property(src: &dyn TagSource, property: &str, source: Option<AccessorError>) -> RestimeError {
    RestimeError::InvalidTagProperty {
        property: property.to_string(),
        type_name: src.type_name(),
        source,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct User {
        user_id: u64,
        active: bool,
        calls: AtomicU32,
    }

    impl User {
        fn new(user_id: u64) -> Self {
            Self { user_id, active: true, calls: AtomicU32::new(0) }
        }
    }

    impl TagSource for User {
        fn tag_value(&self) -> TagValue {
            TagValue::Str(format!("user-{}", self.user_id))
        }

        fn accessor(&self, name: &str) -> Option<AccessorResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match name {
                "getUserId" => Some(Ok(self.user_id.into())),
                "isActive" => Some(Ok(self.active.into())),
                "region" => Some(Ok("eu".into())),
                "getBroken" => Some(Err(AccessorError("boom".into()))),
                _ => None,
            }
        }
    }

    /// Exposes all three accessor shapes for the same property.
    struct Shadowed;

    impl TagSource for Shadowed {
        fn tag_value(&self) -> TagValue {
            TagValue::Null
        }

        fn accessor(&self, name: &str) -> Option<AccessorResult> {
            match name {
                "getKind" => Some(Ok("getter".into())),
                "isKind" => Some(Ok("bool-accessor".into())),
                "kind" => Some(Ok("bare".into())),
                "isOnlyBool" => Some(Ok("bool-accessor".into())),
                "onlyBool" => Some(Ok("bare".into())),
                _ => None,
            }
        }
    }

    #[test]
    fn property_reads_getter() {
        let ex = TagExtractor::new([Some(MetricTag::new("id", "userId"))]);
        let user = User::new(42);
        let tags = ex.extract(&[arg(&user)]).unwrap();
        assert_eq!(tags.get("id"), Some(&TagValue::UInt(42)));
    }

    #[test]
    fn blank_property_uses_raw_argument() {
        let ex = TagExtractor::new([Some(MetricTag::new("id", "  "))]);
        let tags = ex.extract(&[arg(&"abc")]).unwrap();
        assert_eq!(tags.get("id"), Some(&TagValue::Str("abc".into())));
    }

    #[test]
    fn raw_tag_of_null_argument_is_null() {
        let ex = TagExtractor::new([Some(MetricTag::raw("id"))]);
        let tags = ex.extract(&[None]).unwrap();
        assert_eq!(tags.get("id"), Some(&TagValue::Null));
    }

    #[test]
    fn null_argument_skips_accessor() {
        let ex = TagExtractor::new([Some(MetricTag::new("id", "userId"))]);
        let none: Option<User> = None;
        let tags = ex.extract(&[opt_arg(&none)]).unwrap();
        assert!(tags.get("id").unwrap().is_null());

        let user = User::new(1);
        ex.extract(&[arg(&user)]).unwrap();
        assert_eq!(user.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn accessor_lookup_order() {
        let ex = TagExtractor::new([
            Some(MetricTag::new("a", "kind")),
            Some(MetricTag::new("b", "onlyBool")),
            Some(MetricTag::new("c", "active")),
            Some(MetricTag::new("d", "region")),
        ]);
        let user = User::new(7);
        let tags = ex.extract(&[arg(&Shadowed), arg(&Shadowed), arg(&user), arg(&user)]).unwrap();
        assert_eq!(tags.get("a"), Some(&TagValue::Str("getter".into())));
        assert_eq!(tags.get("b"), Some(&TagValue::Str("bool-accessor".into())));
        assert_eq!(tags.get("c"), Some(&TagValue::Bool(true)));
        assert_eq!(tags.get("d"), Some(&TagValue::Str("eu".into())));
    }

    #[test]
    fn missing_accessor_is_invalid_tag_property() {
        let ex = TagExtractor::new([Some(MetricTag::new("id", "accountId"))]);
        let user = User::new(1);
        let err = ex.extract(&[arg(&user)]).unwrap_err();
        match err {
            RestimeError::InvalidTagProperty { property, type_name, source } => {
                assert_eq!(property, "accountId");
                assert!(type_name.ends_with("User"), "type_name={type_name}");
                assert!(source.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failing_accessor_is_invalid_tag_property() {
        let ex = TagExtractor::new([Some(MetricTag::new("b", "broken"))]);
        let user = User::new(1);
        let err = ex.extract(&[arg(&user)]).unwrap_err();
        assert_eq!(err.code(), "INVALID_TAG_PROPERTY");
        assert!(err.to_string().contains("\"broken\""));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn tags_follow_parameter_order_and_skip_untagged() {
        let ex = TagExtractor::new([
            Some(MetricTag::raw("zeta")),
            None,
            Some(MetricTag::raw("alpha")),
        ]);
        let tags = ex.extract(&[arg(&1i32), arg(&"ignored"), arg(&2i32)]).unwrap();
        let names: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert_eq!(ex.tag_names().collect::<Vec<_>>(), ["zeta", "alpha"]);
    }

    #[test]
    fn repeated_tag_name_overwrites_in_place() {
        let ex = TagExtractor::new([
            Some(MetricTag::raw("x")),
            Some(MetricTag::raw("y")),
            Some(MetricTag::raw("x")),
        ]);
        let tags = ex.extract(&[arg(&1i32), arg(&2i32), arg(&3i32)]).unwrap();
        let flat: Vec<(String, String)> = tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert_eq!(flat, [("x".to_string(), "3".to_string()), ("y".to_string(), "2".to_string())]);
    }

    #[test]
    fn short_argument_list_is_missing_argument() {
        let ex = TagExtractor::new([None, Some(MetricTag::raw("id"))]);
        let err = ex.extract(&[arg(&"only-one")]).unwrap_err();
        assert!(matches!(err, RestimeError::MissingArgument { index: 1, .. }));
    }

    #[test]
    fn capitalize_handles_unicode_and_empty() {
        assert_eq!(capitalize("userId"), "UserId");
        assert_eq!(capitalize("ßeta"), "SSeta");
        assert_eq!(capitalize(""), "");
    }
}
