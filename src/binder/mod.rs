//! Binding configuration sections into typed settings.
//!
//! A settings type is any record implementing [`Settings`]: `Default` supplies the
//! values of fields absent from configuration, `serde` describes the fields, and
//! `PartialEq` lets monitors detect structurally identical re-binds.
//!
//! Raw values are coerced into the declared field types: strings parse into
//! integers, floats and booleans, integers widen into floats and any scalar can bind
//! a string field. Integers must fit the declared type. Optional fields coerce into
//! their inner type. A value that cannot be coerced is an error; it is never replaced
//! by the default.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use tiered_settings::source::MemorySource;
//! use tiered_settings::{Binder, Settings};
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! struct Smtp {
//!     host: String,
//!     port: u16,
//!     tls: bool,
//! }
//!
//! impl Settings for Smtp {
//!     const SECTION: Option<&'static str> = Some("Mail:Smtp");
//! }
//!
//! let source = Arc::new(MemorySource::default());
//! source.set("Mail:Smtp:Host", "mx.example.org");
//! source.set("Mail:Smtp:Port", "2525");
//!
//! let smtp = Binder::new(source).bind_default::<Smtp>()?;
//! assert_eq!(smtp.port, 2525);
//! assert!(!smtp.tls);
//! # Ok::<(), tiered_settings::BindError>(())
//! ```

mod coerce;
mod template;

use crate::error::BindError;
use crate::metrics::{MetricsErrorKind, MetricsRecorder, Tier};
use crate::source::{ConfigTree, ConfigurationSource, SectionPath};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

/// A record type that can be bound from a configuration section.
///
/// Fields must be strings, integers, floats, booleans, optionals or nested records.
/// Sequences are rejected with [`BindError::Shape`].
pub trait Settings:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + Debug + Send + Sync + 'static
{
    /// Well-known configuration section for this type, if any.
    ///
    /// Used when no explicit section is given. `None` binds from the root.
    const SECTION: Option<&'static str> = None;

    /// Returns the default section path for this type.
    fn section_path() -> SectionPath {
        Self::SECTION.map(SectionPath::new).unwrap_or_default()
    }
}

/// An immutable, shared settings value produced by a bind.
///
/// Cloning is cheap and yields the same instance: use [`BoundSettings::ptr_eq`] to
/// test identity and `*a == *b` to compare values.
pub struct BoundSettings<T> {
    inner: Arc<Bound<T>>,
}

#[derive(Debug)]
struct Bound<T> {
    value: T,
    revision: u64,
    section: SectionPath,
}

impl<T> BoundSettings<T> {
    pub(crate) fn new(value: T, revision: u64, section: SectionPath) -> Self {
        Self {
            inner: Arc::new(Bound {
                value,
                revision,
                section,
            }),
        }
    }

    /// Returns the bound value.
    pub fn value(&self) -> &T {
        &self.inner.value
    }

    /// Returns the revision of the configuration tree this value was bound from.
    pub fn revision(&self) -> u64 {
        self.inner.revision
    }

    /// Returns the section this value was bound from.
    pub fn section(&self) -> &SectionPath {
        &self.inner.section
    }

    /// Returns `true` if both handles point to the same bound instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Clone for BoundSettings<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for BoundSettings<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: Debug> Debug for BoundSettings<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSettings")
            .field("value", &self.inner.value)
            .field("revision", &self.inner.revision)
            .field("section", &self.inner.section.to_string())
            .finish()
    }
}

/// Binds configuration sections from a shared [`ConfigurationSource`].
///
/// The binder is stateless apart from its source and optional metrics; it is shared
/// by all freshness tiers.
#[derive(Clone)]
pub struct Binder {
    source: Arc<dyn ConfigurationSource>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("source", &"<ConfigurationSource>")
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish()
    }
}

impl Binder {
    /// Creates a binder reading from `source`.
    pub fn new(source: Arc<dyn ConfigurationSource>) -> Self {
        Self {
            source,
            metrics: None,
        }
    }

    /// Attaches a metrics recorder.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the underlying configuration source.
    pub fn source(&self) -> &Arc<dyn ConfigurationSource> {
        &self.source
    }

    /// Binds `section` of the current snapshot into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::SectionNotFound`] if the section is absent,
    /// [`BindError::Shape`] if `T` is not bindable, or
    /// [`BindError::TypeMismatch`] if a raw value cannot be coerced.
    pub fn bind<T: Settings>(&self, section: &SectionPath) -> Result<BoundSettings<T>, BindError> {
        self.bind_for(Tier::Direct, section)
    }

    /// Binds the well-known section of `T` (see [`Settings::SECTION`]).
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn bind_default<T: Settings>(&self) -> Result<BoundSettings<T>, BindError> {
        self.bind(&T::section_path())
    }

    /// Binds `section` of an explicit `tree` into `T`. The result carries the tree's revision.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn bind_tree<T: Settings>(
        tree: &ConfigTree,
        section: &SectionPath,
    ) -> Result<BoundSettings<T>, BindError> {
        let raw = tree.section(section).ok_or_else(|| BindError::SectionNotFound {
            section: section.to_string(),
        })?;
        let value = coerce::bind_value::<T>(&raw, section)?;
        Ok(BoundSettings::new(value, tree.revision(), section.clone()))
    }

    pub(crate) fn bind_for<T: Settings>(
        &self,
        tier: Tier,
        section: &SectionPath,
    ) -> Result<BoundSettings<T>, BindError> {
        let tree = self.source.snapshot();
        self.bind_tree_for::<T>(tier, &tree, section)
    }

    pub(crate) fn bind_tree_for<T: Settings>(
        &self,
        tier: Tier,
        tree: &ConfigTree,
        section: &SectionPath,
    ) -> Result<BoundSettings<T>, BindError> {
        let result = Self::bind_tree::<T>(tree, section);
        if let Some(metrics) = self.metrics.as_deref() {
            match &result {
                Ok(_) => metrics.record_bind(tier),
                Err(e) => metrics.record_error(error_kind(e)),
            }
        }
        result
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<dyn MetricsRecorder>> {
        self.metrics.as_ref()
    }
}

pub(crate) fn error_kind(error: &BindError) -> MetricsErrorKind {
    match error {
        BindError::SectionNotFound { .. } => MetricsErrorKind::SectionNotFound,
        BindError::Shape { .. } => MetricsErrorKind::Shape,
        BindError::TypeMismatch { .. } => MetricsErrorKind::TypeMismatch,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::FieldKind;
    use crate::source::MemorySource;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Retry {
        attempts: u32,
        backoff_secs: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Service {
        name: String,
        port: u16,
        enabled: bool,
        ratio: f64,
        retry: Retry,
        tag: Option<String>,
    }

    impl Default for Service {
        fn default() -> Self {
            Self {
                name: "svc".to_owned(),
                port: 8080,
                enabled: false,
                ratio: 1.0,
                retry: Retry::default(),
                tag: None,
            }
        }
    }

    impl Settings for Service {
        const SECTION: Option<&'static str> = Some("Service");
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct WithList {
        hosts: Vec<String>,
    }

    impl Settings for WithList {}

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct NotARecord(u32);

    impl Settings for NotARecord {}

    fn binder_for(document: serde_json::Value) -> Binder {
        Binder::new(Arc::new(MemorySource::from_json(&document).unwrap()))
    }

    #[test]
    fn test_bind_coerces_strings() {
        let binder = binder_for(json!({
            "Service": {
                "Name": "api",
                "Port": "9090",
                "Enabled": "TRUE",
                "Ratio": "0.25",
                "Retry": { "Attempts": "3", "BackoffSecs": 2 },
                "Tag": "blue",
                "Unknown": "ignored"
            }
        }));

        let service = binder.bind_default::<Service>().unwrap();
        assert_eq!(
            *service.value(),
            Service {
                name: "api".to_owned(),
                port: 9090,
                enabled: true,
                ratio: 0.25,
                retry: Retry {
                    attempts: 3,
                    backoff_secs: 2.0,
                },
                tag: Some("blue".to_owned()),
            }
        );
        assert_eq!(service.section().to_string(), "Service");
        assert_eq!(service.revision(), 0);
    }

    #[test]
    fn test_missing_fields_keep_defaults() {
        let binder = binder_for(json!({ "Service": { "Port": 1 } }));
        let service = binder.bind_default::<Service>().unwrap();
        assert_eq!(service.name, "svc");
        assert_eq!(service.port, 1);
        assert_eq!(service.ratio, 1.0);
        assert_eq!(service.tag, None);
    }

    #[test]
    fn test_missing_section() {
        let binder = binder_for(json!({ "Other": {} }));
        assert_eq!(
            binder.bind_default::<Service>().unwrap_err(),
            BindError::SectionNotFound {
                section: "Service".to_owned()
            }
        );
    }

    #[test]
    fn test_type_mismatch_is_not_defaulted() {
        let binder = binder_for(json!({ "Service": { "Port": "eighty" } }));
        assert_eq!(
            binder.bind_default::<Service>().unwrap_err(),
            BindError::TypeMismatch {
                path: "Service:port".to_owned(),
                expected: FieldKind::Integer,
                found: "string \"eighty\"".to_owned(),
            }
        );
    }

    #[test]
    fn test_float_into_integer_is_rejected() {
        let binder = binder_for(json!({ "Service": { "Port": 80.5 } }));
        assert!(matches!(
            binder.bind_default::<Service>(),
            Err(BindError::TypeMismatch {
                expected: FieldKind::Integer,
                ..
            })
        ));
    }

    #[test]
    fn test_scalar_where_section_expected() {
        let binder = binder_for(json!({ "Service": { "Retry": "3" } }));
        assert!(matches!(
            binder.bind_default::<Service>(),
            Err(BindError::TypeMismatch {
                expected: FieldKind::Section,
                ..
            })
        ));

        let binder = binder_for(json!({ "Service": "flat" }));
        assert!(matches!(
            binder.bind_default::<Service>(),
            Err(BindError::TypeMismatch {
                expected: FieldKind::Section,
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_integer() {
        for port in [json!(70000), json!(-1), json!("65536")] {
            let binder = binder_for(json!({ "Service": { "Port": port } }));
            assert!(matches!(
                binder.bind_default::<Service>(),
                Err(BindError::TypeMismatch {
                    ref path,
                    expected: FieldKind::Integer,
                    ..
                }) if path == "Service:port"
            ));
        }

        let binder = binder_for(json!({ "Service": { "Port": 65535 } }));
        assert_eq!(binder.bind_default::<Service>().unwrap().port, 65535);
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Backoff {
        max_retries: u32,
        jitter: Option<bool>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Optionals {
        port: Option<u32>,
        verbose: Option<bool>,
        backoff: Option<Backoff>,
    }

    impl Settings for Optionals {
        const SECTION: Option<&'static str> = Some("Opt");
    }

    #[test]
    fn test_optional_fields_are_coerced() {
        let binder = binder_for(json!({
            "Opt": {
                "Port": "8080",
                "Verbose": "true",
                "Backoff": { "MaxRetries": "3" }
            }
        }));

        assert_eq!(
            *binder.bind_default::<Optionals>().unwrap(),
            Optionals {
                port: Some(8080),
                verbose: Some(true),
                backoff: Some(Backoff {
                    max_retries: 3,
                    jitter: None,
                }),
            }
        );
    }

    #[test]
    fn test_absent_optional_fields_stay_none() {
        let binder = binder_for(json!({ "Opt": {} }));
        assert_eq!(*binder.bind_default::<Optionals>().unwrap(), Optionals::default());
    }

    #[test]
    fn test_optional_field_mismatch_names_the_field() {
        let binder = binder_for(json!({ "Opt": { "Port": "-5" } }));
        assert!(matches!(
            binder.bind_default::<Optionals>(),
            Err(BindError::TypeMismatch {
                ref path,
                expected: FieldKind::Integer,
                ..
            }) if path == "Opt:port"
        ));

        let binder = binder_for(json!({ "Opt": { "Backoff": { "MaxRetries": "many" } } }));
        assert!(matches!(
            binder.bind_default::<Optionals>(),
            Err(BindError::TypeMismatch {
                ref path,
                expected: FieldKind::Integer,
                ..
            }) if path == "Opt:backoff:max_retries"
        ));

        let binder = binder_for(json!({ "Opt": { "Verbose": "sometimes" } }));
        assert!(matches!(
            binder.bind_default::<Optionals>(),
            Err(BindError::TypeMismatch {
                expected: FieldKind::Bool,
                ..
            })
        ));
    }

    #[test]
    fn test_shape_errors() {
        let binder = binder_for(json!({ "Hosts": ["a"] }));
        assert!(matches!(
            binder.bind::<WithList>(&SectionPath::root()),
            Err(BindError::Shape { .. })
        ));
        assert!(matches!(
            binder.bind::<NotARecord>(&SectionPath::root()),
            Err(BindError::Shape { .. })
        ));
    }

    #[test]
    fn test_bind_tree_uses_tree_revision() {
        let tree = ConfigTree::from_json(&json!({ "Service": { "Port": 1 } }))
            .unwrap()
            .with_revision(7);
        let bound = Binder::bind_tree::<Service>(&tree, &"service".into()).unwrap();
        assert_eq!(bound.revision(), 7);
    }

    #[test]
    fn test_clones_share_identity() {
        let binder = binder_for(json!({ "Service": {} }));
        let a = binder.bind_default::<Service>().unwrap();
        let b = binder.bind_default::<Service>().unwrap();
        assert!(BoundSettings::ptr_eq(&a, &a.clone()));
        assert!(!BoundSettings::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }
}
