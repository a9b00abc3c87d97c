use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::CodingError;
use super::value::{ExtensionObject, Value};

/// Item types a typed array may declare without a registered adaptor.
pub const PRIMITIVE_ITEM_TYPES: &[&str] = &[
    "boolean", "byte", "short", "int", "long", "float", "double", "string",
];

/// Converts one registered native type to and from a plain JSON
/// representation.
pub trait ConversionAdaptor: Send + Sync {
    fn to_representation(&self, native: &dyn ExtensionObject) -> Result<Value, CodingError>;

    fn to_native(&self, representation: &Value) -> Result<Arc<dyn ExtensionObject>, CodingError>;
}

/// Adaptor built from a pair of closures over a concrete type `T`.
struct FnAdaptor<T, F, G> {
    type_name: String,
    to_representation: F,
    to_native: G,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, G> ConversionAdaptor for FnAdaptor<T, F, G>
where
    T: ExtensionObject,
    F: Fn(&T) -> Value + Send + Sync,
    G: Fn(&Value) -> Result<T, CodingError> + Send + Sync,
{
    fn to_representation(&self, native: &dyn ExtensionObject) -> Result<Value, CodingError> {
        let native = native.as_any().downcast_ref::<T>().ok_or_else(|| {
            CodingError::conversion(
                &self.type_name,
                format!("native object is not a {}", std::any::type_name::<T>()),
            )
        })?;
        Ok((self.to_representation)(native))
    }

    fn to_native(&self, representation: &Value) -> Result<Arc<dyn ExtensionObject>, CodingError> {
        let native = (self.to_native)(representation)?;
        Ok(Arc::new(native))
    }
}

/// Registry of conversion adaptors keyed by wire type name.
///
/// Registries are cheap to clone; adaptors are shared.
#[derive(Clone, Default)]
pub struct AdaptorRegistry {
    adaptors: HashMap<String, Arc<dyn ConversionAdaptor>>,
    standard: BTreeSet<String>,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `char` and `date` extensions.
    pub fn with_standard_types() -> Self {
        let mut registry = Self::new();
        registry.register_standard(
            "char",
            |c: &char| Value::from(c.to_string()),
            |value| {
                let text = value
                    .as_str()
                    .ok_or_else(|| CodingError::conversion("char", "expected a string"))?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(CodingError::conversion("char", "expected exactly one character")),
                }
            },
        );
        registry.register_standard(
            "date",
            |time: &SystemTime| {
                let millis = match time.duration_since(UNIX_EPOCH) {
                    Ok(d) => d.as_millis() as i64,
                    Err(e) => -(e.duration().as_millis() as i64),
                };
                Value::from(millis)
            },
            |value| {
                let millis = value
                    .as_i64()
                    .ok_or_else(|| CodingError::conversion("date", "expected milliseconds"))?;
                let offset = Duration::from_millis(millis.unsigned_abs());
                if millis >= 0 {
                    Ok(UNIX_EPOCH + offset)
                } else {
                    Ok(UNIX_EPOCH - offset)
                }
            },
        );
        registry
    }

    /// Registers (or replaces) the adaptor for `type_name`.
    pub fn register<T, F, G>(&mut self, type_name: &str, to_representation: F, to_native: G)
    where
        T: ExtensionObject,
        F: Fn(&T) -> Value + Send + Sync + 'static,
        G: Fn(&Value) -> Result<T, CodingError> + Send + Sync + 'static,
    {
        let adaptor = FnAdaptor {
            type_name: type_name.to_string(),
            to_representation,
            to_native,
            _marker: PhantomData,
        };
        self.adaptors.insert(type_name.to_string(), Arc::new(adaptor));
        self.standard.remove(type_name);
    }

    /// Registers an adaptor and lists its type among the standard types.
    pub fn register_standard<T, F, G>(&mut self, type_name: &str, to_representation: F, to_native: G)
    where
        T: ExtensionObject,
        F: Fn(&T) -> Value + Send + Sync + 'static,
        G: Fn(&Value) -> Result<T, CodingError> + Send + Sync + 'static,
    {
        self.register(type_name, to_representation, to_native);
        self.standard.insert(type_name.to_string());
    }

    pub fn register_adaptor(&mut self, type_name: &str, adaptor: Arc<dyn ConversionAdaptor>) {
        self.adaptors.insert(type_name.to_string(), adaptor);
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn ConversionAdaptor>> {
        self.adaptors.get(type_name)
    }

    pub fn lookup(&self, type_name: &str) -> Result<&Arc<dyn ConversionAdaptor>, CodingError> {
        self.get(type_name)
            .ok_or_else(|| CodingError::UnsupportedType(type_name.to_string()))
    }

    pub fn is_extended(&self, type_name: &str) -> bool {
        self.adaptors.contains_key(type_name)
    }

    pub fn is_standard_type(&self, type_name: &str) -> bool {
        self.standard.contains(type_name)
    }

    pub fn standard_types(&self) -> Vec<String> {
        self.standard.iter().cloned().collect()
    }

    pub fn extended_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adaptors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Every type the coder can carry: JSON natives, primitive item types and
    /// registered extensions.
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: BTreeSet<String> = ["null", "boolean", "number", "string", "array", "object"]
            .iter()
            .chain(PRIMITIVE_ITEM_TYPES.iter())
            .map(|s| s.to_string())
            .collect();
        types.extend(self.adaptors.keys().cloned());
        types.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_types_registered() {
        let registry = AdaptorRegistry::with_standard_types();
        assert!(registry.is_standard_type("char"));
        assert!(registry.is_standard_type("date"));
        assert_eq!(registry.standard_types(), vec!["char", "date"]);
        assert!(registry.supported_types().contains(&"int".to_string()));
    }

    #[test]
    fn test_date_adaptor_round_trip() {
        let registry = AdaptorRegistry::with_standard_types();
        let adaptor = registry.lookup("date").unwrap();
        let time = UNIX_EPOCH + Duration::from_millis(1_234_567);

        let representation = adaptor.to_representation(&time).unwrap();
        assert_eq!(representation.as_i64(), Some(1_234_567));

        let native = adaptor.to_native(&representation).unwrap();
        assert_eq!(native.as_any().downcast_ref::<SystemTime>(), Some(&time));
    }

    #[test]
    fn test_unknown_type_lookup_fails() {
        let registry = AdaptorRegistry::new();
        assert!(matches!(
            registry.lookup("Point"),
            Err(CodingError::UnsupportedType(name)) if name == "Point"
        ));
    }

    #[test]
    fn test_wrong_native_type_is_conversion_error() {
        let registry = AdaptorRegistry::with_standard_types();
        let adaptor = registry.lookup("char").unwrap();
        assert!(adaptor.to_representation(&42_i64).is_err());
    }
}
