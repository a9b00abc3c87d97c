use parking_lot::{RwLock, RwLockReadGuard};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::error::CodingError;
use super::number::Number;

/// A native object carried by an [`Extension`] value.
///
/// Implemented automatically for every `Debug + PartialEq` type that can
/// cross threads, so registering a conversion adaptor is all it takes to
/// ship a domain type.
pub trait ExtensionObject: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_object(&self, other: &dyn ExtensionObject) -> bool;
}

impl<T> ExtensionObject for T
where
    T: Any + Send + Sync + fmt::Debug + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_object(&self, other: &dyn ExtensionObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

/// A shared, mutable JSON array.
///
/// Cloning an `Array` clones the handle, not the items, so the same array can
/// be reachable from several places in a graph (including from itself).
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Array(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read_recursive().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    /// Replaces the item at `index`, returning false when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read_recursive()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.read().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Array::from_vec(items)
    }
}

/// A shared, mutable JSON object with keys kept in sorted order.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<BTreeMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Object(Arc::new(RwLock::new(map)))
    }

    pub fn len(&self) -> usize {
        self.0.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read_recursive().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read_recursive().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read_recursive().keys().cloned().collect()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.0.read_recursive()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Object::from_map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A value of a registered custom type, tagged with its wire type name.
#[derive(Clone)]
pub struct Extension {
    type_name: Arc<str>,
    native: Arc<dyn ExtensionObject>,
}

impl Extension {
    pub fn new<T: ExtensionObject>(type_name: impl Into<Arc<str>>, native: T) -> Self {
        Self::from_shared(type_name, Arc::new(native))
    }

    pub fn from_shared(type_name: impl Into<Arc<str>>, native: Arc<dyn ExtensionObject>) -> Self {
        Extension {
            type_name: type_name.into(),
            native,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn native(&self) -> &Arc<dyn ExtensionObject> {
        &self.native
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.native.as_any().downcast_ref::<T>()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.native) as *const () as usize
    }
}

/// A homogeneous array whose items share one declared type.
#[derive(Clone)]
pub struct TypedArray {
    item_type: Arc<str>,
    items: Array,
}

impl TypedArray {
    pub fn new(item_type: impl Into<Arc<str>>, items: Vec<Value>) -> Self {
        TypedArray {
            item_type: item_type.into(),
            items: Array::from_vec(items),
        }
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn items(&self) -> &Array {
        &self.items
    }

    pub(crate) fn identity(&self) -> usize {
        self.items.identity()
    }
}

/// A node in a message graph.
///
/// Containers are shared handles: cloning a `Value::Array` yields a second
/// handle to the same array, and encoding preserves that sharing through
/// reference envelopes.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Array(Array),
    Object(Object),
    Extension(Extension),
    TypedArray(TypedArray),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Array::from_vec(items))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(entries.into_iter().collect())
    }

    pub fn extension<T: ExtensionObject>(type_name: &str, native: T) -> Value {
        Value::Extension(Extension::new(type_name, native))
    }

    pub fn typed_array(item_type: &str, items: Vec<Value>) -> Value {
        Value::TypedArray(TypedArray::new(item_type, items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number().map(|n| n.as_i64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.as_f64())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_extension(&self) -> Option<&Extension> {
        match self {
            Value::Extension(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_typed_array(&self) -> Option<&TypedArray> {
        match self {
            Value::TypedArray(t) => Some(t),
            _ => None,
        }
    }

    /// Borrows the native object of an extension value of type `T`.
    pub fn downcast_extension<T: Any>(&self) -> Option<&T> {
        self.as_extension().and_then(|e| e.downcast_ref::<T>())
    }

    /// Short human readable label for diagnostics and dispatch signatures.
    pub fn type_label(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(_) => "object".to_string(),
            Value::Extension(e) => e.type_name().to_string(),
            Value::TypedArray(t) => format!("{}[]", t.item_type()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut visited = HashSet::new();
        values_equal(self, other, &mut visited)
    }
}

/// Structural equality that treats a revisited pair of containers as equal,
/// which is what lets two isomorphic cyclic graphs compare equal.
fn values_equal(a: &Value, b: &Value, visited: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => arrays_equal(x, y, visited),
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) || !visited.insert((x.identity(), y.identity())) {
                return true;
            }
            let (xs, ys) = (x.read(), y.read());
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy, visited))
        }
        (Value::Extension(x), Value::Extension(y)) => {
            x.type_name() == y.type_name()
                && (Arc::ptr_eq(x.native(), y.native()) || (**x.native()).eq_object(&**y.native()))
        }
        (Value::TypedArray(x), Value::TypedArray(y)) => {
            x.item_type() == y.item_type() && arrays_equal(x.items(), y.items(), visited)
        }
        _ => false,
    }
}

fn arrays_equal(x: &Array, y: &Array, visited: &mut HashSet<(usize, usize)>) -> bool {
    if x.ptr_eq(y) || !visited.insert((x.identity(), y.identity())) {
        return true;
    }
    let (xs, ys) = (x.read(), y.read());
    xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(a, b)| values_equal(a, b, visited))
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = Vec::new();
        debug_value(self, f, &mut path)
    }
}

fn debug_value(value: &Value, f: &mut fmt::Formatter<'_>, path: &mut Vec<usize>) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{:?}", n),
        Value::String(s) => write!(f, "{:?}", s),
        Value::Array(a) => debug_items(a, f, path),
        Value::Object(o) => {
            if path.contains(&o.identity()) {
                return f.write_str("{<cycle>}");
            }
            path.push(o.identity());
            f.write_str("{")?;
            for (i, (key, item)) in o.read().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{:?}: ", key)?;
                debug_value(item, f, path)?;
            }
            path.pop();
            f.write_str("}")
        }
        Value::Extension(e) => write!(f, "{}({:?})", e.type_name(), e.native()),
        Value::TypedArray(t) => {
            write!(f, "{}", t.item_type())?;
            debug_items(t.items(), f, path)
        }
    }
}

fn debug_items(array: &Array, f: &mut fmt::Formatter<'_>, path: &mut Vec<usize>) -> fmt::Result {
    if path.contains(&array.identity()) {
        return f.write_str("[<cycle>]");
    }
    path.push(array.identity());
    f.write_str("[")?;
    for (i, item) in array.read().iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        debug_value(item, f, path)?;
    }
    path.pop();
    f.write_str("]")
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

macro_rules! value_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(Number::from(n))
            }
        })*
    };
}

value_from_number!(i8, i16, i32, i64, u8, u16, u32, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Extension> for Value {
    fn from(e: Extension) -> Self {
        Value::Extension(e)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

fn mismatch(expected: &str, value: &Value) -> CodingError {
    CodingError::conversion(expected, format!("cannot convert {} value", value.type_label()))
}

macro_rules! number_try_from_value {
    ($($t:ty => $accessor:ident),*) => {
        $(impl TryFrom<Value> for $t {
            type Error = CodingError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::Number(n) => Ok(n.$accessor()),
                    other => Err(mismatch(stringify!($t), &other)),
                }
            }
        })*
    };
}

number_try_from_value!(i64 => as_i64, i32 => as_i32, i16 => as_i16, i8 => as_i8, f64 => as_f64, f32 => as_f32);

impl TryFrom<Value> for bool {
    type Error = CodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = CodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl TryFrom<Value> for Option<String> {
    type Error = CodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            other => String::try_from(other).map(Some),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = CodingError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(a) => Ok(a.to_vec()),
            Value::TypedArray(t) => Ok(t.items().to_vec()),
            other => Err(mismatch("array", &other)),
        }
    }
}

/// Results of methods without a return value are discarded.
impl TryFrom<Value> for () {
    type Error = CodingError;

    fn try_from(_: Value) -> Result<Self, Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_array_clone_shares_storage() {
        let a = Array::new();
        let b = a.clone();
        b.push(Value::from(1));
        assert_eq!(a.len(), 1);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_cyclic_arrays_compare_and_debug() {
        let a = Array::new();
        a.push(Value::Array(a.clone()));
        let b = Array::new();
        b.push(Value::Array(b.clone()));

        assert_eq!(Value::Array(a.clone()), Value::Array(b));
        assert_eq!(format!("{:?}", Value::Array(a)), "[[<cycle>]]");
    }

    #[test]
    fn test_extension_downcast_and_equality() {
        let v = Value::extension("Point", Point { x: 1, y: 2 });
        assert_eq!(v.downcast_extension::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert_eq!(v, Value::extension("Point", Point { x: 1, y: 2 }));
        assert_ne!(v, Value::extension("Point", Point { x: 2, y: 2 }));
    }

    #[test]
    fn test_try_from_narrowing() {
        let n: i32 = Value::from(7.9).try_into().unwrap();
        assert_eq!(n, 7);
        let s: Result<String, _> = Value::from(3).try_into();
        assert!(s.is_err());
    }
}
