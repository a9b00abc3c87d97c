//! MessageCodec: JSON text for arbitrary value graphs.
//!
//! Plain JSON covers trees of primitives. This codec also carries:
//!
//! - **Shared and cyclic structure**: a value reachable more than once is
//!   written in full the first time, wrapped as `{"__XALID": n, "value": ...}`,
//!   and as `{"__XALREF": n}` afterwards.
//! - **Registered custom types**: `{"__XALTYPE": "Point", "value": ...}`, the
//!   value being the representation produced by the type's adaptor.
//! - **Typed arrays**: `{"__XALITEMTYPE": "Point", "array": [...]}`; items of
//!   an extension item type are written without their own type envelope.
//!
//! Strings longer than [`REFERENCE_STRING_THRESHOLD`] characters take part in
//! references too, keyed by content.
//!
//! # Example
//!
//! ```
//! use xalrpc_common::coding::{JsonCoder, Value};
//!
//! let coder = JsonCoder::standard();
//! let shared = Value::array(vec![Value::from(1), Value::from(2)]);
//! let message = Value::array(vec![shared.clone(), shared]);
//!
//! let text = coder.encode(&message).unwrap();
//! assert_eq!(text, r#"[{"__XALID":2,"value":[1,2]},{"__XALREF":2}]"#);
//!
//! let decoded = coder.decode(&text).unwrap();
//! let items = decoded.as_array().unwrap();
//! assert!(items.get(0).unwrap().as_array().unwrap().ptr_eq(items.get(1).unwrap().as_array().unwrap()));
//! ```

pub mod adaptor;
mod decoder;
mod encoder;
pub mod error;
pub mod interop;
pub mod number;
pub mod reference;
pub mod value;


pub use adaptor::{AdaptorRegistry, ConversionAdaptor, PRIMITIVE_ITEM_TYPES};
pub use error::CodingError;
pub use number::Number;
pub use reference::REFERENCE_STRING_THRESHOLD;
pub use value::{Array, Extension, ExtensionObject, Object, TypedArray, Value};

use decoder::Decoder;
use encoder::Encoder;

pub const ID_KEY: &str = "__XALID";
pub const REF_KEY: &str = "__XALREF";
pub const TYPE_KEY: &str = "__XALTYPE";
pub const ITEM_TYPE_KEY: &str = "__XALITEMTYPE";
pub const VALUE_KEY: &str = "value";
pub const ARRAY_KEY: &str = "array";

/// Deepest JSON nesting of arrays and objects either side accepts. The
/// encoder counts envelope objects against it too.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Keys that mark an envelope; a plain object may not carry any of them.
pub(crate) fn is_marker_key(key: &str) -> bool {
    matches!(key, ID_KEY | REF_KEY | TYPE_KEY | ITEM_TYPE_KEY)
}

/// Encoder/decoder pair sharing one adaptor registry.
///
/// A coder is immutable once shared; register every custom type before
/// handing it to a proxy or server.
#[derive(Clone)]
pub struct JsonCoder {
    adaptors: AdaptorRegistry,
}

impl JsonCoder {
    /// Coder with the standard extensions: `char`, `date` and the two
    /// remote error types used in responses.
    pub fn standard() -> Self {
        let mut adaptors = AdaptorRegistry::with_standard_types();
        crate::protocol::exception::register_standard_types(&mut adaptors);
        JsonCoder { adaptors }
    }

    /// Coder without any extension type.
    pub fn empty() -> Self {
        JsonCoder {
            adaptors: AdaptorRegistry::new(),
        }
    }

    pub fn with_adaptors(adaptors: AdaptorRegistry) -> Self {
        JsonCoder { adaptors }
    }

    /// Registers a custom type under `type_name`.
    ///
    /// # Arguments
    ///
    /// * `type_name` - Wire name written in `__XALTYPE`/`__XALITEMTYPE`
    /// * `to_representation` - Builds the plain JSON form of a native value
    /// * `to_native` - Rebuilds the native value from that form
    pub fn register_type<T, F, G>(&mut self, type_name: &str, to_representation: F, to_native: G)
    where
        T: ExtensionObject,
        F: Fn(&T) -> Value + Send + Sync + 'static,
        G: Fn(&Value) -> Result<T, CodingError> + Send + Sync + 'static,
    {
        self.adaptors.register(type_name, to_representation, to_native);
    }

    pub fn adaptors(&self) -> &AdaptorRegistry {
        &self.adaptors
    }

    pub fn adaptors_mut(&mut self) -> &mut AdaptorRegistry {
        &mut self.adaptors
    }

    /// Encodes a value graph, preserving sharing and cycles.
    ///
    /// # Errors
    ///
    /// Fails when the graph holds an extension or typed array item type
    /// without a registered adaptor, a non-finite float, or a plain object
    /// whose keys collide with an envelope.
    pub fn encode(&self, value: &Value) -> Result<String, CodingError> {
        Encoder::new(&self.adaptors).encode(value)
    }

    /// Decodes message text, rebuilding shared and cyclic structure.
    ///
    /// # Errors
    ///
    /// Malformed text and references to undefined ids are
    /// [`CodingError::Parse`] and [`CodingError::UnresolvedReference`],
    /// both carrying the byte offset where decoding stopped.
    pub fn decode(&self, text: &str) -> Result<Value, CodingError> {
        Decoder::new(&self.adaptors, text).decode()
    }

    pub fn supported_types(&self) -> Vec<String> {
        self.adaptors.supported_types()
    }

    pub fn extended_types(&self) -> Vec<String> {
        self.adaptors.extended_types()
    }

    pub fn standard_types(&self) -> Vec<String> {
        self.adaptors.standard_types()
    }

    pub fn is_standard_type(&self, type_name: &str) -> bool {
        self.adaptors.is_standard_type(type_name)
    }
}

impl Default for JsonCoder {
    fn default() -> Self {
        Self::standard()
    }
}
