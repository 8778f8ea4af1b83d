//! Quote data-entry engine: dynamic field collections, per-type view state,
//! and the flat/nested conversions between the form and the quote file.
//!
//! The desktop shell in `main.rs` drives a [`QuoteSession`] against a
//! [`LocalBackend`]; everything here also runs headless.

pub mod catalog;
pub mod collections;
pub mod document;
pub mod error;
pub mod field_key;
pub mod flatten;
pub mod form;
pub mod logging;
pub mod oee;
pub mod session;
pub mod settings;
pub mod view_store;

pub use collections::{collection_id, CollectionTemplate, DynamicCollectionManager, FieldTemplate};
pub use document::{LocalBackend, QuoteBackend, QuoteDocument};
pub use error::{BackendError, EngineError, Result};
pub use field_key::{decode, encode, with_index, CollectionKey, FieldKey};
pub use flatten::{flatten, flatten_data, unflatten, unflatten_data, FlatMap};
pub use form::{FormModel, FormSurface};
pub use session::QuoteSession;
pub use view_store::{DocumentType, FlatViewStore};
