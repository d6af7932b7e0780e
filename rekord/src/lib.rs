mod attach;
mod capability;
mod constructor;
mod continuation;
mod error;
mod instance;
mod interning;
mod prefab;
mod procedure;
mod property;
mod runtime;
pub mod shape;
mod struct_type;
mod value;

pub use capability::*;
pub use constructor::Constructor;
pub use continuation::*;
pub use error::*;
pub use instance::StructInstance;
pub use interning::{InternedId, InternedStrings};
pub use prefab::{PrefabCatalog, PrefabKey, PrefabKeyId, is_prefab_key};
pub use procedure::*;
pub use property::*;
pub use runtime::{Runtime, RuntimeCreateInfo};
pub use struct_type::*;
pub use value::*;
