use std::sync::{Arc, LazyLock};

use crate::{
    Continuation, Host, Inspector, PROP_PROCEDURE, PrefabKey, Step, StructError,
    StructInspector, StructInstance, StructType, StructTypeDefinition, StructTypeDescriptor, Value,
    attach, error::Result, prefab::PrefabCatalog,
};

const DEFAULT_PREFAB_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct RuntimeCreateInfo {
    // initial size of the prefab key and type tables
    pub prefab_capacity: Option<usize>,
    // root of the inspector hierarchy, a fresh one if unset
    pub inspector: Option<Arc<StructInspector>>,
}

/// Process-level struct state: the prefab catalog (keys plus the canonical,
/// possibly still pending, type of each key) and the current inspector.
pub struct Runtime {
    prefabs: PrefabCatalog,
    inspector: Arc<StructInspector>,
}

static GLOBAL: LazyLock<Runtime> = LazyLock::new(|| Runtime::new(RuntimeCreateInfo::default()));

/// Outcome of looking up the canonical type for a prefab definition.
enum PrefabLookup {
    Finalized(Arc<StructType>),
    Pending(Arc<StructType>),
}

impl Runtime {
    pub fn new(info: RuntimeCreateInfo) -> Self {
        let capacity = info.prefab_capacity.unwrap_or(DEFAULT_PREFAB_CAPACITY);
        Self {
            prefabs: PrefabCatalog::new(capacity),
            inspector: info.inspector.unwrap_or_else(StructInspector::root),
        }
    }

    pub fn global() -> &'static Runtime {
        &GLOBAL
    }

    /// Forgets every prefab key and prefab type.
    pub fn reset(&self) {
        self.prefabs.reset();
        log::debug!("runtime reset");
    }

    pub fn prefabs(&self) -> &PrefabCatalog {
        &self.prefabs
    }

    pub fn current_inspector(&self) -> &Arc<StructInspector> {
        &self.inspector
    }

    /// An opaque inspector controlled by the current one.
    pub fn make_inspector(&self, is_sibling: bool) -> Inspector {
        Inspector::Opaque(StructInspector::make(Some(&self.inspector), is_sibling))
    }

    /// Defines a struct type. The returned step suspends for every property
    /// guard and derivation and finally returns the five values of
    /// [`StructTypeDefinition::to_values`].
    pub fn make_struct_type(&self, desc: StructTypeDescriptor) -> Result<Step> {
        let ty = if matches!(desc.inspector, Inspector::Prefab) {
            match self.prefab_type_for(&desc)? {
                PrefabLookup::Finalized(ty) => {
                    log::debug!("prefab type {} already defined", ty.name());
                    return redefine_prefab(ty, &desc);
                }
                PrefabLookup::Pending(ty) => ty,
            }
        } else {
            StructType::skeleton(&desc)?
        };
        attach::begin(ty, &desc.properties, desc.proc_spec)
    }

    /// [`Self::make_struct_type`] driven to completion by `host`.
    pub fn define_struct_type(
        &self,
        desc: StructTypeDescriptor,
        host: &mut impl Host,
    ) -> Result<StructTypeDefinition> {
        let values = host.run(self.make_struct_type(desc)?)?;
        StructTypeDefinition::from_values(&values)
    }

    fn prefab_type_for(&self, desc: &StructTypeDescriptor) -> Result<PrefabLookup> {
        let restriction = |what: &str| StructError::PrefabRestriction {
            type_name: desc.name.to_string(),
            what: what.to_owned(),
        };
        if desc.super_type.as_ref().is_some_and(|sup| !sup.is_prefab()) {
            return Err(restriction("non-prefab super type"));
        }
        if desc.guard.is_some() {
            return Err(restriction("guard"));
        }
        if desc.proc_spec.is_some()
            || desc
                .properties
                .iter()
                .any(|(property, _)| property.is_a(&PROP_PROCEDURE))
        {
            return Err(restriction("procedure specification"));
        }

        let key = self.prefabs.from_raw_params(
            &desc.name,
            desc.init_field_count,
            desc.auto_field_count,
            &desc.auto_value,
            &desc.immutables,
            desc.super_type.as_deref(),
        );
        if let Some(ty) = self.prefabs.type_for(&key) {
            if ty.is_finalized() {
                return Ok(PrefabLookup::Finalized(ty));
            }
            log::debug!("reusing pending prefab type {}", ty.name());
            return Ok(PrefabLookup::Pending(ty));
        }

        let ty = StructType::skeleton(desc)?;
        log::debug!("created prefab type {}", key.to_datum());
        let ty = self.prefabs.register_type(&key, ty);
        Ok(if ty.is_finalized() {
            PrefabLookup::Finalized(ty)
        } else {
            PrefabLookup::Pending(ty)
        })
    }

    /// The canonical type of `key`, creating it (and its prefab supers)
    /// pending if it does not exist yet.
    pub fn make_prefab_type(&self, key: &Arc<PrefabKey>) -> Result<Arc<StructType>> {
        if let Some(ty) = self.prefabs.type_for(key) {
            return Ok(ty);
        }
        let super_type = key
            .super_key()
            .map(|sup| self.make_prefab_type(sup))
            .transpose()?;
        let mut desc = StructTypeDescriptor::new(
            key.name().as_str(),
            super_type,
            key.init_field_count(),
            key.auto_field_count(),
        );
        desc.auto_value = key.auto_value().clone();
        desc.immutables = key.immutables();
        desc.inspector = Inspector::Prefab;

        let ty = StructType::skeleton(&desc)?;
        log::debug!("created prefab type {}", key.to_datum());
        Ok(self.prefabs.register_type(key, ty))
    }

    /// `prefab-key->struct-type`: the type a printed key denotes for
    /// instances with `field_count` fields.
    pub fn prefab_key_to_type(&self, datum: &Value, field_count: usize) -> Result<Arc<StructType>> {
        let key = self.prefabs.from_datum(datum, field_count)?;
        self.make_prefab_type(&key)
    }

    /// The key of a prefab type, or `None` for any other type.
    pub fn prefab_key_of(&self, ty: &StructType) -> Option<Arc<PrefabKey>> {
        ty.is_prefab().then(|| self.prefabs.from_struct_type(ty))
    }

    /// Instance of the prefab type denoted by `datum`, from its complete
    /// field values (auto fields included), as read from `#s(...)`.
    pub fn make_prefab_struct(
        &self,
        datum: &Value,
        values: Vec<Value>,
    ) -> Result<Arc<StructInstance>> {
        let key = self.prefabs.from_datum(datum, values.len())?;
        if key.total_field_count() != values.len() {
            return Err(StructError::ArityMismatch {
                procedure: "make-prefab-struct".into(),
                expected: key.total_field_count().to_string(),
                given: values.len(),
            });
        }
        let ty = self.make_prefab_type(&key)?;
        StructInstance::make(ty, values)
    }
}

/// A definition matching an already finalized prefab type. Its properties
/// go through the full attachment protocol on a scratch type, and the
/// existing type is returned only if they resolve to the same set.
fn redefine_prefab(ty: Arc<StructType>, desc: &StructTypeDescriptor) -> Result<Step> {
    if desc.properties.is_empty() {
        return Ok(Step::Return(ty.definition().to_values()));
    }
    let scratch = StructType::skeleton(desc)?;
    let type_name = desc.name.to_string();
    let step = attach::begin(scratch.clone(), &desc.properties, None)?;
    let compare: Continuation = Box::new(move |_: Vec<Value>| -> Result<Step> {
        if same_properties(&scratch, &ty) {
            Ok(Step::Return(ty.definition().to_values()))
        } else {
            Err(StructError::PrefabRestriction {
                type_name,
                what: "properties differing from the existing definition".into(),
            })
        }
    });
    step.and_then(compare)
}

fn same_properties(a: &StructType, b: &StructType) -> bool {
    a.properties().len() == b.properties().len()
        && a
            .properties()
            .iter()
            .all(|(property, value)| b.property_value(property) == Some(value))
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeCreateInfo::default())
    }
}
