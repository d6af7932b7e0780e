use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use crate::{
    Arity, Cell, PROP_ARITY_STRING, ProcSpec, Step, StructError,
    StructProperty, StructType, StructTypeId, Value, continuation::single_value,
    error::Result, prefab,
};

/// One storage slot. Fields start out raw and are boxed into a [`Cell`] on
/// their first write, so that later writes reach every alias.
#[derive(Clone)]
enum FieldSlot {
    Raw(Value),
    Boxed(Cell),
}

impl FieldSlot {
    #[inline]
    fn get(&self) -> Value {
        match self {
            FieldSlot::Raw(value) => value.clone(),
            FieldSlot::Boxed(cell) => cell.get(),
        }
    }

    #[inline]
    fn set(&mut self, value: Value) {
        match self {
            FieldSlot::Boxed(cell) => cell.set(value),
            FieldSlot::Raw(_) => *self = FieldSlot::Boxed(Cell::new(value)),
        }
    }
}

/// A struct instance: its exact type and flat storage for every field of
/// the whole chain, most ancestral first.
pub struct StructInstance {
    struct_type: Arc<StructType>,
    fields: RwLock<Box<[FieldSlot]>>,
}

impl StructInstance {
    /// Allocates an instance from a complete storage vector.
    pub fn make(struct_type: Arc<StructType>, values: Vec<Value>) -> Result<Arc<Self>> {
        if values.len() != struct_type.total_field_count() {
            return Err(StructError::ArityMismatch {
                procedure: struct_type.constructor_name().to_string(),
                expected: struct_type.total_field_count().to_string(),
                given: values.len(),
            });
        }
        let fields = values.into_iter().map(FieldSlot::Raw).collect();
        Ok(Arc::new(Self {
            struct_type,
            fields: RwLock::new(fields),
        }))
    }

    #[inline]
    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.struct_type
    }

    /// Absolute storage index of `ty`'s own field `field`.
    fn locate(&self, ty: &StructType, field: usize) -> Result<usize> {
        let offset = self.struct_type.offset_of(ty).ok_or_else(|| {
            StructError::UnboundFieldOffset {
                type_name: ty.name().to_string(),
                instance_type: self.struct_type.name().to_string(),
            }
        })?;
        if field >= ty.own_field_count() {
            return Err(StructError::FieldIndexOutOfRange {
                type_name: ty.name().to_string(),
                index: field,
                count: ty.own_field_count(),
            });
        }
        Ok(offset + field)
    }

    /// Reads field `field` of ancestor (or exact) type `ty`.
    pub fn get(&self, ty: &StructType, field: usize) -> Result<Value> {
        let index = self.locate(ty, field)?;
        Ok(self.fields.read()[index].get())
    }

    /// Writes field `field` of ancestor (or exact) type `ty`. Immutability
    /// is enforced by [`crate::Mutator`], not here.
    pub fn set(&self, ty: &StructType, field: usize, value: Value) -> Result<()> {
        let index = self.locate(ty, field)?;
        self.fields.write()[index].set(value);
        Ok(())
    }

    /// The cell backing a field, boxing the field now if it is still raw.
    pub fn cell(&self, ty: &StructType, field: usize) -> Result<Cell> {
        let index = self.locate(ty, field)?;
        let mut fields = self.fields.write();
        let cell = match &fields[index] {
            FieldSlot::Boxed(cell) => return Ok(cell.clone()),
            FieldSlot::Raw(value) => Cell::new(value.clone()),
        };
        fields[index] = FieldSlot::Boxed(cell.clone());
        Ok(cell)
    }

    fn get_relative_to(&self, source: StructTypeId, field: usize) -> Result<Value> {
        let ty = self
            .struct_type
            .ancestry()
            .find(|ty| ty.id() == source)
            .ok_or_else(|| StructError::UnboundFieldOffset {
                type_name: format!("{source:?}"),
                instance_type: self.struct_type.name().to_string(),
            })?;
        self.get(ty, field)
    }

    /// Storage read by absolute index, for layers that already resolved the
    /// offset.
    pub fn get_absolute(&self, index: usize) -> Option<Value> {
        self.fields.read().get(index).map(FieldSlot::get)
    }

    pub fn set_absolute(&self, index: usize, value: Value) -> bool {
        match self.fields.write().get_mut(index) {
            Some(slot) => {
                slot.set(value);
                true
            }
            None => false,
        }
    }

    /// Properties are read through the instance so wrapper layers can
    /// override them.
    pub fn get_prop(&self, property: &StructProperty) -> Result<Value> {
        self.struct_type
            .property_value(property)
            .cloned()
            .ok_or_else(|| StructError::MissingProperty {
                property: property.name().to_string(),
                value: self.to_string(),
            })
    }

    /// Snapshot of every field, cells unwrapped.
    pub fn values(&self) -> Vec<Value> {
        self.fields.read().iter().map(FieldSlot::get).collect()
    }

    /// `#(struct:name v ...)`
    pub fn to_vector(&self) -> Value {
        let tag = Value::symbol(&format!("struct:{}", self.struct_type.name()));
        Value::vector(std::iter::once(tag).chain(self.values()))
    }

    pub fn is_callable(&self) -> bool {
        self.struct_type.procedure().is_some()
    }

    pub fn arity(&self) -> Option<Arity> {
        let binding = self.struct_type.procedure()?;
        match &binding.spec {
            ProcSpec::Procedure(procedure) => procedure.arity().map(Arity::drop_first),
            ProcSpec::Field(index) => self
                .get_relative_to(binding.source, *index)
                .ok()?
                .arity(),
        }
    }

    /// Applies the instance through its type's procedure designation.
    pub fn call(self: &Arc<Self>, args: Vec<Value>) -> Result<Step> {
        let Some(binding) = self.struct_type.procedure() else {
            return Err(StructError::NotCallable {
                value: self.to_string(),
            });
        };
        match &binding.spec {
            ProcSpec::Field(index) => {
                let procedure = self.get_relative_to(binding.source, *index)?;
                self.checked_call(procedure, args, 0)
            }
            ProcSpec::Procedure(procedure) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Struct(self.clone()));
                full.extend(args);
                self.checked_call(procedure.clone(), full, 1)
            }
        }
    }

    fn checked_call(
        self: &Arc<Self>,
        procedure: Value,
        args: Vec<Value>,
        implicit: usize,
    ) -> Result<Step> {
        let Some(arity) = procedure.arity() else {
            return Ok(Step::tail_call(procedure, args));
        };
        if arity.accepts(args.len()) {
            return Ok(Step::tail_call(procedure, args));
        }

        let name = self.struct_type.name().to_string();
        let given = args.len() - implicit;
        let render = self
            .struct_type
            .properties()
            .iter()
            .find(|(property, _)| property.is_a(&PROP_ARITY_STRING))
            .map(|(_, value)| value.clone());
        match render {
            Some(render) => Ok(Step::call(
                render,
                vec![Value::Struct(self.clone())],
                move |results: Vec<Value>| -> Result<Step> {
                    let expected = match single_value("prop:arity-string", results)? {
                        Value::String(text) => text.to_string(),
                        other => other.to_string(),
                    };
                    Err(StructError::ArityMismatch {
                        procedure: name,
                        expected,
                        given,
                    })
                },
            )),
            None => {
                let mut expected = arity;
                for _ in 0..implicit {
                    expected = expected.drop_first();
                }
                Err(StructError::ArityMismatch {
                    procedure: name,
                    expected: expected.to_string(),
                    given,
                })
            }
        }
    }
}

impl fmt::Display for StructInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = &self.struct_type;
        if ty.is_opaque() {
            return write!(f, "#<{}>", ty.name());
        }
        if ty.is_prefab() {
            write!(f, "#s({}", prefab::short_datum_of(ty))?;
        } else {
            write!(f, "({}", ty.name())?;
        }
        for value in self.values() {
            write!(f, " {value}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for StructInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
