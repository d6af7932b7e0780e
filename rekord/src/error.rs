use std::fmt;

/// Conditions raised to the host. None of them are retried internally; a
/// failing definition or construction leaves nothing behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructError {
    DuplicatePropertyBinding {
        type_name: String,
        property: String,
    },

    InsufficientFieldsForCheckedProcedure { type_name: String, fields: usize },

    /// The instance's exact type does not have the requested type as an
    /// ancestor.
    UnboundFieldOffset {
        type_name: String,
        instance_type: String,
    },

    MissingProperty { property: String, value: String },

    ArityMismatch {
        procedure: String,
        expected: String,
        given: usize,
    },

    FieldIndexOutOfRange {
        type_name: String,
        index: usize,
        count: usize,
    },

    ImmutableField { type_name: String, index: usize },

    NotCallable { value: String },

    ContractViolation {
        procedure: String,
        expected: String,
        given: String,
    },

    InvalidPrefabKey { datum: String },

    PrefabRestriction { type_name: String, what: String },

    ResultCount {
        context: String,
        expected: usize,
        given: usize,
    },

    /// A condition raised by host or user code while this layer was
    /// suspended.
    Raised(String),
}

impl fmt::Display for StructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePropertyBinding {
                type_name,
                property,
            } => write!(f, "duplicate property binding for {property} on {type_name}"),
            Self::InsufficientFieldsForCheckedProcedure { type_name, fields } => write!(
                f,
                "{type_name}: prop:checked-procedure needs at least two fields in the structure type, found {fields}"
            ),
            Self::UnboundFieldOffset {
                type_name,
                instance_type,
            } => write!(
                f,
                "{type_name}: cannot reference a field of a {instance_type} instance"
            ),
            Self::MissingProperty { property, value } => {
                write!(f, "{property}-accessor: expected {property}? but got {value}")
            }
            Self::ArityMismatch {
                procedure,
                expected,
                given,
            } => write!(
                f,
                "{procedure}: arity mismatch; expected: {expected}, given: {given}"
            ),
            Self::FieldIndexOutOfRange {
                type_name,
                index,
                count,
            } => write!(
                f,
                "{type_name}: field index {index} out of range for {count} fields"
            ),
            Self::ImmutableField { type_name, index } => write!(
                f,
                "{type_name}: cannot modify value of immutable field {index}"
            ),
            Self::NotCallable { value } => write!(f, "application: not a procedure: {value}"),
            Self::ContractViolation {
                procedure,
                expected,
                given,
            } => write!(
                f,
                "{procedure}: contract violation; expected: {expected}, given: {given}"
            ),
            Self::InvalidPrefabKey { datum } => write!(f, "invalid prefab key: {datum}"),
            Self::PrefabRestriction { type_name, what } => write!(
                f,
                "{type_name}: {what} not allowed for a prefab structure type"
            ),
            Self::ResultCount {
                context,
                expected,
                given,
            } => write!(
                f,
                "{context}: result arity mismatch; expected: {expected}, received: {given}"
            ),
            Self::Raised(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for StructError {}

pub type Result<T, E = StructError> = std::result::Result<T, E>;

impl StructError {
    pub fn contract(
        procedure: impl Into<String>,
        expected: impl Into<String>,
        given: impl ToString,
    ) -> Self {
        Self::ContractViolation {
            procedure: procedure.into(),
            expected: expected.into(),
            given: given.to_string(),
        }
    }
}
