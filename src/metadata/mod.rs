// Copyright 2026 Joyent, Inc.

//! Descriptors mapping user-domain types onto the Thrift data model.
//!
//! A descriptor is built once at setup time, validated, and immutable
//! afterwards. The codec engine consumes descriptors and is agnostic to
//! where they came from: written by hand, emitted by a build-time tool, or
//! produced by a derive mechanism. The [`catalog`] module memoizes
//! descriptors per user type and breaks recursion between them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::{MetadataError, MetadataErrorKind};
use crate::protocol::TType;

pub mod catalog;

pub use catalog::{Coercion, TypeCatalog};

/// Field id reserved for the union discriminator pseudo-field. It never
/// appears on the wire.
pub const UNION_ID_FIELD_ID: i16 = i16::min_value();

/// A normalized description of how a value is represented on the wire and
/// in memory. Immutable after construction; structural equality is the
/// catalog's semantic key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThriftType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Double,
    String,
    Binary,
    /// Return-type only.
    Void,
    Enum(Arc<EnumMetadata>),
    Struct(StructHandle),
    List(Box<ThriftType>),
    Set(Box<ThriftType>),
    Map(Box<ThriftType>, Box<ThriftType>),
    /// A user-domain type that is not natively representable: carried on
    /// the wire as `wire`, converted through the coercion registered under
    /// `ident`.
    Coerced {
        ident: String,
        wire: Box<ThriftType>,
    },
}

impl ThriftType {
    pub fn list(element: ThriftType) -> ThriftType {
        ThriftType::List(Box::new(element))
    }

    pub fn set(element: ThriftType) -> ThriftType {
        ThriftType::Set(Box::new(element))
    }

    pub fn map(key: ThriftType, value: ThriftType) -> ThriftType {
        ThriftType::Map(Box::new(key), Box::new(value))
    }

    /// The one-byte wire tag this type is framed with.
    pub fn wire_type(&self) -> TType {
        match self {
            ThriftType::Bool => TType::Bool,
            ThriftType::I8 => TType::I8,
            ThriftType::I16 => TType::I16,
            ThriftType::I32 => TType::I32,
            ThriftType::I64 => TType::I64,
            ThriftType::Double => TType::Double,
            ThriftType::String | ThriftType::Binary => TType::String,
            ThriftType::Void => TType::Void,
            ThriftType::Enum(_) => TType::I32,
            ThriftType::Struct(_) => TType::Struct,
            ThriftType::List(_) => TType::List,
            ThriftType::Set(_) => TType::Set,
            ThriftType::Map(_, _) => TType::Map,
            ThriftType::Coerced { wire, .. } => wire.wire_type(),
        }
    }
}

/// A stable reference to a struct descriptor slot in the catalog arena.
/// Handles stay valid across recursive construction, which is how mutually
/// recursive structs are representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructHandle {
    pub(crate) index: usize,
    pub(crate) ident: Arc<str>,
}

impl StructHandle {
    /// The user-domain type identifier this handle was registered under.
    pub fn ident(&self) -> &str {
        &self.ident
    }
}

/// Per-field policy controlling whether the field must appear on the wire.
/// `Unspecified` resolves to `None` for both struct fields and method
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requiredness {
    Required,
    Optional,
    None,
    Unspecified,
}

impl Requiredness {
    pub(crate) fn resolve(self) -> Requiredness {
        match self {
            Requiredness::Unspecified => Requiredness::None,
            other => other,
        }
    }
}

/// Distinguishes ordinary fields from the union discriminator pseudo-field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    ThriftField,
    ThriftUnionId,
}

/// Where a decoded field value is delivered during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// Positional argument of the designated constructor (or, for method
    /// parameters, of the handler invocation).
    ConstructorParameter { index: usize },
    /// A named setter operation.
    Setter { name: String },
    /// Direct field assignment.
    Field { name: String },
}

/// Where a field value is produced from during write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Getter { name: String },
    Field { name: String },
}

/// One field of a struct, union, exception, or parameter list.
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    pub id: i16,
    pub name: String,
    pub requiredness: Requiredness,
    pub ttype: ThriftType,
    pub kind: FieldKind,
    pub injections: Vec<Injection>,
    pub extraction: Option<Extraction>,
}

impl FieldMetadata {
    /// An ordinary field injected and extracted through direct field
    /// access, the common case for hand-written descriptors.
    pub fn new(id: i16, name: &str, ttype: ThriftType) -> Self {
        FieldMetadata {
            id,
            name: String::from(name),
            requiredness: Requiredness::Unspecified,
            ttype,
            kind: FieldKind::ThriftField,
            injections: vec![Injection::Field {
                name: String::from(name),
            }],
            extraction: Some(Extraction::Field {
                name: String::from(name),
            }),
        }
    }

    pub fn requiredness(mut self, requiredness: Requiredness) -> Self {
        self.requiredness = requiredness;
        self
    }
}

/// The protocol category a struct descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructCategory {
    Struct,
    Union,
    Exception,
}

/// How a decoded value is assembled, resolved deterministically at build
/// time: a designated constructor wins over a builder, which wins over
/// default construction with per-field injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionPlan {
    /// Designated constructor taking the listed fields, by id, in
    /// parameter order.
    Constructor { params: Vec<i16> },
    /// Two-phase construction through a builder and a terminal build
    /// operation.
    Builder { build: String },
    /// Default construction followed by each field's injection, in id
    /// order.
    Fields,
}

/// The complete descriptor of a struct, union, or exception type.
#[derive(Debug)]
pub struct StructMetadata {
    name: String,
    category: StructCategory,
    fields: Vec<FieldMetadata>,
    discriminator: Option<FieldMetadata>,
    plan: ConstructionPlan,
}

impl StructMetadata {
    pub fn builder(name: &str, category: StructCategory) -> StructMetadataBuilder {
        StructMetadataBuilder {
            name: String::from(name),
            category,
            fields: Vec::new(),
            discriminator: None,
            constructors: Vec::new(),
            builder_constructor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> StructCategory {
        self.category
    }

    /// Wire fields in id order. The union discriminator is not included.
    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    pub fn field_by_id(&self, id: i16) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn discriminator(&self) -> Option<&FieldMetadata> {
        self.discriminator.as_ref()
    }

    pub fn plan(&self) -> &ConstructionPlan {
        &self.plan
    }
}

/// Validating builder for [`StructMetadata`].
pub struct StructMetadataBuilder {
    name: String,
    category: StructCategory,
    fields: Vec<FieldMetadata>,
    discriminator: Option<FieldMetadata>,
    constructors: Vec<Vec<String>>,
    builder_constructor: Option<String>,
}

impl StructMetadataBuilder {
    /// Add a field with default (direct-access) injection and extraction.
    pub fn field(self, id: i16, name: &str, ttype: ThriftType) -> Self {
        self.field_meta(FieldMetadata::new(id, name, ttype))
    }

    pub fn required(self, id: i16, name: &str, ttype: ThriftType) -> Self {
        self.field_meta(
            FieldMetadata::new(id, name, ttype)
                .requiredness(Requiredness::Required),
        )
    }

    pub fn optional(self, id: i16, name: &str, ttype: ThriftType) -> Self {
        self.field_meta(
            FieldMetadata::new(id, name, ttype)
                .requiredness(Requiredness::Optional),
        )
    }

    /// Add a fully specified field.
    pub fn field_meta(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    /// Record the union discriminator pseudo-field. Its value identifies
    /// which branch of the union is present; it is never written to the
    /// wire.
    pub fn union_discriminator(mut self, name: &str) -> Self {
        self.discriminator = Some(FieldMetadata {
            id: UNION_ID_FIELD_ID,
            name: String::from(name),
            requiredness: Requiredness::None,
            ttype: ThriftType::I16,
            kind: FieldKind::ThriftUnionId,
            injections: vec![Injection::Field {
                name: String::from(name),
            }],
            extraction: None,
        });
        self
    }

    /// Mark a designated constructor taking the named fields in parameter
    /// order. Marking more than one is a metadata error.
    pub fn designated_constructor(mut self, params: &[&str]) -> Self {
        self.constructors
            .push(params.iter().map(|p| String::from(*p)).collect());
        self
    }

    /// Mark two-phase construction through a builder with the given
    /// terminal build operation.
    pub fn builder_constructor(mut self, build: &str) -> Self {
        self.builder_constructor = Some(String::from(build));
        self
    }

    pub fn build(self) -> Result<StructMetadata, MetadataError> {
        let mut fields = self.fields;

        let mut ids = BTreeSet::new();
        let mut names = BTreeSet::new();
        for field in &fields {
            if field.id < 0 {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidFieldId,
                    &self.name,
                    format!("field {} has negative id {}", field.name, field.id),
                ));
            }
            if !ids.insert(field.id) {
                return Err(MetadataError::new(
                    MetadataErrorKind::DuplicateFieldId,
                    &self.name,
                    format!("field id {} declared more than once", field.id),
                ));
            }
            if !names.insert(field.name.clone()) {
                return Err(MetadataError::new(
                    MetadataErrorKind::DuplicateFieldName,
                    &self.name,
                    format!("field name {} declared more than once", field.name),
                ));
            }
        }

        if self.constructors.len() > 1 {
            return Err(MetadataError::new(
                MetadataErrorKind::MultipleConstructors,
                &self.name,
                format!(
                    "{} constructors marked as designated",
                    self.constructors.len()
                ),
            ));
        }

        let struct_name = self.name.clone();
        let constructors = self.constructors;
        let plan = if let Some(params) = constructors.into_iter().next() {
            let mut param_ids = Vec::with_capacity(params.len());
            for (index, param) in params.iter().enumerate() {
                let field = fields
                    .iter_mut()
                    .find(|f| f.name == *param)
                    .ok_or_else(|| {
                        MetadataError::new(
                            MetadataErrorKind::UnknownConstructorParameter,
                            &struct_name,
                            format!(
                                "constructor parameter {} is not a declared \
                                 field",
                                param
                            ),
                        )
                    })?;
                field.injections =
                    vec![Injection::ConstructorParameter { index }];
                param_ids.push(field.id);
            }
            ConstructionPlan::Constructor { params: param_ids }
        } else if let Some(build) = self.builder_constructor {
            for field in &mut fields {
                field.injections = vec![Injection::Setter {
                    name: field.name.clone(),
                }];
            }
            ConstructionPlan::Builder { build }
        } else {
            ConstructionPlan::Fields
        };

        for field in &mut fields {
            field.requiredness = field.requiredness.resolve();
        }
        fields.sort_by_key(|f| f.id);

        Ok(StructMetadata {
            name: self.name,
            category: self.category,
            fields,
            discriminator: self.discriminator,
            plan,
        })
    }
}

/// The descriptor of an enum type. Enums are encoded as `I32`; an enum
/// with explicit wire values maps through its value table, otherwise
/// constants are numbered by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumMetadata {
    name: String,
    variants: EnumVariants,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EnumVariants {
    Explicit {
        by_value: BTreeMap<i32, String>,
        by_constant: BTreeMap<String, i32>,
    },
    Implicit {
        constants: Vec<String>,
    },
}

impl EnumMetadata {
    /// An enum whose constants carry explicit wire values.
    pub fn explicit(
        name: &str,
        constants: &[(i32, &str)],
    ) -> Result<Arc<EnumMetadata>, MetadataError> {
        let mut by_value = BTreeMap::new();
        let mut by_constant = BTreeMap::new();
        for (value, constant) in constants {
            if by_value.insert(*value, String::from(*constant)).is_some() {
                return Err(MetadataError::new(
                    MetadataErrorKind::DuplicateFieldId,
                    name,
                    format!("enum value {} declared more than once", value),
                ));
            }
            if by_constant.insert(String::from(*constant), *value).is_some() {
                return Err(MetadataError::new(
                    MetadataErrorKind::DuplicateFieldName,
                    name,
                    format!("enum constant {} declared more than once", constant),
                ));
            }
        }
        Ok(Arc::new(EnumMetadata {
            name: String::from(name),
            variants: EnumVariants::Explicit {
                by_value,
                by_constant,
            },
        }))
    }

    /// An enum whose constants are numbered by ordinal.
    pub fn implicit(name: &str, constants: &[&str]) -> Arc<EnumMetadata> {
        Arc::new(EnumMetadata {
            name: String::from(name),
            variants: EnumVariants::Implicit {
                constants: constants.iter().map(|c| String::from(*c)).collect(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.variants, EnumVariants::Explicit { .. })
    }

    /// Whether the wire value maps to a constant of this enum.
    pub fn contains_value(&self, value: i32) -> bool {
        if value < 0 {
            return false;
        }
        match &self.variants {
            EnumVariants::Explicit { by_value, .. } => {
                by_value.contains_key(&value)
            }
            EnumVariants::Implicit { constants } => {
                (value as usize) < constants.len()
            }
        }
    }

    pub fn constant_of(&self, value: i32) -> Option<&str> {
        match &self.variants {
            EnumVariants::Explicit { by_value, .. } => {
                by_value.get(&value).map(String::as_str)
            }
            EnumVariants::Implicit { constants } => {
                constants.get(value as usize).map(String::as_str)
            }
        }
    }

    pub fn value_of(&self, constant: &str) -> Option<i32> {
        match &self.variants {
            EnumVariants::Explicit { by_constant, .. } => {
                by_constant.get(constant).copied()
            }
            EnumVariants::Implicit { constants } => constants
                .iter()
                .position(|c| c == constant)
                .map(|p| p as i32),
        }
    }
}

/// The descriptor of one service method.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    name: String,
    qualified_name: String,
    return_type: ThriftType,
    parameters: Vec<FieldMetadata>,
    exceptions: BTreeMap<i16, ThriftType>,
    oneway: bool,
    asynchronous: bool,
}

impl MethodMetadata {
    pub fn builder(service: &str, name: &str) -> MethodMetadataBuilder {
        MethodMetadataBuilder {
            service: String::from(service),
            name: String::from(name),
            return_type: ThriftType::Void,
            parameters: Vec::new(),
            exceptions: Vec::new(),
            oneway: false,
            asynchronous: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn return_type(&self) -> &ThriftType {
        &self.return_type
    }

    /// Parameters in declaration order; field ids default to position + 1.
    pub fn parameters(&self) -> &[FieldMetadata] {
        &self.parameters
    }

    pub fn exceptions(&self) -> &BTreeMap<i16, ThriftType> {
        &self.exceptions
    }

    pub fn oneway(&self) -> bool {
        self.oneway
    }

    pub fn asynchronous(&self) -> bool {
        self.asynchronous
    }
}

/// Validating builder for [`MethodMetadata`].
pub struct MethodMetadataBuilder {
    service: String,
    name: String,
    return_type: ThriftType,
    parameters: Vec<FieldMetadata>,
    exceptions: Vec<(Option<i16>, ThriftType)>,
    oneway: bool,
    asynchronous: bool,
}

impl MethodMetadataBuilder {
    /// Add a parameter with the default field id (position + 1).
    pub fn param(self, name: &str, ttype: ThriftType) -> Self {
        let id = self.parameters.len() as i16 + 1;
        self.param_with_id(id, name, ttype)
    }

    /// Add a parameter with an explicit field id.
    pub fn param_with_id(
        mut self,
        id: i16,
        name: &str,
        ttype: ThriftType,
    ) -> Self {
        let index = self.parameters.len();
        self.parameters.push(FieldMetadata {
            id,
            name: String::from(name),
            requiredness: Requiredness::Unspecified,
            ttype,
            kind: FieldKind::ThriftField,
            injections: vec![Injection::ConstructorParameter { index }],
            extraction: None,
        });
        self
    }

    pub fn returns(mut self, ttype: ThriftType) -> Self {
        self.return_type = ttype;
        self
    }

    /// Declare an exception without an explicit id. Allowed only when it
    /// is the single declared custom exception; its id becomes 1.
    pub fn throws(mut self, ttype: ThriftType) -> Self {
        self.exceptions.push((None, ttype));
        self
    }

    pub fn throws_with_id(mut self, id: i16, ttype: ThriftType) -> Self {
        self.exceptions.push((Some(id), ttype));
        self
    }

    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn build(self) -> Result<MethodMetadata, MetadataError> {
        let qualified_name = format!("{}.{}", self.service, self.name);

        let mut ids = BTreeSet::new();
        let mut parameters = self.parameters;
        for param in &mut parameters {
            if param.id < 0 {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidFieldId,
                    &qualified_name,
                    format!(
                        "parameter {} has negative id {}",
                        param.name, param.id
                    ),
                ));
            }
            if !ids.insert(param.id) {
                return Err(MetadataError::new(
                    MetadataErrorKind::DuplicateFieldId,
                    &qualified_name,
                    format!("parameter id {} declared more than once", param.id),
                ));
            }
            param.requiredness = param.requiredness.resolve();
        }

        let mut exceptions = BTreeMap::new();
        let inferred = self.exceptions.len() == 1;
        for (declared_id, ttype) in self.exceptions {
            let id = match declared_id {
                Some(id) => id,
                None if inferred => 1,
                None => {
                    return Err(MetadataError::new(
                        MetadataErrorKind::InvalidExceptionId,
                        &qualified_name,
                        "exception ids must be explicit when more than one \
                         custom exception is declared",
                    ));
                }
            };
            if exceptions.insert(id, ttype).is_some() {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidExceptionId,
                    &qualified_name,
                    format!("exception id {} declared more than once", id),
                ));
            }
        }

        if self.oneway
            && (self.return_type != ThriftType::Void || !exceptions.is_empty())
        {
            return Err(MetadataError::new(
                MetadataErrorKind::InvalidTypeCategory,
                &qualified_name,
                "oneway methods cannot return a value or declare exceptions",
            ));
        }

        Ok(MethodMetadata {
            name: self.name,
            qualified_name,
            return_type: self.return_type,
            parameters,
            exceptions,
            oneway: self.oneway,
            asynchronous: self.asynchronous,
        })
    }
}
