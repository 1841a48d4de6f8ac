// Copyright 2026 Joyent, Inc.

//! Resolves a codec for any [`ThriftType`], memoizing the result.
//!
//! Lookups take a shared read lock; codec construction is serialized by a
//! build lock, and only fully constructed codecs are published to the
//! shared table. Recursive struct types are handled with a delegate: the
//! slot a struct's own fields see during construction forwards to the
//! finished codec once it exists. The delegate never escapes the build in
//! an unfilled state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::codec::{
    BinaryCodec, BoolCodec, CoercionCodec, DoubleCodec, EnumCodec, I16Codec,
    I32Codec, I64Codec, I8Codec, ListCodec, MapCodec, SetCodec, StringCodec,
    StructCodec, ThriftCodec,
};
use crate::errors::{
    MetadataError, MetadataErrorKind, ProtocolError,
};
use crate::metadata::{ThriftType, TypeCatalog};
use crate::protocol::{ProtocolReader, ProtocolWriter};
use crate::value::ThriftValue;

/// Stands in for a struct codec while that codec's own fields are being
/// resolved, then forwards to it.
struct DelegateCodec {
    ttype: ThriftType,
    inner: OnceLock<Arc<dyn ThriftCodec>>,
}

impl DelegateCodec {
    fn new(ttype: ThriftType) -> Self {
        DelegateCodec {
            ttype,
            inner: OnceLock::new(),
        }
    }

    fn target(&self) -> Result<&Arc<dyn ThriftCodec>, ProtocolError> {
        self.inner.get().ok_or_else(|| {
            ProtocolError::invalid("recursive codec used before registration")
        })
    }
}

impl ThriftCodec for DelegateCodec {
    fn thrift_type(&self) -> &ThriftType {
        &self.ttype
    }

    fn read(
        &self,
        reader: &mut dyn ProtocolReader,
    ) -> Result<ThriftValue, ProtocolError> {
        self.target()?.read(reader)
    }

    fn write(
        &self,
        value: &ThriftValue,
        writer: &mut dyn ProtocolWriter,
    ) -> Result<(), ProtocolError> {
        self.target()?.write(value, writer)
    }
}

/// Shared codec resolution over a [`TypeCatalog`].
pub struct CodecRegistry {
    catalog: Arc<TypeCatalog>,
    codecs: RwLock<HashMap<ThriftType, Arc<dyn ThriftCodec>>>,
    build_lock: Mutex<()>,
}

impl CodecRegistry {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        CodecRegistry {
            catalog,
            codecs: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// The codec for `ttype`, constructing and memoizing it on first
    /// request.
    pub fn codec_for(
        &self,
        ttype: &ThriftType,
    ) -> Result<Arc<dyn ThriftCodec>, MetadataError> {
        if let Some(codec) = self.published(ttype) {
            return Ok(codec);
        }

        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // another caller may have built it while we waited
        if let Some(codec) = self.published(ttype) {
            return Ok(codec);
        }

        let mut building = HashMap::new();
        self.build(ttype, &mut building)
    }

    fn published(&self, ttype: &ThriftType) -> Option<Arc<dyn ThriftCodec>> {
        let codecs = self.codecs.read().unwrap_or_else(|e| e.into_inner());
        codecs.get(ttype).cloned()
    }

    fn publish(&self, ttype: ThriftType, codec: Arc<dyn ThriftCodec>) {
        let mut codecs = self.codecs.write().unwrap_or_else(|e| e.into_inner());
        codecs.insert(ttype, codec);
    }

    fn build(
        &self,
        ttype: &ThriftType,
        building: &mut HashMap<ThriftType, Arc<DelegateCodec>>,
    ) -> Result<Arc<dyn ThriftCodec>, MetadataError> {
        if let Some(codec) = self.published(ttype) {
            return Ok(codec);
        }
        if let Some(delegate) = building.get(ttype) {
            return Ok(delegate.clone());
        }

        let codec: Arc<dyn ThriftCodec> = match ttype {
            ThriftType::Bool => Arc::new(BoolCodec),
            ThriftType::I8 => Arc::new(I8Codec),
            ThriftType::I16 => Arc::new(I16Codec),
            ThriftType::I32 => Arc::new(I32Codec),
            ThriftType::I64 => Arc::new(I64Codec),
            ThriftType::Double => Arc::new(DoubleCodec),
            ThriftType::String => Arc::new(StringCodec),
            ThriftType::Binary => Arc::new(BinaryCodec),
            ThriftType::Enum(metadata) => {
                Arc::new(EnumCodec::new(metadata.clone()))
            }
            ThriftType::List(element) => Arc::new(ListCodec::new(
                element.as_ref().clone(),
                self.build(element, building)?,
            )),
            ThriftType::Set(element) => Arc::new(SetCodec::new(
                element.as_ref().clone(),
                self.build(element, building)?,
            )),
            ThriftType::Map(key, value) => Arc::new(MapCodec::new(
                key.as_ref().clone(),
                value.as_ref().clone(),
                self.build(key, building)?,
                self.build(value, building)?,
            )),
            ThriftType::Struct(handle) => {
                let metadata = self.catalog.resolve(handle)?;
                let delegate = Arc::new(DelegateCodec::new(ttype.clone()));
                building.insert(ttype.clone(), delegate.clone());

                let mut field_codecs = Vec::with_capacity(
                    metadata.fields().len(),
                );
                for field in metadata.fields() {
                    field_codecs.push(self.build(&field.ttype, building)?);
                }

                building.remove(ttype);
                let codec: Arc<dyn ThriftCodec> = Arc::new(StructCodec::new(
                    ttype.clone(),
                    metadata,
                    field_codecs,
                ));
                // close the loop for any field codecs holding the delegate
                let _ = delegate.inner.set(codec.clone());
                codec
            }
            ThriftType::Coerced { ident, wire } => {
                let coercion =
                    self.catalog.coercion(ident).ok_or_else(|| {
                        MetadataError::new(
                            MetadataErrorKind::UnresolvedType,
                            ident,
                            "no coercion registered for this type",
                        )
                    })?;
                Arc::new(CoercionCodec::new(
                    ident,
                    self.build(wire, building)?,
                    coercion,
                ))
            }
            ThriftType::Void => {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidTypeCategory,
                    "void",
                    "void is a return type only and has no codec",
                ));
            }
        };

        self.publish(ttype.clone(), codec.clone());
        Ok(codec)
    }
}
