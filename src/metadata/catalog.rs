// Copyright 2026 Joyent, Inc.

//! The type catalog: at most one descriptor per user-domain type.
//!
//! Struct descriptors live in an arena with stable indices. A slot is
//! inserted in the *building* state before its descriptor function runs,
//! so a type whose fields refer back to it (directly or through another
//! struct) receives a handle to the same slot instead of recursing
//! forever. Resolution of a handle whose slot is still building is a
//! metadata error; it can only happen if a codec is constructed while the
//! catalog is mid-registration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{MetadataError, MetadataErrorKind, ProtocolError};
use crate::metadata::{StructHandle, StructMetadata, ThriftType};
use crate::value::ThriftValue;

/// A reversible transform between a user-domain value and its wire
/// representation.
#[derive(Debug, Clone, Copy)]
pub struct Coercion {
    pub from_wire: fn(ThriftValue) -> Result<ThriftValue, ProtocolError>,
    pub to_wire: fn(&ThriftValue) -> Result<ThriftValue, ProtocolError>,
}

enum Slot {
    Building,
    Ready(Arc<StructMetadata>),
}

struct Inner {
    arena: Vec<Slot>,
    index: HashMap<String, usize>,
    coercions: HashMap<String, (ThriftType, Coercion)>,
}

/// Registry of type descriptors, shared and read-mostly after setup.
pub struct TypeCatalog {
    inner: RwLock<Inner>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        TypeCatalog::new()
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        TypeCatalog {
            inner: RwLock::new(Inner {
                arena: Vec::new(),
                index: HashMap::new(),
                coercions: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The canonical struct type for `ident`, constructing and memoizing
    /// the descriptor on first request. The descriptor function may call
    /// back into the catalog; a request for `ident` made during its own
    /// construction resolves to the slot being built.
    pub fn struct_type<F>(
        &self,
        ident: &str,
        describe: F,
    ) -> Result<ThriftType, MetadataError>
    where
        F: FnOnce(&TypeCatalog) -> Result<StructMetadata, MetadataError>,
    {
        let handle = {
            let mut inner = self.write();
            if let Some(&index) = inner.index.get(ident) {
                return Ok(ThriftType::Struct(StructHandle {
                    index,
                    ident: Arc::from(ident),
                }));
            }
            inner.arena.push(Slot::Building);
            let index = inner.arena.len() - 1;
            inner.index.insert(String::from(ident), index);
            StructHandle {
                index,
                ident: Arc::from(ident),
            }
        };

        match describe(self) {
            Ok(metadata) => {
                let mut inner = self.write();
                inner.arena[handle.index] = Slot::Ready(Arc::new(metadata));
                Ok(ThriftType::Struct(handle))
            }
            Err(err) => {
                // leave the arena slot orphaned so handles handed out
                // during the failed build cannot resolve
                let mut inner = self.write();
                inner.index.remove(ident);
                Err(err)
            }
        }
    }

    /// The memoized type for `ident`, if one has been registered.
    pub fn lookup(&self, ident: &str) -> Option<ThriftType> {
        let inner = self.read();
        inner.index.get(ident).map(|&index| {
            ThriftType::Struct(StructHandle {
                index,
                ident: Arc::from(ident),
            })
        })
    }

    /// Resolve a handle to its completed descriptor.
    pub fn resolve(
        &self,
        handle: &StructHandle,
    ) -> Result<Arc<StructMetadata>, MetadataError> {
        let inner = self.read();
        match inner.arena.get(handle.index) {
            Some(Slot::Ready(metadata)) => Ok(metadata.clone()),
            Some(Slot::Building) => Err(MetadataError::new(
                MetadataErrorKind::UnresolvedType,
                handle.ident(),
                "descriptor is still being built",
            )),
            None => Err(MetadataError::new(
                MetadataErrorKind::UnresolvedType,
                handle.ident(),
                "descriptor was never completed",
            )),
        }
    }

    /// Register a reversible coercion for a user-domain type carried on
    /// the wire as `wire`. Returns the coerced type; re-registration with
    /// the same wire type is idempotent.
    pub fn register_coercion(
        &self,
        ident: &str,
        wire: ThriftType,
        coercion: Coercion,
    ) -> Result<ThriftType, MetadataError> {
        let mut inner = self.write();
        if let Some((existing, _)) = inner.coercions.get(ident) {
            if *existing != wire {
                return Err(MetadataError::new(
                    MetadataErrorKind::InvalidTypeCategory,
                    ident,
                    "coercion already registered with a different wire type",
                ));
            }
            return Ok(ThriftType::Coerced {
                ident: String::from(ident),
                wire: Box::new(wire),
            });
        }
        inner
            .coercions
            .insert(String::from(ident), (wire.clone(), coercion));
        Ok(ThriftType::Coerced {
            ident: String::from(ident),
            wire: Box::new(wire),
        })
    }

    /// The coercion registered for `ident`, if any.
    pub fn coercion(&self, ident: &str) -> Option<Coercion> {
        let inner = self.read();
        inner.coercions.get(ident).map(|(_, coercion)| *coercion)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::StructCategory;

    fn simple(name: &str) -> Result<StructMetadata, MetadataError> {
        StructMetadata::builder(name, StructCategory::Struct)
            .field(1, "value", ThriftType::I32)
            .build()
    }

    #[test]
    fn struct_types_are_memoized() {
        let catalog = TypeCatalog::new();
        let first = catalog.struct_type("Bonk", |_| simple("Bonk")).unwrap();
        let second = catalog
            .struct_type("Bonk", |_| panic!("descriptor built twice"))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn recursive_types_resolve_to_the_same_slot() {
        let catalog = TypeCatalog::new();
        let tree = catalog
            .struct_type("TreeNode", |catalog| {
                // self-reference resolves to the building slot
                let this = catalog
                    .struct_type("TreeNode", |_| unreachable!())
                    .unwrap();
                StructMetadata::builder("TreeNode", StructCategory::Struct)
                    .field(1, "value", ThriftType::I32)
                    .field(2, "children", ThriftType::list(this))
                    .build()
            })
            .unwrap();

        let handle = match &tree {
            ThriftType::Struct(handle) => handle.clone(),
            other => panic!("expected struct type, got {:?}", other),
        };
        let metadata = catalog.resolve(&handle).unwrap();
        assert_eq!(
            metadata.field_by_id(2).unwrap().ttype,
            ThriftType::list(tree)
        );
    }

    #[test]
    fn resolving_a_building_slot_is_an_error() {
        let catalog = TypeCatalog::new();
        let result = catalog.struct_type("Loop", |catalog| {
            let this = catalog.struct_type("Loop", |_| unreachable!())?;
            let handle = match this {
                ThriftType::Struct(handle) => handle,
                _ => unreachable!(),
            };
            // resolving mid-build must fail instead of spinning
            catalog.resolve(&handle).map(|_| unreachable!())
        });
        let err = result.unwrap_err();
        assert_eq!(err.kind, MetadataErrorKind::UnresolvedType);
    }

    #[test]
    fn failed_builds_can_be_retried() {
        let catalog = TypeCatalog::new();
        let err = catalog.struct_type("Bad", |_| {
            StructMetadata::builder("Bad", StructCategory::Struct)
                .field(1, "a", ThriftType::I32)
                .field(1, "b", ThriftType::I32)
                .build()
        });
        assert!(err.is_err());
        assert!(catalog.lookup("Bad").is_none());

        assert!(catalog.struct_type("Bad", |_| simple("Bad")).is_ok());
    }

    #[test]
    fn coercions_are_registered_once() {
        let catalog = TypeCatalog::new();
        let coercion = Coercion {
            from_wire: |v| Ok(v),
            to_wire: |v| Ok(v.clone()),
        };
        let t1 = catalog
            .register_coercion("Instant", ThriftType::I64, coercion)
            .unwrap();
        let t2 = catalog
            .register_coercion("Instant", ThriftType::I64, coercion)
            .unwrap();
        assert_eq!(t1, t2);
        assert!(catalog.coercion("Instant").is_some());

        let conflict =
            catalog.register_coercion("Instant", ThriftType::String, coercion);
        assert!(conflict.is_err());
    }
}
