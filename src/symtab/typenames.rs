//! Type-name registry: typedefs and tagged records, keyed by
//! `(name, kind)` since a typedef named `foo` and `struct foo` do not
//! collide.

use std::collections::HashMap;

use crate::record::RecordId;
use crate::types::{BaseKind, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Typedef,
    Struct,
    Union,
}

#[derive(Debug, Clone)]
pub enum TypeNameEntry {
    Typedef(Type),
    Record(RecordId),
}

#[derive(Default)]
pub struct TypeNameRegistry {
    entries: HashMap<(String, TagKind), TypeNameEntry>,
}

impl TypeNameRegistry {
    /// Builds a registry with the one pre-installed typedef every
    /// translation unit needs: `__builtin_va_list ≡ int*`, so `<stdarg.h>`
    /// works without the compiler needing real struct support for it.
    pub fn new() -> Self {
        let mut registry = TypeNameRegistry::default();
        let va_list = Type::new_base(BaseKind::SignedInt).increment_pointers();
        registry.add_typedef("__builtin_va_list".to_string(), va_list);
        registry
    }

    pub fn add_typedef(&mut self, name: String, ty: Type) {
        self.entries
            .entry((name, TagKind::Typedef))
            .or_insert(TypeNameEntry::Typedef(ty));
    }

    pub fn add_record(&mut self, name: String, kind: TagKind, id: RecordId) {
        debug_assert!(kind != TagKind::Typedef);
        self.entries
            .entry((name, kind))
            .or_insert(TypeNameEntry::Record(id));
    }

    pub fn find_typedef(&self, name: &str) -> Option<Type> {
        match self.entries.get(&(name.to_string(), TagKind::Typedef))? {
            TypeNameEntry::Typedef(ty) => Some(*ty),
            TypeNameEntry::Record(_) => None,
        }
    }

    pub fn find_record(&self, name: &str, kind: TagKind) -> Option<RecordId> {
        match self.entries.get(&(name.to_string(), kind))? {
            TypeNameEntry::Record(id) => Some(*id),
            TypeNameEntry::Typedef(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_va_list_is_int_pointer() {
        let registry = TypeNameRegistry::new();
        let ty = registry.find_typedef("__builtin_va_list").unwrap();
        assert_eq!(ty.base, BaseKind::SignedInt);
        assert_eq!(ty.pointer_depth, 1);
    }

    #[test]
    fn typedef_and_struct_tag_of_same_name_do_not_collide() {
        let mut records = crate::record::RecordTable::new();
        let id = records.declare("foo", true);

        let mut registry = TypeNameRegistry::new();
        registry.add_typedef("foo".into(), Type::new_base(BaseKind::SignedInt));
        registry.add_record("foo".into(), TagKind::Struct, id);
        assert!(registry.find_typedef("foo").is_some());
        assert!(registry.find_record("foo", TagKind::Struct).is_some());
    }
}
