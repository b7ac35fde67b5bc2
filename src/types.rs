//! The opC value type: a closed set of primitive bases plus pointer depth,
//! array length, and an optional record reference, carried by value
//! throughout expression parsing.

use crate::error::{CompileError, Result};
use crate::record::RecordId;

/// "Not an array."
pub const ARRAY_NONE: i32 = -1;
/// "`[]` with no length yet; fixed up when the enclosing record/array is
/// closed."
pub const ARRAY_INDETERMINATE: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Void,
    SignedChar,
    UnsignedChar,
    SignedShort,
    UnsignedShort,
    SignedInt,
    UnsignedInt,
    Record,
}

impl BaseKind {
    /// Size in bytes of a scalar of this base. Pointers and arrays are
    /// handled separately by `Type::size`.
    fn scalar_size(self) -> i32 {
        match self {
            BaseKind::Void => 1,
            BaseKind::SignedChar | BaseKind::UnsignedChar => 1,
            BaseKind::SignedShort | BaseKind::UnsignedShort => 2,
            BaseKind::SignedInt | BaseKind::UnsignedInt => 4,
            BaseKind::Record => panic!("BaseKind::Record has no fixed scalar size"),
        }
    }
}

/// `T = (base, pointer_depth, array_length, record, is_lvalue)`.
///
/// Indirection count is `pointer_depth + (array_length != ARRAY_NONE)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Type {
    pub base: BaseKind,
    pub pointer_depth: i32,
    pub array_length: i32,
    pub record: Option<RecordId>,
    pub is_lvalue: bool,
}

impl Type {
    pub fn new_base(base: BaseKind) -> Self {
        Type {
            base,
            pointer_depth: 0,
            array_length: ARRAY_NONE,
            record: None,
            is_lvalue: false,
        }
    }

    pub fn new_record(record: RecordId) -> Self {
        Type {
            base: BaseKind::Record,
            pointer_depth: 0,
            array_length: ARRAY_NONE,
            record: Some(record),
            is_lvalue: false,
        }
    }

    pub fn indirections(&self) -> i32 {
        self.pointer_depth + i32::from(self.is_array())
    }

    pub fn is_array(&self) -> bool {
        self.array_length != ARRAY_NONE
    }

    pub fn is_pointer(&self) -> bool {
        self.indirections() > 0
    }

    pub fn is_base(&self, base: BaseKind) -> bool {
        self.indirections() == 0 && self.base == base
    }

    pub fn is_record(&self) -> bool {
        self.indirections() == 0 && self.base == BaseKind::Record
    }

    pub fn is_integer(&self) -> bool {
        self.indirections() == 0 && !matches!(self.base, BaseKind::Void | BaseKind::Record)
    }

    pub fn is_signed(&self) -> bool {
        self.indirections() == 0
            && matches!(
                self.base,
                BaseKind::SignedChar | BaseKind::SignedShort | BaseKind::SignedInt
            )
    }

    pub fn is_unsigned(&self) -> bool {
        self.indirections() == 0
            && matches!(
                self.base,
                BaseKind::UnsignedChar | BaseKind::UnsignedShort | BaseKind::UnsignedInt
            )
    }

    pub fn is_void_pointer(&self) -> bool {
        self.indirections() == 1 && self.base == BaseKind::Void
    }

    pub fn set_lvalue(mut self, lvalue: bool) -> Self {
        self.is_lvalue = lvalue;
        self
    }

    pub fn set_array_length(mut self, length: i32) -> Self {
        self.array_length = length;
        self
    }

    pub fn increment_pointers(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    /// Decays an array to a pointer to its first element. A no-op on
    /// non-arrays.
    pub fn decay_array(mut self) -> Self {
        if self.is_array() {
            self.array_length = ARRAY_NONE;
            self.pointer_depth += 1;
        }
        self
    }

    /// Removes one level of indirection: clears the array flag if present,
    /// otherwise decrements the pointer depth.
    pub fn decrement_indirection(mut self) -> Result<Self> {
        if self.is_array() {
            self.array_length = ARRAY_NONE;
        } else if self.pointer_depth > 0 {
            self.pointer_depth -= 1;
        } else {
            return Err(CompileError::fatal(
                "Cannot dereference a non-pointer, non-array type.",
            ));
        }
        Ok(self)
    }

    /// Size in bytes. `record_size` looks up the completed size of a record
    /// type; it is fatal to call this on an incomplete record.
    pub fn size(&self, record_size: impl Fn(RecordId) -> Result<i32>) -> Result<i32> {
        if self.indirections() > 0 {
            if self.array_length > ARRAY_NONE {
                if self.array_length == 0 {
                    return Ok(0);
                }
                let elem = (*self).set_array_length(ARRAY_NONE);
                return Ok(elem.size(record_size)? * self.array_length);
            }
            return Ok(4);
        }
        if self.base == BaseKind::Record {
            let id = self
                .record
                .ok_or_else(|| CompileError::fatal("Internal error: record type with no id."))?;
            return record_size(id);
        }
        Ok(self.base.scalar_size())
    }

    pub fn alignment(&self, record_size: impl Fn(RecordId) -> Result<i32>) -> Result<i32> {
        if self.indirections() > 0
            || self.base == BaseKind::SignedInt
            || self.base == BaseKind::UnsignedInt
        {
            return Ok(4);
        }
        if self.base == BaseKind::Record {
            return Ok(4);
        }
        self.size(record_size)
    }

    /// Structural equality on all five fields.
    pub fn equal(&self, other: &Type) -> bool {
        self == other
    }

    /// Under-checked compatibility: equal, or same base/indirection (arrays
    /// decay), or both pointers with at least one `void*`, or at least one
    /// side is a plain integer (accepts the literal-zero-is-null idiom).
    pub fn is_compatible(&self, other: &Type) -> bool {
        if self.equal(other) {
            return true;
        }
        let a = self.decay_array();
        let b = other.decay_array();
        if a.base == b.base && a.pointer_depth == b.pointer_depth {
            return true;
        }
        if a.is_pointer() && b.is_pointer() && (a.is_void_pointer() || b.is_void_pointer()) {
            return true;
        }
        if (a.is_integer() && a.indirections() == 0) || (b.is_integer() && b.indirections() == 0) {
            return true;
        }
        false
    }
}

/// Promotes `base` narrower than `int` up to `int`, preserving signedness.
pub fn promoted_base(base: BaseKind) -> BaseKind {
    match base {
        BaseKind::SignedChar | BaseKind::SignedShort => BaseKind::SignedInt,
        BaseKind::UnsignedChar | BaseKind::UnsignedShort => BaseKind::SignedInt,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_size(_: RecordId) -> Result<i32> {
        unreachable!()
    }

    #[test]
    fn sizeof_void_is_one() {
        let t = Type::new_base(BaseKind::Void);
        assert_eq!(t.size(int_size).unwrap(), 1);
    }

    #[test]
    fn sizeof_pointer_is_four_regardless_of_pointee() {
        let t = Type::new_base(BaseKind::SignedChar).increment_pointers();
        assert_eq!(t.size(int_size).unwrap(), 4);
    }

    #[test]
    fn array_size_multiplies_element_size() {
        let t = Type::new_base(BaseKind::SignedInt).set_array_length(3);
        assert_eq!(t.size(int_size).unwrap(), 12);
    }

    #[test]
    fn decay_array_increments_pointer_depth() {
        let t = Type::new_base(BaseKind::SignedInt).set_array_length(5);
        let decayed = t.decay_array();
        assert!(!decayed.is_array());
        assert_eq!(decayed.pointer_depth, 1);
    }

    #[test]
    fn compatible_accepts_integer_against_pointer() {
        let p = Type::new_base(BaseKind::SignedInt).increment_pointers();
        let zero = Type::new_base(BaseKind::SignedInt);
        assert!(p.is_compatible(&zero));
    }
}
