//! Local symbol table: an ordered stack of block-scoped variables with
//! frame offsets, forward-shadowing lookup, and a frame-size query.

use crate::error::Result;
use crate::record::RecordId;
use crate::types::Type;

struct Local {
    name: String,
    ty: Type,
    offset: i32,
}

#[derive(Default)]
pub struct LocalStack {
    entries: Vec<Local>,
    lowest_offset: i32,
}

impl LocalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Adds a local at the next word-aligned offset below the current
    /// lowest, and returns `(offset, rounded_size)`: the location of the
    /// variable's first byte (relative to the frame pointer; always
    /// negative) and exactly how many bytes of stack space the caller must
    /// reserve for it via `sub rsp rsp rounded_size`.
    pub fn add(
        &mut self,
        name: String,
        ty: Type,
        record_size: impl Fn(RecordId) -> Result<i32>,
    ) -> Result<(i32, i32)> {
        let rounded = slot_size(&ty, record_size)?;
        self.lowest_offset -= rounded;
        let offset = self.lowest_offset;
        self.entries.push(Local { name, ty, offset });
        Ok((offset, rounded))
    }

    /// Looks up `name`, most-recently-declared first (so inner scopes
    /// shadow outer ones).
    pub fn find(&self, name: &str) -> Option<(Type, i32)> {
        self.entries
            .iter()
            .rev()
            .find(|local| local.name == name)
            .map(|local| (local.ty, local.offset))
    }

    /// Truncates the stack back to `depth`, releasing everything declared
    /// since, and restores the frame's low-water mark to what it was then.
    pub fn pop(&mut self, depth: usize) {
        self.entries.truncate(depth);
        self.lowest_offset = self.entries.last().map_or(0, |l| l.offset);
    }

    /// Absolute value of the deepest-assigned offset in the current extent:
    /// the number of bytes of frame space in use right now.
    pub fn frame_size(&self) -> i32 {
        self.lowest_offset.unsigned_abs() as i32
    }
}

fn round_up(value: i32, multiple: i32) -> i32 {
    (value + multiple - 1) / multiple * multiple
}

/// The number of stack bytes a variable of type `ty` occupies in a frame:
/// its size, rounded up to a word. Shared by `LocalStack::add` and the
/// codegen that emits the matching `sub rsp rsp ...`, so the two can never
/// drift apart.
pub fn slot_size(ty: &Type, record_size: impl Fn(RecordId) -> Result<i32>) -> Result<i32> {
    Ok(round_up(ty.size(record_size)?, 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseKind;

    fn no_nested(_: RecordId) -> Result<i32> {
        unreachable!()
    }

    #[test]
    fn offsets_are_negative_and_word_rounded() {
        let mut locals = LocalStack::new();
        let (o1, s1) = locals
            .add("a".into(), Type::new_base(BaseKind::SignedChar), no_nested)
            .unwrap();
        let (o2, s2) = locals
            .add("b".into(), Type::new_base(BaseKind::SignedInt), no_nested)
            .unwrap();
        assert_eq!(o1, -4);
        assert_eq!(s1, 4);
        assert_eq!(o2, -8);
        assert_eq!(s2, 4);
    }

    #[test]
    fn later_declarations_shadow_earlier_ones() {
        let mut locals = LocalStack::new();
        locals
            .add("x".into(), Type::new_base(BaseKind::SignedInt), no_nested)
            .unwrap();
        locals
            .add("x".into(), Type::new_base(BaseKind::SignedChar), no_nested)
            .unwrap();
        let (ty, _) = locals.find("x").unwrap();
        assert_eq!(ty.base, BaseKind::SignedChar);
    }

    #[test]
    fn pop_truncates_and_resets_empty_frame() {
        let mut locals = LocalStack::new();
        let depth = locals.depth();
        locals
            .add("x".into(), Type::new_base(BaseKind::SignedInt), no_nested)
            .unwrap();
        assert_eq!(locals.frame_size(), 4);
        locals.pop(depth);
        assert_eq!(locals.frame_size(), 0);
        assert!(locals.find("x").is_none());
    }
}
