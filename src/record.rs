//! Struct/union layout: named and anonymous records, member lists with
//! offsets, and field lookup with transparent descent into anonymous
//! members.

use crate::error::{CompileError, Result};
use crate::types::{Type, ARRAY_INDETERMINATE};

/// Index into `RecordTable`. Types reference records by id rather than by
/// owning them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(usize);

#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: i32,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub is_struct: bool,
    pub members: Option<Vec<Member>>,
    size: Option<i32>,
}

impl Record {
    pub fn is_complete(&self) -> bool {
        self.members.is_some()
    }
}

pub struct RecordTable {
    records: Vec<Record>,
}

impl RecordTable {
    pub fn new() -> Self {
        RecordTable { records: Vec::new() }
    }

    /// Registers a new, incomplete record (a forward declaration).
    pub fn declare(&mut self, name: &str, is_struct: bool) -> RecordId {
        let id = RecordId(self.records.len());
        self.records.push(Record {
            name: name.to_string(),
            is_struct,
            members: None,
            size: None,
        });
        id
    }

    pub fn get(&self, id: RecordId) -> &Record {
        &self.records[id.0]
    }

    pub fn size(&self, id: RecordId) -> Result<i32> {
        self.records[id.0].size.ok_or_else(|| {
            CompileError::fatal(format!(
                "Cannot take the size of incomplete type `{}`.",
                describe(&self.records[id.0])
            ))
        })
    }

    /// Installs the member list on a declared-but-incomplete record,
    /// computing offsets, applying the trailing-flexible-array rewrite, and
    /// rounding the total size up to a 4-byte multiple.
    ///
    /// A nested member can only reference a record *other* than `id` itself
    /// (value-type self-reference would be infinite size), so resolving
    /// nested sizes only ever needs already-completed entries already in
    /// `self.records` — no size for `id` needs to exist yet.
    pub fn install_members(&mut self, id: RecordId, mut members: Vec<Member>) -> Result<()> {
        if self.records[id.0].is_complete() {
            return Err(CompileError::fatal(format!(
                "`{}` is already defined.",
                describe(&self.records[id.0])
            )));
        }
        let is_struct = self.records[id.0].is_struct;

        // Rewrite a trailing indeterminate-length array to length 0 so its
        // size (and therefore the record's size) is well-defined.
        if let Some(last) = members.last_mut() {
            if last.ty.array_length == ARRAY_INDETERMINATE {
                last.ty = last.ty.set_array_length(0);
            }
        }

        let records = &self.records;
        let record_size = |rid: RecordId| -> Result<i32> {
            records[rid.0].size.ok_or_else(|| {
                CompileError::fatal(format!(
                    "Cannot take the size of incomplete type `{}`.",
                    describe(&records[rid.0])
                ))
            })
        };

        let mut offset = 0i32;
        let mut max_size = 0i32;
        for member in &mut members {
            if is_struct {
                let align = member.ty.alignment(record_size)?;
                offset = round_up(offset, align);
                member.offset = offset;
                offset += member.ty.size(record_size)?;
            } else {
                member.offset = 0;
                max_size = max_size.max(member.ty.size(record_size)?);
            }
        }
        let total = if is_struct { offset } else { max_size };
        let total = round_up(total, 4);

        self.records[id.0].members = Some(members);
        self.records[id.0].size = Some(total);
        Ok(())
    }

    /// Finds a member by name, descending transparently into anonymous
    /// (nested, unnamed) members when the direct lookup misses.
    pub fn find_member(&self, id: RecordId, name: &str) -> Option<Member> {
        let record = &self.records[id.0];
        let members = record.members.as_ref()?;
        for member in members {
            if member.name == name {
                return Some(member.clone());
            }
            if member.name.is_empty() && member.ty.is_record() {
                if let Some(nested_id) = member.ty.record {
                    if let Some(mut nested) = self.find_member(nested_id, name) {
                        nested.offset += member.offset;
                        return Some(nested);
                    }
                }
            }
        }
        None
    }
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(record: &Record) -> String {
    let kind = if record.is_struct { "struct" } else { "union" };
    if record.name.is_empty() {
        format!("anonymous {kind}")
    } else {
        format!("{kind} {}", record.name)
    }
}

fn round_up(value: i32, multiple: i32) -> i32 {
    if multiple <= 1 {
        return value;
    }
    (value + multiple - 1) / multiple * multiple
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseKind;

    #[test]
    fn struct_layout_pads_for_alignment() {
        let mut table = RecordTable::new();
        let id = table.declare("S", true);
        let members = vec![
            Member {
                name: "a".into(),
                ty: Type::new_base(BaseKind::SignedInt),
                offset: 0,
            },
            Member {
                name: "b".into(),
                ty: Type::new_base(BaseKind::SignedChar),
                offset: 0,
            },
            Member {
                name: "c".into(),
                ty: Type::new_base(BaseKind::SignedShort).set_array_length(ARRAY_INDETERMINATE),
                offset: 0,
            },
        ];
        table.install_members(id, members).unwrap();
        assert_eq!(table.size(id).unwrap(), 8);
        let found = table.find_member(id, "b").unwrap();
        assert_eq!(found.offset, 4);
    }

    #[test]
    fn union_members_all_share_offset_zero() {
        let mut table = RecordTable::new();
        let id = table.declare("U", false);
        let members = vec![
            Member {
                name: "a".into(),
                ty: Type::new_base(BaseKind::SignedInt),
                offset: 0,
            },
            Member {
                name: "b".into(),
                ty: Type::new_base(BaseKind::SignedChar),
                offset: 0,
            },
        ];
        table.install_members(id, members).unwrap();
        assert_eq!(table.size(id).unwrap(), 4);
        assert_eq!(table.find_member(id, "b").unwrap().offset, 0);
    }

    #[test]
    fn anonymous_member_lookup_descends_and_sums_offsets() {
        let mut table = RecordTable::new();
        let inner = table.declare("", true);
        table
            .install_members(
                inner,
                vec![Member {
                    name: "x".into(),
                    ty: Type::new_base(BaseKind::SignedInt),
                    offset: 0,
                }],
            )
            .unwrap();

        let outer = table.declare("Outer", true);
        let members = vec![
            Member {
                name: "tag".into(),
                ty: Type::new_base(BaseKind::SignedInt),
                offset: 0,
            },
            Member {
                name: "".into(),
                ty: Type::new_record(inner),
                offset: 0,
            },
        ];
        table.install_members(outer, members).unwrap();

        let found = table.find_member(outer, "x").unwrap();
        assert_eq!(found.offset, 4);
    }

    #[test]
    fn sizeof_incomplete_record_is_fatal() {
        let mut table = RecordTable::new();
        let id = table.declare("S", true);
        assert!(table.size(id).is_err());
    }
}
