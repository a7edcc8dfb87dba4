use crate::access::value::{Field, Type};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Location of a stored tuple: the page it lives on and its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot.cmp(&other.slot),
            other => other,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} slot {}", self.page_id, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TdItem {
    pub field_type: Type,
    pub name: Option<String>,
}

/// Ordered list of the field types (and optional names) of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(types: &[Type], names: &[&str]) -> Self {
        let items = types
            .iter()
            .enumerate()
            .map(|(i, t)| TdItem {
                field_type: *t,
                name: names.get(i).map(|n| n.to_string()),
            })
            .collect();
        Self { items }
    }

    pub fn unnamed(types: &[Type]) -> Self {
        Self::new(types, &[])
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Option<Type> {
        self.items.get(i).map(|item| item.field_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.name.as_deref())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    /// Size in bytes of one tuple with this descriptor.
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.size()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &TdItem> {
        self.items.iter()
    }
}

/// A row of typed fields, optionally tied to the slot it was read from.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Builds a tuple, checking the fields against `desc`.
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> StorageResult<Self> {
        if fields.len() != desc.num_fields() {
            return Err(StorageError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                desc.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if desc.field_type(i) != Some(field.field_type()) {
                return Err(StorageError::SchemaMismatch(format!(
                    "field {} is {:?}, descriptor says {:?}",
                    i,
                    field.field_type(),
                    desc.field_type(i)
                )));
            }
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> StorageResult<()> {
        if self.desc.field_type(i) != Some(field.field_type()) {
            return Err(StorageError::SchemaMismatch(format!(
                "cannot store {:?} in field {}",
                field.field_type(),
                i
            )));
        }
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Encodes the fields back to back; exactly `desc().size()` bytes.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            field.serialize(out);
        }
    }

    /// Decodes one tuple from the front of `data`.
    pub fn parse(desc: Arc<TupleDesc>, data: &[u8]) -> StorageResult<Self> {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(desc.num_fields());
        for item in desc.items() {
            let end = offset + item.field_type.size();
            if end > data.len() {
                return Err(StorageError::Corrupted("tuple truncated".to_string()));
            }
            fields.push(item.field_type.parse(&data[offset..end])?);
            offset = end;
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableId;

    fn int_string_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(&[Type::Int, Type::String], &["id", "name"]))
    }

    #[test]
    fn test_record_id_ordering() {
        let p0 = PageId::new(TableId(1), 0);
        let p1 = PageId::new(TableId(1), 1);

        assert!(RecordId::new(p0, 5) < RecordId::new(p0, 10));
        assert!(RecordId::new(p0, 10) < RecordId::new(p1, 0));
    }

    #[test]
    fn test_tuple_desc_lookup() {
        let desc = int_string_desc();
        assert_eq!(desc.num_fields(), 2);
        assert_eq!(desc.size(), 4 + 132);
        assert_eq!(desc.index_of("name"), Some(1));
        assert_eq!(desc.index_of("missing"), None);
        assert_eq!(desc.field_name(0), Some("id"));
        assert_eq!(desc.field_type(1), Some(Type::String));
        assert_eq!(desc.field_type(2), None);
    }

    #[test]
    fn test_tuple_rejects_wrong_schema() {
        let desc = int_string_desc();
        assert!(Tuple::new(desc.clone(), vec![Field::Int(1)]).is_err());
        assert!(Tuple::new(desc, vec![Field::Int(1), Field::Int(2)]).is_err());
    }

    #[test]
    fn test_tuple_bytes_are_desc_sized() -> StorageResult<()> {
        let desc = int_string_desc();
        let tuple = Tuple::new(
            desc.clone(),
            vec![Field::Int(7), Field::String("seven".to_string())],
        )?;

        let mut out = Vec::new();
        tuple.serialize(&mut out);
        assert_eq!(out.len(), desc.size());

        let parsed = Tuple::parse(desc, &out)?;
        assert_eq!(parsed, tuple);
        assert_eq!(parsed.record_id(), None);
        Ok(())
    }

    #[test]
    fn test_set_field_checks_type() -> StorageResult<()> {
        let desc = int_string_desc();
        let mut tuple = Tuple::new(desc, vec![Field::Int(1), Field::String("a".into())])?;

        tuple.set_field(0, Field::Int(2))?;
        assert_eq!(tuple.get_field(0), Some(&Field::Int(2)));
        assert!(tuple.set_field(0, Field::String("x".into())).is_err());
        Ok(())
    }
}
