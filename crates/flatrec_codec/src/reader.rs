//! Zero-copy table reader.
//!
//! A [`Table`] is a view into a finished buffer plus the schema the reader was
//! compiled against. Nothing is copied or decoded up front; every accessor
//! checks the offsets it follows against the buffer before using them, so a
//! damaged or truncated buffer yields [`CodecError::CorruptBuffer`] instead of
//! a panic.
//!
//! Fields the reader's schema does not know are never looked at, and fields
//! the writer did not emit read back as their defaults.

use crate::error::{CodecError, CodecResult};
use crate::scalar::{Scalar, ScalarType, ScalarValue};
use crate::schema::{FieldDef, FieldKind, TableSchema, MAX_SCHEMA_DEPTH};
use std::fmt;
use std::marker::PhantomData;

/// Reads the root table of `buf`.
///
/// When `schema` declares an identifier it is compared with bytes 4..8 before
/// any field is read.
///
/// # Errors
///
/// Returns [`CodecError::SchemaMismatch`] if the identifier differs and
/// [`CodecError::CorruptBuffer`] if the root offset or the root table header
/// lies outside the buffer.
pub fn root<'a>(buf: &'a [u8], schema: &'a TableSchema) -> CodecResult<Table<'a>> {
    if let Some(expected) = schema.identifier {
        match buffer_identifier(buf) {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Err(CodecError::schema_mismatch(format!(
                    "buffer identifier {:?} does not match {:?} of table {}",
                    String::from_utf8_lossy(&actual),
                    String::from_utf8_lossy(&expected),
                    schema.name
                )));
            }
            None => {
                return Err(CodecError::corrupt(format!(
                    "buffer of {} bytes is too small for an identifier",
                    buf.len()
                )));
            }
        }
    }
    root_unchecked_identifier(buf, schema)
}

/// Reads the root table of `buf` without looking at the identifier.
///
/// # Errors
///
/// Returns [`CodecError::CorruptBuffer`] if the root offset or the root table
/// header lies outside the buffer.
pub fn root_unchecked_identifier<'a>(
    buf: &'a [u8],
    schema: &'a TableSchema,
) -> CodecResult<Table<'a>> {
    let offset = read_u32(buf, 0)? as usize;
    if offset == 0 {
        return Err(CodecError::corrupt("root offset is zero"));
    }
    Table::at(buf, offset, schema)
}

/// The 4-byte identifier at bytes 4..8, if the buffer is long enough.
#[must_use]
pub fn buffer_identifier(buf: &[u8]) -> Option<[u8; 4]> {
    buf.get(4..8).and_then(|bytes| bytes.try_into().ok())
}

/// Returns true if the buffer carries `identifier`.
#[must_use]
pub fn has_identifier(buf: &[u8], identifier: [u8; 4]) -> bool {
    buffer_identifier(buf) == Some(identifier)
}

/// Checks the whole buffer against `schema`.
///
/// Walks every present field of the root table and of nested tables and
/// reports the first structural problem found.
///
/// # Errors
///
/// Returns the error the first failing read would have produced, or
/// [`CodecError::MissingRequiredField`] for an absent required field.
pub fn verify(buf: &[u8], schema: &TableSchema) -> CodecResult<()> {
    root(buf, schema)?.verify()
}

/// A table inside a finished buffer.
#[derive(Clone, Copy)]
pub struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
    vtable: usize,
    vtable_len: usize,
    inline_size: usize,
    schema: &'a TableSchema,
}

impl<'a> Table<'a> {
    /// Reads the table header at `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptBuffer`] if the soffset, the vtable or the
    /// inline area of the table fall outside the buffer.
    pub fn at(buf: &'a [u8], pos: usize, schema: &'a TableSchema) -> CodecResult<Self> {
        let soffset = read_i32(buf, pos)?;
        let vtable = i64::try_from(pos)
            .ok()
            .map(|p| p - i64::from(soffset))
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                CodecError::corrupt(format!("vtable of table at {pos} lies before the buffer"))
            })?;
        let vtable_len = usize::from(read_u16(buf, vtable)?);
        let inline_size = usize::from(read_u16(buf, vtable + 2)?);
        if vtable_len < 4 || vtable_len % 2 != 0 {
            return Err(CodecError::corrupt(format!(
                "vtable at {vtable} has invalid size {vtable_len}"
            )));
        }
        check_range(buf, vtable, vtable_len, "vtable")?;
        if inline_size < 4 {
            return Err(CodecError::corrupt(format!(
                "table at {pos} has inline size {inline_size}"
            )));
        }
        check_range(buf, pos, inline_size, "table")?;
        Ok(Self {
            buf,
            pos,
            vtable,
            vtable_len,
            inline_size,
            schema,
        })
    }

    /// The schema this table is read with.
    #[must_use]
    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    /// The whole buffer the table lives in.
    #[must_use]
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Byte position of the table inside the buffer.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Byte position of the table's vtable.
    #[must_use]
    pub fn vtable_position(&self) -> usize {
        self.vtable
    }

    /// Inline size of the table as recorded in its vtable.
    #[must_use]
    pub fn inline_size(&self) -> usize {
        self.inline_size
    }

    /// Number of field slots in the vtable, including ones unknown to the
    /// schema.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        (self.vtable_len - 4) / 2
    }

    /// Raw vtable entries, one per slot.
    pub fn slots(&self) -> impl Iterator<Item = u16> + 'a {
        let buf = self.buf;
        let start = self.vtable + 4;
        (0..self.slot_count()).map(move |i| {
            let at = start + 2 * i;
            u16::from_le_bytes([buf[at], buf[at + 1]])
        })
    }

    /// Identity of the table across views of the same buffer in memory.
    pub(crate) fn address(&self) -> usize {
        self.buf.as_ptr() as usize + self.pos
    }

    /// Returns true if the writer emitted field `id`.
    #[must_use]
    pub fn is_present(&self, id: u16) -> bool {
        self.slot(id) != 0
    }

    fn slot(&self, id: u16) -> usize {
        let slot = 4 + 2 * usize::from(id);
        if slot + 2 > self.vtable_len {
            return 0;
        }
        let at = self.vtable + slot;
        usize::from(u16::from_le_bytes([self.buf[at], self.buf[at + 1]]))
    }

    /// Position of field `id` if present, checked to hold `size` bytes inside
    /// the table.
    fn field_position(&self, id: u16, size: usize) -> CodecResult<Option<usize>> {
        let offset = self.slot(id);
        if offset == 0 {
            return Ok(None);
        }
        if offset < 4 || offset + size > self.inline_size {
            return Err(CodecError::corrupt(format!(
                "field {id} at offset {offset} lies outside table of {} bytes",
                self.inline_size
            )));
        }
        Ok(Some(self.pos + offset))
    }

    /// Follows the uoffset stored in field `id`.
    fn deref(&self, id: u16) -> CodecResult<Option<usize>> {
        let Some(at) = self.field_position(id, 4)? else {
            return Ok(None);
        };
        let relative = read_u32(self.buf, at)? as usize;
        let target = at
            .checked_add(relative)
            .filter(|&t| relative > 0 && t < self.buf.len())
            .ok_or_else(|| {
                CodecError::corrupt(format!(
                    "field {id} points {relative} bytes past the buffer end"
                ))
            })?;
        Ok(Some(target))
    }

    fn field_def(&self, id: u16) -> CodecResult<&'a FieldDef> {
        let schema: &'a TableSchema = self.schema;
        schema.expect_field(id)
    }

    fn kind_error(&self, field: &FieldDef, wanted: &str) -> CodecError {
        CodecError::schema_mismatch(format!(
            "field {} of table {} is {}, read as {wanted}",
            field.name,
            self.schema.name,
            field.kind.describe()
        ))
    }

    /// Reads scalar field `id` as `T`, or its default when absent.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if the field is not a scalar of
    /// type `T`, and [`CodecError::CorruptBuffer`] if its slot points outside
    /// the table.
    pub fn get<T: Scalar>(&self, id: u16) -> CodecResult<T> {
        let field = self.field_def(id)?;
        match field.kind {
            FieldKind::Scalar(ty) if ty == T::TYPE => {}
            _ => return Err(self.kind_error(field, T::TYPE.name())),
        }
        match self.field_position(id, T::TYPE.size())? {
            Some(at) => Ok(T::read_le(&self.buf[at..])),
            None => field
                .default_value()
                .and_then(T::from_value)
                .ok_or_else(|| self.kind_error(field, T::TYPE.name())),
        }
    }

    /// Reads scalar field `id` with its schema type.
    ///
    /// # Errors
    ///
    /// See [`Table::get`].
    pub fn get_value(&self, id: u16) -> CodecResult<ScalarValue> {
        let field = self.field_def(id)?;
        let FieldKind::Scalar(ty) = field.kind else {
            return Err(self.kind_error(field, "scalar"));
        };
        match self.field_position(id, ty.size())? {
            Some(at) => Ok(ScalarValue::read_le(ty, &self.buf[at..])),
            None => Ok(field.default.unwrap_or(ty.zero())),
        }
    }

    /// Reads string field `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidUtf8`] if the bytes are not UTF-8, plus the
    /// errors of [`Table::string_bytes`].
    pub fn string(&self, id: u16) -> CodecResult<Option<&'a str>> {
        let Some(bytes) = self.string_bytes(id)? else {
            return Ok(None);
        };
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|_| {
                CodecError::invalid_utf8(self.schema.field(id).map_or("?", |f| f.name.as_ref()))
            })
    }

    /// Reads string field `id` as raw bytes, without the trailing zero.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if the field is not a string and
    /// [`CodecError::CorruptBuffer`] if the string does not fit the buffer.
    pub fn string_bytes(&self, id: u16) -> CodecResult<Option<&'a [u8]>> {
        let field = self.field_def(id)?;
        if field.kind != FieldKind::String {
            return Err(self.kind_error(field, "string"));
        }
        let Some(target) = self.deref(id)? else {
            return Ok(None);
        };
        let len = read_u32(self.buf, target)? as usize;
        let start = target + 4;
        check_range(self.buf, start, len.saturating_add(1), "string")?;
        if self.buf[start + len] != 0 {
            return Err(CodecError::corrupt(format!(
                "string field {} is missing its terminator",
                field.name
            )));
        }
        Ok(Some(&self.buf[start..start + len]))
    }

    /// Reads vector field `id` as a typed view.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if the field is not a vector of
    /// `T` and [`CodecError::CorruptBuffer`] if it does not fit the buffer.
    pub fn vector<T: Scalar>(&self, id: u16) -> CodecResult<Option<Vector<'a, T>>> {
        let field = self.field_def(id)?;
        match field.kind {
            FieldKind::Vector(ty) if ty == T::TYPE => {}
            _ => return Err(self.kind_error(field, &format!("[{}]", T::TYPE))),
        }
        Ok(self.vector_bytes(id, T::TYPE)?.map(|(_, bytes)| Vector {
            bytes,
            _marker: PhantomData,
        }))
    }

    /// Reads vector field `id` with its schema element type.
    ///
    /// # Errors
    ///
    /// See [`Table::vector`].
    pub fn raw_vector(&self, id: u16) -> CodecResult<Option<RawVector<'a>>> {
        let field = self.field_def(id)?;
        let FieldKind::Vector(element) = field.kind else {
            return Err(self.kind_error(field, "vector"));
        };
        Ok(self
            .vector_bytes(id, element)?
            .map(|(count, bytes)| RawVector {
                element,
                count,
                bytes,
            }))
    }

    fn vector_bytes(&self, id: u16, element: ScalarType) -> CodecResult<Option<(usize, &'a [u8])>> {
        let Some(target) = self.deref(id)? else {
            return Ok(None);
        };
        let count = read_u32(self.buf, target)? as usize;
        let len = count.checked_mul(element.size()).ok_or_else(|| {
            CodecError::corrupt(format!("vector field {id} claims {count} elements"))
        })?;
        let start = target + 4;
        check_range(self.buf, start, len, "vector")?;
        Ok(Some((count, &self.buf[start..start + len])))
    }

    /// Reads nested table field `id` with the nested schema.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if the field is not a table and
    /// [`CodecError::CorruptBuffer`] if the nested table header is damaged.
    pub fn table(&self, id: u16) -> CodecResult<Option<Table<'a>>> {
        let field = self.field_def(id)?;
        let FieldKind::Table(nested) = &field.kind else {
            return Err(self.kind_error(field, "table"));
        };
        let Some(target) = self.deref(id)? else {
            return Ok(None);
        };
        Table::at(self.buf, target, nested).map(Some)
    }

    /// Walks every present field recursively and checks it can be read.
    ///
    /// # Errors
    ///
    /// Returns the first error a field read produces, or
    /// [`CodecError::MissingRequiredField`] for an absent required field.
    pub fn verify(&self) -> CodecResult<()> {
        self.verify_at(0)
    }

    fn verify_at(&self, depth: usize) -> CodecResult<()> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(CodecError::corrupt(format!(
                "tables nest deeper than {MAX_SCHEMA_DEPTH} levels"
            )));
        }
        for field in self.schema.fields.iter() {
            if !self.is_present(field.id) {
                if field.required {
                    return Err(CodecError::missing_required(
                        self.schema.name.as_ref(),
                        field.name.as_ref(),
                    ));
                }
                continue;
            }
            match &field.kind {
                FieldKind::Scalar(_) => {
                    self.get_value(field.id)?;
                }
                FieldKind::String => {
                    self.string(field.id)?;
                }
                FieldKind::Vector(_) => {
                    self.raw_vector(field.id)?;
                }
                FieldKind::Table(_) => {
                    if let Some(nested) = self.table(field.id)? {
                        nested.verify_at(depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema.name)
            .field("position", &self.pos)
            .field("vtable", &self.vtable)
            .field("slots", &self.slot_count())
            .finish()
    }
}

/// A zero-copy view of a vector of `T` inside a buffer.
#[derive(Clone, Copy)]
pub struct Vector<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: Scalar> Vector<'a, T> {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / T::TYPE.size()
    }

    /// Returns true if the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }
        element_bytes(self.bytes, index, T::TYPE.size()).map(T::read_le)
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        self.bytes.chunks_exact(T::TYPE.size()).map(T::read_le)
    }

    /// Little-endian element bytes, borrowed from the buffer.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Copies the elements out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Scalar> fmt::Debug for Vector<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// A vector view whose element type is only known at run time.
#[derive(Debug, Clone, Copy)]
pub struct RawVector<'a> {
    element: ScalarType,
    count: usize,
    bytes: &'a [u8],
}

impl<'a> RawVector<'a> {
    /// Element type.
    #[must_use]
    pub fn element_type(&self) -> ScalarType {
        self.element
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Little-endian element bytes, borrowed from the buffer.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        if index >= self.count {
            return None;
        }
        element_bytes(self.bytes, index, self.element.size())
            .map(|b| ScalarValue::read_le(self.element, b))
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> impl Iterator<Item = ScalarValue> + 'a {
        let element = self.element;
        self.bytes
            .chunks_exact(element.size())
            .map(move |b| ScalarValue::read_le(element, b))
    }
}

fn element_bytes(bytes: &[u8], index: usize, size: usize) -> Option<&[u8]> {
    let start = index.checked_mul(size)?;
    bytes.get(start..start.checked_add(size)?)
}

fn check_range(buf: &[u8], start: usize, len: usize, what: &str) -> CodecResult<()> {
    match start.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(CodecError::corrupt(format!(
            "{what} at {start} with {len} bytes exceeds buffer of {} bytes",
            buf.len()
        ))),
    }
}

fn read_u16(buf: &[u8], at: usize) -> CodecResult<u16> {
    check_range(buf, at, 2, "u16")?;
    Ok(u16::from_le_bytes([buf[at], buf[at + 1]]))
}

fn read_u32(buf: &[u8], at: usize) -> CodecResult<u32> {
    check_range(buf, at, 4, "uoffset")?;
    Ok(u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]))
}

fn read_i32(buf: &[u8], at: usize) -> CodecResult<i32> {
    check_range(buf, at, 4, "soffset")?;
    Ok(i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]))
}
