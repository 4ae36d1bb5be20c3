//! Table builder.
//!
//! The builder fills a growable arena from the back towards the front, so
//! every object only ever points at objects that were finished before it.
//! References are kept as distances from the end of the arena, which stay
//! valid while the arena grows.
//!
//! Fields of an open table are staged on a frame and only written when the
//! table ends. This lets strings, vectors and nested tables be created while a
//! parent table is open, as long as frames close innermost first.

use crate::error::{CodecError, CodecResult};
use crate::reader::Table;
use crate::scalar::{Scalar, ScalarType, ScalarValue};
use crate::schema::{FieldKind, TableSchema};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

/// Largest buffer the builder will produce. Offsets are signed 32-bit on the
/// wire, so buffers are capped at `i32::MAX` bytes.
pub const MAX_BUFFER_SIZE: usize = i32::MAX as usize;

const INITIAL_CAPACITY: usize = 256;

/// The kind of object a [`Ref`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A length-prefixed UTF-8 string.
    String,
    /// A length-prefixed vector of scalars.
    Vector(ScalarType),
    /// A table.
    Table,
}

/// Reference to an object already written by a [`Builder`].
///
/// Only meaningful for the builder session that produced it. Table
/// references remember the name of the schema they were built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    offset: u32,
    kind: RefKind,
    schema: u64,
}

impl Ref {
    /// Distance of the object from the end of the buffer.
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// The kind of object referenced.
    #[must_use]
    pub const fn kind(self) -> RefKind {
        self.kind
    }

    const fn untyped(offset: u32, kind: RefKind) -> Self {
        Ref {
            offset,
            kind,
            schema: 0,
        }
    }

    fn table(offset: u32, schema: &TableSchema) -> Self {
        Ref {
            offset,
            kind: RefKind::Table,
            schema: schema_tag(schema),
        }
    }
}

/// Identity of a table type. Versions of one table share a name.
fn schema_tag(schema: &TableSchema) -> u64 {
    let mut hasher = DefaultHasher::new();
    schema.name.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy)]
enum StagedValue {
    Scalar { bytes: [u8; 8], size: usize },
    Reference(u32),
}

impl StagedValue {
    fn size(&self) -> usize {
        match self {
            StagedValue::Scalar { size, .. } => *size,
            StagedValue::Reference(_) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Staged {
    id: u16,
    value: StagedValue,
}

#[derive(Debug)]
struct Frame<'s> {
    schema: &'s TableSchema,
    staged: Vec<Staged>,
}

impl Frame<'_> {
    fn stage(&mut self, id: u16, value: StagedValue) {
        match self.staged.iter_mut().find(|s| s.id == id) {
            Some(existing) => existing.value = value,
            None => self.staged.push(Staged { id, value }),
        }
    }

    fn unstage(&mut self, id: u16) {
        self.staged.retain(|s| s.id != id);
    }
}

/// Builds one buffer of tables, strings and vectors.
///
/// A builder session is single-owner and synchronous. Calling the table
/// operations out of order (adding without an open table, finishing with open
/// tables) is a programmer error and panics.
///
/// # Example
///
/// ```
/// use flatrec_codec::{root, Builder, FieldDef, ScalarType, TableSchema};
///
/// static FIELDS: [FieldDef; 2] = [
///     FieldDef::scalar(0, "id", ScalarType::UInt64),
///     FieldDef::string(1, "name"),
/// ];
/// static USER: TableSchema = TableSchema::new("User", &FIELDS);
///
/// let mut builder = Builder::new();
/// let name = builder.create_string("alice").unwrap();
/// builder.start_table(&USER);
/// builder.add_scalar(0, 7u64).unwrap();
/// builder.add_reference(1, name).unwrap();
/// let user = builder.end_table().unwrap();
/// builder.finish(user).unwrap();
///
/// let table = root(builder.finished_data(), &USER).unwrap();
/// assert_eq!(table.get::<u64>(0).unwrap(), 7);
/// assert_eq!(table.string(1).unwrap(), Some("alice"));
/// ```
#[derive(Debug)]
pub struct Builder<'s> {
    buf: Vec<u8>,
    head: usize,
    min_align: usize,
    frames: Vec<Frame<'s>>,
    vtables: Vec<u32>,
    memo: HashMap<usize, Ref>,
    finished: bool,
}

impl<'s> Builder<'s> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates a builder with `capacity` bytes of arena preallocated.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(16, MAX_BUFFER_SIZE);
        Self {
            buf: vec![0; capacity],
            head: capacity,
            min_align: 1,
            frames: Vec::new(),
            vtables: Vec::new(),
            memo: HashMap::new(),
            finished: false,
        }
    }

    /// Clears all state so the arena can be reused for a new buffer.
    pub fn reset(&mut self) {
        self.head = self.buf.len();
        self.min_align = 1;
        self.frames.clear();
        self.vtables.clear();
        self.memo.clear();
        self.finished = false;
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Returns true if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tables currently open.
    #[must_use]
    pub fn open_tables(&self) -> usize {
        self.frames.len()
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Opens a new table for `schema`.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has already been finished.
    pub fn start_table(&mut self, schema: &'s TableSchema) {
        assert!(!self.finished, "start_table called on a finished buffer");
        self.frames.push(Frame {
            schema,
            staged: Vec::new(),
        });
    }

    /// Stages a scalar field on the innermost open table.
    ///
    /// A value equal to the field default is not written.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if field `id` does not exist, is
    /// deprecated, or is not a scalar of type `T`.
    ///
    /// # Panics
    ///
    /// Panics if no table is open.
    pub fn add_scalar<T: Scalar>(&mut self, id: u16, value: T) -> CodecResult<()> {
        self.add_scalar_value(id, value.into_value())
    }

    /// Stages a dynamically typed scalar field on the innermost open table.
    ///
    /// # Errors
    ///
    /// See [`Builder::add_scalar`].
    ///
    /// # Panics
    ///
    /// Panics if no table is open.
    pub fn add_scalar_value(&mut self, id: u16, value: ScalarValue) -> CodecResult<()> {
        let frame = self.frame_mut("add_scalar");
        let schema = frame.schema;
        let field = schema.expect_field(id)?;
        let FieldKind::Scalar(ty) = field.kind else {
            return Err(CodecError::schema_mismatch(format!(
                "field {} of table {} is {}, not a scalar",
                field.name,
                schema.name,
                field.kind.describe()
            )));
        };
        if ty != value.scalar_type() {
            return Err(CodecError::schema_mismatch(format!(
                "field {} of table {} is {ty}, got {}",
                field.name,
                schema.name,
                value.scalar_type()
            )));
        }

        if field
            .default_value()
            .is_some_and(|default| default.same_bits(&value))
        {
            frame.unstage(id);
            return Ok(());
        }
        if field.deprecated {
            return Err(CodecError::schema_mismatch(format!(
                "field {} of table {} is deprecated",
                field.name, schema.name
            )));
        }

        let mut bytes = [0u8; 8];
        value.write_le(&mut bytes);
        frame.stage(
            id,
            StagedValue::Scalar {
                bytes,
                size: ty.size(),
            },
        );
        Ok(())
    }

    /// Stages a reference to a finished string, vector or table.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if field `id` does not exist, is
    /// deprecated, or holds a different kind of object.
    ///
    /// # Panics
    ///
    /// Panics if no table is open or `reference` was not produced by this
    /// builder session.
    pub fn add_reference(&mut self, id: u16, reference: Ref) -> CodecResult<()> {
        assert!(
            reference.offset as usize <= self.len() && reference.offset > 0,
            "reference does not belong to this builder"
        );
        let frame = self.frame_mut("add_reference");
        let schema = frame.schema;
        let field = schema.expect_field(id)?;
        if field.deprecated {
            return Err(CodecError::schema_mismatch(format!(
                "field {} of table {} is deprecated",
                field.name, schema.name
            )));
        }
        let matches = match (&field.kind, reference.kind) {
            (FieldKind::String, RefKind::String) => true,
            (FieldKind::Table(nested), RefKind::Table) => {
                if reference.schema != schema_tag(nested) {
                    return Err(CodecError::schema_mismatch(format!(
                        "field {} of table {} holds {} tables, got a table of another schema",
                        field.name, schema.name, nested.name
                    )));
                }
                true
            }
            (FieldKind::Vector(expected), RefKind::Vector(actual)) => *expected == actual,
            _ => false,
        };
        if !matches {
            return Err(CodecError::schema_mismatch(format!(
                "field {} of table {} is {}, got a {:?} reference",
                field.name,
                schema.name,
                field.kind.describe(),
                reference.kind
            )));
        }
        frame.stage(id, StagedValue::Reference(reference.offset));
        Ok(())
    }

    /// Creates a string and stages it on field `id`.
    ///
    /// # Errors
    ///
    /// See [`Builder::add_reference`].
    pub fn add_string(&mut self, id: u16, value: &str) -> CodecResult<()> {
        let reference = self.create_string(value)?;
        self.add_reference(id, reference)
    }

    /// Creates a vector and stages it on field `id`.
    ///
    /// # Errors
    ///
    /// See [`Builder::add_reference`].
    pub fn add_vector<T: Scalar>(&mut self, id: u16, values: &[T]) -> CodecResult<()> {
        let reference = self.create_vector(values)?;
        self.add_reference(id, reference)
    }

    /// Finishes the innermost open table and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingRequiredField`] if a required field was
    /// never added. The table is discarded in that case.
    ///
    /// # Panics
    ///
    /// Panics if no table is open.
    pub fn end_table(&mut self) -> CodecResult<Ref> {
        let Some(mut frame) = self.frames.pop() else {
            panic!("end_table called without an open table");
        };
        for required in frame.schema.required_fields() {
            if !frame.staged.iter().any(|s| s.id == required.id) {
                return Err(CodecError::missing_required(
                    frame.schema.name.as_ref(),
                    required.name.as_ref(),
                ));
            }
        }
        let offset = self.emit_table(&mut frame.staged)?;
        Ok(Ref::table(offset, frame.schema))
    }

    /// Drops the innermost open table without writing it.
    ///
    /// Objects already created for it stay in the buffer unreferenced.
    ///
    /// # Panics
    ///
    /// Panics if no table is open.
    pub fn abandon_table(&mut self) {
        assert!(
            self.frames.pop().is_some(),
            "abandon_table called without an open table"
        );
    }

    /// Copies `source` into this buffer field by field.
    ///
    /// Absent fields stay absent and default-valued scalars are dropped.
    /// Cloning the same source table twice in one session returns the same
    /// reference without writing its bytes again.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CorruptBuffer`] if the source is damaged, or
    /// [`CodecError::MissingRequiredField`] if it lacks a required field.
    pub fn clone_table(&mut self, source: Table<'_>) -> CodecResult<Ref> {
        assert!(!self.finished, "clone_table called on a finished buffer");
        let key = source.address();
        if let Some(existing) = self.memo.get(&key) {
            trace!(table = %source.schema().name, "clone served from memo");
            return Ok(*existing);
        }

        let schema = source.schema();
        let mut staged = Vec::new();
        for field in schema.fields.iter() {
            if !source.is_present(field.id) {
                continue;
            }
            let value = match &field.kind {
                FieldKind::Scalar(ty) => {
                    let value = source.get_value(field.id)?;
                    if field
                        .default_value()
                        .is_some_and(|default| default.same_bits(&value))
                    {
                        continue;
                    }
                    let mut bytes = [0u8; 8];
                    value.write_le(&mut bytes);
                    StagedValue::Scalar {
                        bytes,
                        size: ty.size(),
                    }
                }
                FieldKind::String => match source.string_bytes(field.id)? {
                    Some(bytes) => StagedValue::Reference(self.create_string_bytes(bytes)?.offset),
                    None => continue,
                },
                FieldKind::Vector(_) => match source.raw_vector(field.id)? {
                    Some(vector) => StagedValue::Reference(
                        self.create_vector_raw(vector.element_type(), vector.len(), vector.bytes())?
                            .offset,
                    ),
                    None => continue,
                },
                FieldKind::Table(_) => match source.table(field.id)? {
                    Some(nested) => StagedValue::Reference(self.clone_table(nested)?.offset),
                    None => continue,
                },
            };
            staged.push(Staged {
                id: field.id,
                value,
            });
        }

        for required in schema.required_fields() {
            if !staged.iter().any(|s| s.id == required.id) {
                return Err(CodecError::missing_required(
                    schema.name.as_ref(),
                    required.name.as_ref(),
                ));
            }
        }

        let reference = Ref::table(self.emit_table(&mut staged)?, schema);
        self.memo.insert(key, reference);
        Ok(reference)
    }

    // ------------------------------------------------------------------
    // Strings and vectors
    // ------------------------------------------------------------------

    /// Writes a string: u32 length, UTF-8 bytes, trailing zero.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SizeLimitExceeded`] if the buffer would grow past
    /// [`MAX_BUFFER_SIZE`].
    pub fn create_string(&mut self, value: &str) -> CodecResult<Ref> {
        self.create_string_bytes(value.as_bytes())
    }

    /// Writes a string from raw bytes without checking them for UTF-8.
    ///
    /// # Errors
    ///
    /// See [`Builder::create_string`].
    pub fn create_string_bytes(&mut self, bytes: &[u8]) -> CodecResult<Ref> {
        assert!(!self.finished, "create_string called on a finished buffer");
        let len = checked_u32(bytes.len())?;
        self.align(bytes.len() + 1, 4)?;
        self.push(&[0])?;
        self.push(bytes)?;
        self.push(&len.to_le_bytes())?;
        Ok(Ref::untyped(checked_u32(self.len())?, RefKind::String))
    }

    /// Writes a vector of scalars: u32 element count, then the elements.
    ///
    /// # Errors
    ///
    /// See [`Builder::create_string`].
    pub fn create_vector<T: Scalar>(&mut self, values: &[T]) -> CodecResult<Ref> {
        assert!(!self.finished, "create_vector called on a finished buffer");
        let size = T::TYPE.size();
        let data_len = values
            .len()
            .checked_mul(size)
            .ok_or_else(|| too_large(u64::MAX))?;
        let start = self.reserve_vector(T::TYPE, data_len)?;
        for (i, value) in values.iter().enumerate() {
            let at = start + i * size;
            value.write_le(&mut self.buf[at..at + size]);
        }
        self.finish_vector(values.len(), RefKind::Vector(T::TYPE))
    }

    /// Writes a vector from dynamically typed values, all of type `element`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if a value has another type.
    pub fn create_vector_values(
        &mut self,
        element: ScalarType,
        values: &[ScalarValue],
    ) -> CodecResult<Ref> {
        assert!(!self.finished, "create_vector called on a finished buffer");
        if let Some(bad) = values.iter().find(|v| v.scalar_type() != element) {
            return Err(CodecError::schema_mismatch(format!(
                "vector of {element} cannot hold a {} value",
                bad.scalar_type()
            )));
        }
        let size = element.size();
        let data_len = values
            .len()
            .checked_mul(size)
            .ok_or_else(|| too_large(u64::MAX))?;
        let start = self.reserve_vector(element, data_len)?;
        for (i, value) in values.iter().enumerate() {
            let at = start + i * size;
            value.write_le(&mut self.buf[at..at + size]);
        }
        self.finish_vector(values.len(), RefKind::Vector(element))
    }

    /// Writes a vector whose elements are already little-endian encoded.
    pub(crate) fn create_vector_raw(
        &mut self,
        element: ScalarType,
        count: usize,
        bytes: &[u8],
    ) -> CodecResult<Ref> {
        debug_assert_eq!(count * element.size(), bytes.len());
        let start = self.reserve_vector(element, bytes.len())?;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.finish_vector(count, RefKind::Vector(element))
    }

    fn reserve_vector(&mut self, element: ScalarType, data_len: usize) -> CodecResult<usize> {
        self.align(data_len, 4)?;
        self.align(data_len, element.align())?;
        self.make_room(data_len)?;
        self.head -= data_len;
        Ok(self.head)
    }

    fn finish_vector(&mut self, count: usize, kind: RefKind) -> CodecResult<Ref> {
        let count = checked_u32(count)?;
        self.push(&count.to_le_bytes())?;
        Ok(Ref::untyped(checked_u32(self.len())?, kind))
    }

    // ------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------

    /// Writes the root offset and seals the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if `root` is not a table of
    /// this builder session.
    ///
    /// # Panics
    ///
    /// Panics if tables are still open or the buffer was already finished.
    pub fn finish(&mut self, root: Ref) -> CodecResult<()> {
        self.finish_inner(root, None)
    }

    /// Writes the root offset followed by a 4-byte buffer identifier.
    ///
    /// # Errors
    ///
    /// See [`Builder::finish`].
    ///
    /// # Panics
    ///
    /// See [`Builder::finish`].
    pub fn finish_with_identifier(&mut self, root: Ref, identifier: [u8; 4]) -> CodecResult<()> {
        self.finish_inner(root, Some(identifier))
    }

    /// Finishes with the identifier declared by `schema`, if any.
    ///
    /// # Errors
    ///
    /// See [`Builder::finish`].
    ///
    /// # Panics
    ///
    /// See [`Builder::finish`].
    pub fn finish_root(&mut self, root: Ref, schema: &TableSchema) -> CodecResult<()> {
        self.finish_inner(root, schema.identifier)
    }

    fn finish_inner(&mut self, root: Ref, identifier: Option<[u8; 4]>) -> CodecResult<()> {
        assert!(
            self.frames.is_empty(),
            "finish called with {} open tables",
            self.frames.len()
        );
        assert!(!self.finished, "buffer already finished");
        if root.kind != RefKind::Table {
            return Err(CodecError::schema_mismatch(format!(
                "root must be a table, got {:?}",
                root.kind
            )));
        }
        if root.offset == 0 || root.offset as usize > self.len() {
            return Err(CodecError::schema_mismatch(format!(
                "root at {} does not belong to this buffer of {} bytes",
                root.offset,
                self.len()
            )));
        }

        let prefix = if identifier.is_some() { 8 } else { 4 };
        let alignment = self.min_align.max(4);
        self.align(prefix, alignment)?;
        if let Some(identifier) = identifier {
            self.push(&identifier)?;
        }
        let at = self.len() + 4;
        let relative = checked_u32(at - root.offset as usize)?;
        self.push(&relative.to_le_bytes())?;
        self.finished = true;
        debug!(
            size = self.len(),
            identified = identifier.is_some(),
            "buffer finished"
        );
        Ok(())
    }

    /// The finished buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has not been finished.
    #[must_use]
    pub fn finished_data(&self) -> &[u8] {
        assert!(self.finished, "buffer has not been finished");
        &self.buf[self.head..]
    }

    /// Consumes the builder and returns the finished buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has not been finished.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        assert!(self.finished, "buffer has not been finished");
        let mut buf = self.buf;
        buf.drain(..self.head);
        buf
    }

    // ------------------------------------------------------------------
    // Arena internals
    // ------------------------------------------------------------------

    fn frame_mut(&mut self, operation: &str) -> &mut Frame<'s> {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("{operation} called without an open table"),
        }
    }

    /// Writes a table from staged fields and returns its offset.
    fn emit_table(&mut self, staged: &mut [Staged]) -> CodecResult<u32> {
        staged.sort_by(|a, b| b.value.size().cmp(&a.value.size()).then(a.id.cmp(&b.id)));

        // Start on the widest alignment so the inline layout, and with it the
        // vtable, depends only on which fields are present.
        let widest = staged.first().map_or(4, |s| s.value.size().max(4));
        self.align(0, widest)?;
        let object_end = self.len();
        let mut placed: Vec<(u16, usize)> = Vec::with_capacity(staged.len());
        for field in staged.iter() {
            match field.value {
                StagedValue::Scalar { bytes, size } => {
                    self.align(size, size)?;
                    self.push(&bytes[..size])?;
                }
                StagedValue::Reference(target) => {
                    self.align(4, 4)?;
                    let at = self.len() + 4;
                    let relative = checked_u32(at - target as usize)?;
                    self.push(&relative.to_le_bytes())?;
                }
            }
            placed.push((field.id, self.len()));
        }

        self.align(4, 4)?;
        self.push(&0i32.to_le_bytes())?;
        let table = self.len();

        let inline_size = checked_u16(table - object_end)?;
        let slots = placed.iter().map(|(id, _)| usize::from(*id) + 1).max().unwrap_or(0);
        let mut vtable = vec![0u16; 2 + slots];
        vtable[0] = checked_u16(4 + 2 * slots)?;
        vtable[1] = inline_size;
        for (id, at) in &placed {
            vtable[2 + usize::from(*id)] = checked_u16(table - at)?;
        }

        let existing = self.find_vtable(&vtable);
        let reused = existing.is_some();
        let vtable_at = match existing {
            Some(at) => at,
            None => {
                for entry in vtable.iter().rev() {
                    self.push(&entry.to_le_bytes())?;
                }
                let at = self.len();
                self.vtables.push(checked_u32(at)?);
                at
            }
        };

        let soffset = i32::try_from(vtable_at as i64 - table as i64)
            .map_err(|_| too_large(vtable_at as u64))?;
        let table_index = self.buf.len() - table;
        self.buf[table_index..table_index + 4].copy_from_slice(&soffset.to_le_bytes());

        trace!(
            fields = placed.len(),
            inline_size,
            reused_vtable = reused,
            "table emitted"
        );
        checked_u32(table)
    }

    fn find_vtable(&self, vtable: &[u16]) -> Option<usize> {
        self.vtables.iter().map(|&at| at as usize).find(|&at| {
            let index = self.buf.len() - at;
            let len = vtable.len() * 2;
            let Some(existing) = self.buf.get(index..index + len) else {
                return false;
            };
            existing
                .chunks_exact(2)
                .zip(vtable)
                .all(|(bytes, entry)| u16::from_le_bytes([bytes[0], bytes[1]]) == *entry)
                && u16::from_le_bytes([existing[0], existing[1]]) as usize == len
        })
    }

    /// Pads so that after writing `len` more bytes the write position is a
    /// multiple of `alignment`.
    fn align(&mut self, len: usize, alignment: usize) -> CodecResult<()> {
        self.min_align = self.min_align.max(alignment);
        let padding = (alignment - (self.len() + len) % alignment) % alignment;
        if padding > 0 {
            self.make_room(padding)?;
            self.head -= padding;
            self.buf[self.head..self.head + padding].fill(0);
        }
        Ok(())
    }

    fn push(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.make_room(bytes.len())?;
        self.head -= bytes.len();
        self.buf[self.head..self.head + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn make_room(&mut self, additional: usize) -> CodecResult<()> {
        if self.head >= additional {
            return Ok(());
        }
        let used = self.len();
        let needed = used
            .checked_add(additional)
            .filter(|&n| n <= MAX_BUFFER_SIZE)
            .ok_or_else(|| too_large(used as u64 + additional as u64))?;
        let new_len = needed
            .max(self.buf.len().saturating_mul(2))
            .min(MAX_BUFFER_SIZE);
        let mut grown = vec![0u8; new_len];
        grown[new_len - used..].copy_from_slice(&self.buf[self.head..]);
        self.buf = grown;
        self.head = new_len - used;
        Ok(())
    }
}

impl Default for Builder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn too_large(claimed: u64) -> CodecError {
    CodecError::SizeLimitExceeded {
        claimed,
        max_allowed: MAX_BUFFER_SIZE as u64,
    }
}

fn checked_u32(value: usize) -> CodecResult<u32> {
    u32::try_from(value).map_err(|_| too_large(value as u64))
}

fn checked_u16(value: usize) -> CodecResult<u16> {
    u16::try_from(value).map_err(|_| CodecError::SizeLimitExceeded {
        claimed: value as u64,
        max_allowed: u64::from(u16::MAX),
    })
}
