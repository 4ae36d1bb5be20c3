//! Data file format and atomic save/load.
//!
//! ```text
//! header:  magic "FRDB" | u16 version | u16 reserved | u64 payload length | u32 crc32
//! payload: u32 entity count
//!            { name | u64 last id | u64 object count | { u64 id | u32 len | bytes } }
//!          u32 relation count
//!            { name | u64 pair count | { u64 source | u64 target } }
//! name:    u16 length | UTF-8 bytes
//! ```
//!
//! Entity types and relations are stored by name so the model may register
//! them in a different order between runs. All integers are little-endian.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::Model;
use crate::snapshot::Snapshot;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic bytes of the data file.
pub const DATA_MAGIC: [u8; 4] = *b"FRDB";

/// Current data file version.
pub const DATA_VERSION: u16 = 1;

/// Data file name inside the store directory.
pub const DATA_FILE: &str = "data.frdb";

/// Temporary file used while saving.
pub const DATA_TEMP_FILE: &str = "data.frdb.tmp";

const HEADER_SIZE: usize = 20;

/// Path of the data file for a directory.
#[must_use]
pub fn data_path(dir: &Path) -> PathBuf {
    dir.join(DATA_FILE)
}

/// Encodes a snapshot.
pub(crate) fn encode(snapshot: &Snapshot, model: &Model) -> StoreResult<Vec<u8>> {
    let mut payload = BytesMut::new();

    payload.put_u32_le(len_u32(snapshot.entities.len())?);
    for (id, data) in &snapshot.entities {
        let entity = model.require_entity(*id)?;
        put_name(&mut payload, entity.name())?;
        payload.put_u64_le(data.last_id);
        payload.put_u64_le(data.objects.len() as u64);
        for (object_id, bytes) in &data.objects {
            payload.put_u64_le(*object_id);
            payload.put_u32_le(len_u32(bytes.len())?);
            payload.put_slice(bytes);
        }
    }

    payload.put_u32_le(len_u32(snapshot.relations.len())?);
    for (id, pairs) in &snapshot.relations {
        let relation = model.require_relation(*id)?;
        put_name(&mut payload, &relation.name)?;
        payload.put_u64_le(pairs.len() as u64);
        for (source, target) in pairs.iter() {
            payload.put_u64_le(*source);
            payload.put_u64_le(*target);
        }
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.put_slice(&DATA_MAGIC);
    out.put_u16_le(DATA_VERSION);
    out.put_u16_le(0);
    out.put_u64_le(payload.len() as u64);
    out.put_u32_le(compute_crc32(&payload));
    out.put_slice(&payload);
    Ok(out)
}

/// Decodes a data file. Object buffers are sliced out of `data`, not copied,
/// and each one is verified against its entity schema.
pub(crate) fn decode(data: Bytes, model: &Model) -> StoreResult<Snapshot> {
    let mut input = Input(data);

    input.need(HEADER_SIZE, "header")?;
    if input.0[..4] != DATA_MAGIC {
        return Err(StoreError::file_corrupt("invalid data file magic"));
    }
    input.0.advance(4);
    let version = input.0.get_u16_le();
    if version > DATA_VERSION {
        return Err(StoreError::file_corrupt(format!(
            "unsupported data file version: {version}"
        )));
    }
    input.0.advance(2);
    let payload_len = input.0.get_u64_le();
    let checksum = input.0.get_u32_le();
    if payload_len != input.0.len() as u64 {
        return Err(StoreError::file_corrupt(format!(
            "payload length {payload_len} does not match file ({} bytes)",
            input.0.len()
        )));
    }
    if compute_crc32(&input.0) != checksum {
        return Err(StoreError::file_corrupt("checksum mismatch"));
    }

    let mut snapshot = Snapshot::default();

    for _ in 0..input.u32("entity count")? {
        let name = input.name()?;
        let entity = model
            .entity_id(&name)
            .and_then(|id| model.entity(id))
            .ok_or_else(|| StoreError::schema(format!("data file holds unknown entity {name}")))?;
        let last_id = input.u64("last id")?;
        let count = input.u64("object count")?;
        let data = snapshot.entity_mut(entity.id());
        for _ in 0..count {
            let id = input.u64("object id")?;
            let len = input.u32("object length")? as usize;
            let bytes = input.bytes(len, "object")?;
            flatrec_codec::verify(&bytes, entity.schema()).map_err(|err| {
                StoreError::file_corrupt(format!("{} object {id}: {err}", entity.name()))
            })?;
            data.insert(id, bytes);
        }
        data.last_id = data.last_id.max(last_id);
    }

    for _ in 0..input.u32("relation count")? {
        let name = input.name()?;
        let id = model.relation_id(&name).ok_or_else(|| {
            StoreError::schema(format!("data file holds unknown relation {name}"))
        })?;
        let count = input.u64("pair count")?;
        let pairs = snapshot.relation_mut(id);
        for _ in 0..count {
            let source = input.u64("relation source")?;
            let target = input.u64("relation target")?;
            pairs.insert((source, target));
        }
    }

    if !input.0.is_empty() {
        return Err(StoreError::file_corrupt("trailing bytes after payload"));
    }
    Ok(snapshot)
}

/// Loads the data file, or `None` if there is none yet.
pub(crate) fn load(dir: &Path, model: &Model) -> StoreResult<Option<Snapshot>> {
    let path = data_path(dir);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let size = data.len();
    let snapshot = decode(Bytes::from(data), model)?;
    info!(path = %path.display(), size, "loaded data file");
    Ok(Some(snapshot))
}

/// Saves a snapshot atomically: write a temporary file, sync it, rename it
/// over the data file, then sync the directory.
pub(crate) fn save(
    dir: &Path,
    snapshot: &Snapshot,
    model: &Model,
    config: &StoreConfig,
) -> StoreResult<()> {
    let data = encode(snapshot, model)?;
    let temp_path = dir.join(DATA_TEMP_FILE);

    let mut file = create_file(&temp_path, config.effective_file_mode())?;
    file.write_all(&data)?;
    if config.sync_on_commit {
        file.sync_all()?;
    }
    drop(file);

    fs::rename(&temp_path, data_path(dir))?;
    if config.sync_on_commit {
        sync_directory(dir)?;
    }
    debug!(dir = %dir.display(), size = data.len(), "saved data file");
    Ok(())
}

/// Deletes the data files in `dir`. Returns whether anything was deleted.
pub(crate) fn remove_files(dir: &Path) -> StoreResult<bool> {
    let mut removed = false;
    for name in [DATA_FILE, DATA_TEMP_FILE] {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => removed = true,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(removed)
}

#[cfg(unix)]
fn create_file(path: &Path, mode: u32) -> StoreResult<File> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _mode: u32) -> StoreResult<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> StoreResult<()> {
    Ok(())
}

fn len_u32(len: usize) -> StoreResult<u32> {
    u32::try_from(len).map_err(|_| StoreError::illegal_argument(format!("length {len} too large")))
}

fn put_name(out: &mut BytesMut, name: &str) -> StoreResult<()> {
    let len = u16::try_from(name.len())
        .map_err(|_| StoreError::illegal_argument(format!("name too long: {name}")))?;
    out.put_u16_le(len);
    out.put_slice(name.as_bytes());
    Ok(())
}

/// Bounds-checked reads over the payload.
struct Input(Bytes);

impl Input {
    fn need(&self, len: usize, what: &str) -> StoreResult<()> {
        if self.0.remaining() < len {
            return Err(StoreError::file_corrupt(format!(
                "data file truncated in {what}"
            )));
        }
        Ok(())
    }

    fn u32(&mut self, what: &str) -> StoreResult<u32> {
        self.need(4, what)?;
        Ok(self.0.get_u32_le())
    }

    fn u64(&mut self, what: &str) -> StoreResult<u64> {
        self.need(8, what)?;
        Ok(self.0.get_u64_le())
    }

    fn bytes(&mut self, len: usize, what: &str) -> StoreResult<Bytes> {
        self.need(len, what)?;
        Ok(self.0.split_to(len))
    }

    fn name(&mut self) -> StoreResult<String> {
        self.need(2, "name length")?;
        let len = usize::from(self.0.get_u16_le());
        let bytes = self.bytes(len, "name")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::file_corrupt("invalid name"))
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut n = 0;
        while n < 256 {
            let mut c = n as u32;
            let mut k = 0;
            while k < 8 {
                c = if c & 1 == 1 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
                k += 1;
            }
            table[n] = c;
            n += 1;
        }
        table
    };

    !data.iter().fold(!0u32, |crc, &byte| {
        TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use crate::types::EntityTypeId;
    use flatrec_codec::{Builder, FieldDef, ScalarType, TableSchema};

    static FIELDS: [FieldDef; 2] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::string(1, "text"),
    ];
    static NOTE: TableSchema = TableSchema::new("Note", &FIELDS);

    fn note(id: u64, text: &str) -> Bytes {
        let mut builder = Builder::new();
        let text = builder.create_string(text).unwrap();
        builder.start_table(&NOTE);
        builder.add_scalar(0, id).unwrap();
        builder.add_reference(1, text).unwrap();
        let table = builder.end_table().unwrap();
        builder.finish(table).unwrap();
        Bytes::from(builder.into_bytes())
    }

    fn model() -> (Model, EntityTypeId) {
        let mut model = Model::new();
        let note = model.add_entity(&NOTE, 0).unwrap();
        let rel = model.add_relation("links", note, note).unwrap();
        assert_eq!(rel.as_u32(), 1);
        (model, note)
    }

    fn sample(model: &Model, note: EntityTypeId) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let data = snapshot.entity_mut(note);
        data.insert(1, note_bytes(1));
        data.insert(3, note_bytes(3));
        data.last_id = 4;
        snapshot
            .relation_mut(model.relation_id("links").unwrap())
            .insert((1, 3));
        snapshot
    }

    fn note_bytes(id: u64) -> Bytes {
        note(id, &format!("note {id}"))
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn encode_decode_preserves_state() {
        let (model, note) = model();
        let snapshot = sample(&model, note);
        let encoded = encode(&snapshot, &model).unwrap();

        let decoded = decode(Bytes::from(encoded), &model).unwrap();
        let data = decoded.entity(note).unwrap();
        assert_eq!(data.last_id, 4);
        assert_eq!(data.objects.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(data.objects[&3], note_bytes(3));
        assert_eq!(decoded.size(), snapshot.size());
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let (model, note) = model();
        let mut encoded = encode(&sample(&model, note), &model).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let err = decode(Bytes::from(encoded), &model).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT);
    }

    #[test]
    fn bad_magic_and_truncation_rejected() {
        let (model, note) = model();
        let encoded = encode(&sample(&model, note), &model).unwrap();

        let mut bad = encoded.clone();
        bad[0] = b'X';
        assert!(decode(Bytes::from(bad), &model).is_err());

        for len in 0..encoded.len() {
            let err = decode(Bytes::copy_from_slice(&encoded[..len]), &model).unwrap_err();
            assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT, "length {len}");
        }
    }

    #[test]
    fn unknown_entity_is_schema_error() {
        let (model, note) = model();
        let encoded = encode(&sample(&model, note), &model).unwrap();
        let err = decode(Bytes::from(encoded), &Model::new()).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_SCHEMA);
    }

    #[test]
    fn save_load_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (model, note) = model();
        assert!(load(dir.path(), &model).unwrap().is_none());

        save(dir.path(), &sample(&model, note), &model, &StoreConfig::new()).unwrap();
        assert!(data_path(dir.path()).exists());
        assert!(!dir.path().join(DATA_TEMP_FILE).exists());

        let loaded = load(dir.path(), &model).unwrap().unwrap();
        assert_eq!(loaded.entity(note).unwrap().objects.len(), 2);

        assert!(remove_files(dir.path()).unwrap());
        assert!(!remove_files(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn created_file_uses_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let (model, note) = model();
        let config = StoreConfig::new().file_mode(0o600);
        save(dir.path(), &sample(&model, note), &model, &config).unwrap();
        let mode = fs::metadata(data_path(dir.path())).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}
