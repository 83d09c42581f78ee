//! Native shared container: a little-endian binary file that every rank of a
//! group can read and write at disjoint positions.
//!
//! ```text
//! offset 0      header     64 bytes   magic "BLKCKPT\0", version, directory capacity
//! offset 64     directory  16 × 128   name, element width, rank, dims, data offset
//! offset 2112   data       datasets, each starting on a 64-byte boundary
//! ```
//!
//! Each rank holds its own file handle. Dataset creation is deterministic:
//! all ranks plan the same entry from the same directory, rank 0 commits it,
//! and the group synchronizes. Hyperslab transfers are split into contiguous
//! runs and issued as positional writes/reads, followed by a barrier.

use crate::algs::communicator::Communicator;
use crate::algs::hyperslab::Hyperslab;
use crate::checkpoint_error::CheckpointError;
use crate::data::element::{Element, ElementKind, decode_le, encode_le};
use crate::io::{
    AccessMode, CollectiveContainer, CollectiveOp, ContainerBackend, DataLocator, DatasetInfo,
    Endian, SerialContainer, check_transfer, file_name,
};
use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 8] = *b"BLKCKPT\0";
/// Bump when the layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;
/// Maximum number of datasets per container.
pub const DIRECTORY_CAPACITY: usize = 16;
const NAME_LEN: usize = 64;
const MAX_DIMS: usize = 4;
const HEADER_LEN: u64 = 64;
const ENTRY_LEN: u64 = 128;
const DATA_ALIGN: u64 = 64;
/// First byte of the data region.
pub const DATA_START: u64 = HEADER_LEN + ENTRY_LEN * DIRECTORY_CAPACITY as u64;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RawHeader {
    magic: [u8; 8],
    version_le: u32,
    capacity_le: u32,
    reserved: [u8; 48],
}

/// Directory slot; an all-zero name marks a free slot.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RawEntry {
    name: [u8; NAME_LEN],
    width: u8,
    ndims: u8,
    reserved: [u8; 6],
    dims_le: [u64; MAX_DIMS],
    offset_le: u64,
    reserved_tail: [u8; 16],
}

assert_eq_size!(RawHeader, [u8; HEADER_LEN as usize]);
assert_eq_size!(RawEntry, [u8; ENTRY_LEN as usize]);

impl RawHeader {
    fn new() -> Self {
        Self {
            magic: MAGIC,
            version_le: FORMAT_VERSION.to_le(),
            capacity_le: (DIRECTORY_CAPACITY as u32).to_le(),
            reserved: [0; 48],
        }
    }
}

impl RawEntry {
    fn encode(info: &DatasetInfo) -> Result<Self, CheckpointError> {
        let name = info.name.as_bytes();
        if name.is_empty() || name.len() >= NAME_LEN || name.contains(&0) {
            return Err(CheckpointError::Format(format!(
                "dataset name `{}` must be 1..{} bytes without NUL",
                info.name,
                NAME_LEN - 1
            )));
        }
        if info.shape.len() > MAX_DIMS {
            return Err(CheckpointError::Format(format!(
                "dataset `{}` has {} dimensions, at most {MAX_DIMS} supported",
                info.name,
                info.shape.len()
            )));
        }
        let mut raw = RawEntry::zeroed();
        raw.name[..name.len()].copy_from_slice(name);
        raw.width = info.kind.width() as u8;
        raw.ndims = info.shape.len() as u8;
        for (d, &n) in raw.dims_le.iter_mut().zip(&info.shape) {
            *d = n.to_le();
        }
        raw.offset_le = info.location.to_le();
        Ok(raw)
    }

    fn decode(&self) -> Result<Option<DatasetInfo>, CheckpointError> {
        if self.name[0] == 0 {
            return Ok(None);
        }
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = std::str::from_utf8(&self.name[..end])
            .map_err(|e| CheckpointError::Format(format!("dataset name is not UTF-8: {e}")))?;
        let kind = ElementKind::from_width(self.width as usize).ok_or_else(|| {
            CheckpointError::Format(format!("dataset `{name}` has element width {}", self.width))
        })?;
        let ndims = self.ndims as usize;
        if ndims > MAX_DIMS {
            return Err(CheckpointError::Format(format!(
                "dataset `{name}` claims {ndims} dimensions"
            )));
        }
        Ok(Some(DatasetInfo {
            name: name.to_string(),
            kind,
            shape: self.dims_le[..ndims].iter().map(|&d| u64::from_le(d)).collect(),
            location: u64::from_le(self.offset_le),
        }))
    }
}

/// In-memory copy of a container's directory.
#[derive(Clone, Debug, Default)]
struct Directory {
    entries: Vec<DatasetInfo>,
}

impl Directory {
    fn read_from(file: &mut File) -> Result<Self, CheckpointError> {
        let mut header = RawHeader::zeroed();
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(bytemuck::bytes_of_mut(&mut header))?;
        if header.magic != MAGIC {
            return Err(CheckpointError::Format("not a block-checkpoint container".into()));
        }
        let version = u32::from_le(header.version_le);
        if version != FORMAT_VERSION {
            return Err(CheckpointError::Format(format!(
                "container format version {version}, expected {FORMAT_VERSION}"
            )));
        }
        let capacity = u32::from_le(header.capacity_le) as usize;
        if capacity != DIRECTORY_CAPACITY {
            return Err(CheckpointError::Format(format!(
                "directory capacity {capacity}, expected {DIRECTORY_CAPACITY}"
            )));
        }
        let mut raw = [RawEntry::zeroed(); DIRECTORY_CAPACITY];
        file.read_exact(bytemuck::cast_slice_mut(&mut raw))?;
        let mut entries = Vec::new();
        for slot in &raw {
            match slot.decode()? {
                Some(info) => entries.push(info),
                None => break,
            }
        }
        Ok(Self { entries })
    }

    fn find(&self, name: &str) -> Option<&DatasetInfo> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Slot and placement of a new dataset. Pure function of the directory,
    /// so every rank computes the same answer.
    fn plan(
        &self,
        name: &str,
        kind: ElementKind,
        shape: &[u64],
    ) -> Result<(usize, DatasetInfo), CheckpointError> {
        if self.find(name).is_some() {
            return Err(CheckpointError::DatasetExists(name.to_string()));
        }
        if self.entries.len() >= DIRECTORY_CAPACITY {
            return Err(CheckpointError::Format(format!(
                "directory full ({DIRECTORY_CAPACITY} datasets)"
            )));
        }
        let end = self
            .entries
            .iter()
            .map(|e| e.location + e.byte_len())
            .max()
            .unwrap_or(DATA_START)
            .max(DATA_START);
        let info = DatasetInfo {
            name: name.to_string(),
            kind,
            shape: shape.to_vec(),
            location: end.div_ceil(DATA_ALIGN) * DATA_ALIGN,
        };
        Ok((self.entries.len(), info))
    }
}

fn write_entry(file: &mut File, slot: usize, info: &DatasetInfo) -> Result<(), CheckpointError> {
    let raw = RawEntry::encode(info)?;
    file.seek(SeekFrom::Start(HEADER_LEN + slot as u64 * ENTRY_LEN))?;
    file.write_all(bytemuck::bytes_of(&raw))?;
    Ok(())
}

/// Storage runtime for the raw native layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl ContainerBackend for NativeBackend {
    type Writer = NativeWriter;
    type Handle = NativeContainer;

    const EXTENSION: &'static str = "ckpt";

    fn create(&self, path: &Path) -> Result<NativeWriter, CheckpointError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| CheckpointError::open(path, e))?;
        let init = |file: &mut File| -> std::io::Result<()> {
            file.write_all(bytemuck::bytes_of(&RawHeader::new()))?;
            let empty = [RawEntry::zeroed(); DIRECTORY_CAPACITY];
            file.write_all(bytemuck::cast_slice(&empty))
        };
        init(&mut file).map_err(|e| CheckpointError::open(path, e))?;
        Ok(NativeWriter {
            file,
            directory: Directory::default(),
            scratch: Vec::new(),
        })
    }

    fn open_collective<C: Communicator>(
        &self,
        path: &Path,
        mode: AccessMode,
        comm: &C,
    ) -> Result<NativeContainer, CheckpointError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(mode == AccessMode::ReadWrite)
            .open(path)
            .map_err(|e| CheckpointError::open(path, e))?;
        let directory =
            Directory::read_from(&mut file).map_err(|e| CheckpointError::open(path, e))?;
        log::debug!(
            "rank {} opened {} ({} datasets, {mode:?})",
            comm.rank(),
            path.display(),
            directory.entries.len()
        );
        Ok(NativeContainer {
            file,
            path: path.to_path_buf(),
            mode,
            directory,
            scratch: Vec::new(),
        })
    }

    fn abstain<C: Communicator>(&self, comm: &C, op: CollectiveOp) {
        log::debug!("rank {} joins {op:?} without a container", comm.rank());
        comm.barrier();
    }

    fn discard(&self, path: &Path) -> Result<(), CheckpointError> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Single-writer handle for the metadata phase.
pub struct NativeWriter {
    file: File,
    directory: Directory,
    scratch: Vec<u8>,
}

impl SerialContainer for NativeWriter {
    fn write_vector(&mut self, name: &str, values: &[f64]) -> Result<DatasetInfo, CheckpointError> {
        let (slot, info) =
            self.directory
                .plan(name, ElementKind::F64, &[values.len() as u64])?;
        write_entry(&mut self.file, slot, &info)?;
        self.scratch.clear();
        encode_le(values, &mut self.scratch);
        self.file.seek(SeekFrom::Start(info.location))?;
        self.file.write_all(&self.scratch)?;
        self.directory.entries.push(info.clone());
        Ok(info)
    }

    fn close(mut self) -> Result<(), CheckpointError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Per-rank handle for the bulk phase.
pub struct NativeContainer {
    file: File,
    path: PathBuf,
    mode: AccessMode,
    directory: Directory,
    scratch: Vec<u8>,
}

impl NativeContainer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn datasets(&self) -> &[DatasetInfo] {
        &self.directory.entries
    }

    fn commit_dataset(
        &mut self,
        name: &str,
        kind: ElementKind,
        shape: &[u64],
        root: bool,
    ) -> Result<DatasetInfo, CheckpointError> {
        if self.mode != AccessMode::ReadWrite {
            return Err(CheckpointError::Format(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        let (slot, info) = self.directory.plan(name, kind, shape)?;
        if root {
            write_entry(&mut self.file, slot, &info)?;
            let end = info.location + info.byte_len();
            if self.file.metadata()?.len() < end {
                self.file.set_len(end)?;
            }
        }
        self.directory.entries.push(info.clone());
        Ok(info)
    }

    fn write_runs<R: Element>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &[R],
    ) -> Result<(), CheckpointError> {
        if self.mode != AccessMode::ReadWrite {
            return Err(CheckpointError::transfer("write", &dataset.name, "container is read-only"));
        }
        let shape = check_transfer::<R>(dataset, slab, data.len())?;
        let width = R::KIND.width() as u64;
        for run in slab.runs(&shape) {
            let values = &data[run.buffer_start as usize..(run.buffer_start + run.len) as usize];
            self.scratch.clear();
            encode_le(values, &mut self.scratch);
            self.file
                .seek(SeekFrom::Start(dataset.location + run.dataset_start * width))
                .and_then(|_| self.file.write_all(&self.scratch))
                .map_err(|e| CheckpointError::transfer("write", &dataset.name, e))?;
        }
        Ok(())
    }

    fn read_runs<R: Element>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &mut [R],
    ) -> Result<(), CheckpointError> {
        let shape = check_transfer::<R>(dataset, slab, data.len())?;
        let width = R::KIND.width() as u64;
        for run in slab.runs(&shape) {
            self.scratch.resize((run.len * width) as usize, 0);
            self.file
                .seek(SeekFrom::Start(dataset.location + run.dataset_start * width))
                .and_then(|_| self.file.read_exact(&mut self.scratch))
                .map_err(|e| CheckpointError::transfer("read", &dataset.name, e))?;
            let out = &mut data[run.buffer_start as usize..(run.buffer_start + run.len) as usize];
            decode_le(&self.scratch, out);
        }
        Ok(())
    }
}

impl CollectiveContainer for NativeContainer {
    fn create_dataset<C: Communicator>(
        &mut self,
        name: &str,
        kind: ElementKind,
        shape: &[u64],
        comm: &C,
    ) -> Result<DatasetInfo, CheckpointError> {
        let result = self.commit_dataset(name, kind, shape, comm.is_root());
        comm.barrier();
        result
    }

    fn dataset(&self, name: &str) -> Result<DatasetInfo, CheckpointError> {
        self.directory
            .find(name)
            .cloned()
            .ok_or_else(|| CheckpointError::MissingDataset(name.to_string()))
    }

    fn write_hyperslab<R: Element, C: Communicator>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &[R],
        comm: &C,
    ) -> Result<(), CheckpointError> {
        let result = self.write_runs(dataset, slab, data);
        comm.barrier();
        result
    }

    fn read_hyperslab<R: Element, C: Communicator>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &mut [R],
        comm: &C,
    ) -> Result<(), CheckpointError> {
        let result = self.read_runs(dataset, slab, data);
        comm.barrier();
        result
    }

    fn read_vector(&mut self, name: &str) -> Result<Vec<f64>, CheckpointError> {
        let info = self.dataset(name)?;
        if info.kind != ElementKind::F64 || info.shape.len() != 1 {
            return Err(CheckpointError::Format(format!(
                "dataset `{name}` is not a 1-D f64 vector"
            )));
        }
        let mut out = vec![0.0f64; info.len() as usize];
        self.scratch.resize(info.byte_len() as usize, 0);
        self.file.seek(SeekFrom::Start(info.location))?;
        self.file.read_exact(&mut self.scratch)?;
        decode_le(&self.scratch, &mut out);
        Ok(out)
    }

    fn locate(&self, dataset: &DatasetInfo) -> DataLocator {
        DataLocator::Binary {
            file: file_name(&self.path),
            seek: dataset.location,
            endian: Endian::Little,
        }
    }

    fn close(mut self) -> Result<(), CheckpointError> {
        if self.mode == AccessMode::ReadWrite {
            self.file.flush()?;
            self.file.sync_data()?;
        }
        Ok(())
    }
}
