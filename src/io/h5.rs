//! HDF5 shared container.
//!
//! Datasets `/vx`, `/vy`, `/vz` and `data` live at the file root, where any
//! HDF5 reader and the XDMF sidecar expect them. A group whose members are
//! separate processes opens the file through MPI-IO (feature `hdf5-mpio`)
//! and runs dataset creation on every member. A group of threads shares the
//! library's single open file: rank 0 defines datasets and the others look
//! them up after a barrier. Hyperslab transfers are independent and are
//! followed by a barrier.

use crate::algs::communicator::Communicator;
use crate::algs::hyperslab::Hyperslab;
use crate::checkpoint_error::CheckpointError;
use crate::data::element::{Element, ElementKind};
use crate::io::{
    AccessMode, CollectiveContainer, CollectiveOp, ContainerBackend, DataLocator, DatasetInfo,
    SerialContainer, check_transfer, file_name,
};
use bytemuck::Pod;
use hdf5::types::{FloatSize, H5Type, TypeDescriptor};
use hdf5::{Dataset, File};
use ndarray::{Array4, ArrayView, s};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Storage runtime writing HDF5 files.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hdf5Backend;

impl ContainerBackend for Hdf5Backend {
    type Writer = Hdf5Writer;
    type Handle = Hdf5Container;

    const EXTENSION: &'static str = "h5";

    fn create(&self, path: &Path) -> Result<Hdf5Writer, CheckpointError> {
        let file = File::create(path).map_err(|e| CheckpointError::open(path, e))?;
        Ok(Hdf5Writer { file })
    }

    fn open_collective<C: Communicator>(
        &self,
        path: &Path,
        mode: AccessMode,
        comm: &C,
    ) -> Result<Hdf5Container, CheckpointError> {
        let parallel = comm.spans_processes();
        let file = if parallel {
            open_mpio(path, mode, comm)?
        } else {
            let opened = match mode {
                AccessMode::ReadOnly => File::open(path),
                AccessMode::ReadWrite => File::open_rw(path),
            };
            opened.map_err(|e| CheckpointError::open(path, e))?
        };
        log::debug!(
            "rank {} opened {} ({mode:?}, {})",
            comm.rank(),
            path.display(),
            if parallel { "MPI-IO" } else { "shared" }
        );
        Ok(Hdf5Container {
            file,
            path: path.to_path_buf(),
            mode,
            parallel,
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

#[cfg(feature = "hdf5-mpio")]
fn open_mpio<C: Communicator>(
    path: &Path,
    mode: AccessMode,
    comm: &C,
) -> Result<File, CheckpointError> {
    let raw = comm
        .raw_mpi()
        .ok_or_else(|| CheckpointError::open(path, "communicator has no MPI handle"))?;
    let mut builder = hdf5::FileBuilder::new();
    builder.with_fapl(|p| p.mpio(raw, None));
    let opened = match mode {
        AccessMode::ReadOnly => builder.open(path),
        AccessMode::ReadWrite => builder.open_rw(path),
    };
    opened.map_err(|e| CheckpointError::open(path, e))
}

#[cfg(not(feature = "hdf5-mpio"))]
fn open_mpio<C: Communicator>(
    path: &Path,
    _mode: AccessMode,
    _comm: &C,
) -> Result<File, CheckpointError> {
    Err(CheckpointError::open(
        path,
        "group members in separate processes need MPI-IO (feature `hdf5-mpio`)",
    ))
}

/// Single-writer handle for the metadata phase.
pub struct Hdf5Writer {
    file: File,
}

impl SerialContainer for Hdf5Writer {
    fn write_vector(&mut self, name: &str, values: &[f64]) -> Result<DatasetInfo, CheckpointError> {
        if self.file.link_exists(name) {
            return Err(CheckpointError::DatasetExists(name.to_string()));
        }
        let ds = self
            .file
            .new_dataset::<f64>()
            .shape((values.len(),))
            .create(name)?;
        ds.write_raw(values)?;
        Ok(DatasetInfo {
            name: name.to_string(),
            kind: ElementKind::F64,
            shape: vec![values.len() as u64],
            location: 0,
        })
    }

    fn close(self) -> Result<(), CheckpointError> {
        self.file.flush()?;
        Ok(())
    }
}

/// Per-rank handle for the bulk phase.
pub struct Hdf5Container {
    file: File,
    path: PathBuf,
    mode: AccessMode,
    parallel: bool,
}

impl Hdf5Container {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_dataset(&self, name: &str) -> Result<Dataset, CheckpointError> {
        if !self.file.link_exists(name) {
            return Err(CheckpointError::MissingDataset(name.to_string()));
        }
        Ok(self.file.dataset(name)?)
    }

    fn define(&self, name: &str, kind: ElementKind, shape: &[u64]) -> Result<(), CheckpointError> {
        if self.mode != AccessMode::ReadWrite {
            return Err(CheckpointError::Format(format!(
                "{} is open read-only",
                self.path.display()
            )));
        }
        if self.file.link_exists(name) {
            return Err(CheckpointError::DatasetExists(name.to_string()));
        }
        let dims: Vec<usize> = shape.iter().map(|&n| n as usize).collect();
        match kind {
            ElementKind::F32 => self.file.new_dataset::<f32>().shape(dims).create(name)?,
            ElementKind::F64 => self.file.new_dataset::<f64>().shape(dims).create(name)?,
        };
        Ok(())
    }

    fn write_slab<R: Element>(
        &self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &[R],
    ) -> Result<(), CheckpointError> {
        if self.mode != AccessMode::ReadWrite {
            return Err(CheckpointError::transfer("write", &dataset.name, "container is read-only"));
        }
        check_transfer::<R>(dataset, slab, data.len())?;
        if slab.is_empty() {
            return Ok(());
        }
        let ds = self.open_dataset(&dataset.name)?;
        match R::KIND {
            ElementKind::F32 => write_typed::<f32, R>(&ds, &dataset.name, slab, data),
            ElementKind::F64 => write_typed::<f64, R>(&ds, &dataset.name, slab, data),
        }
    }

    fn read_slab<R: Element>(
        &self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &mut [R],
    ) -> Result<(), CheckpointError> {
        check_transfer::<R>(dataset, slab, data.len())?;
        if slab.is_empty() {
            return Ok(());
        }
        let ds = self.open_dataset(&dataset.name)?;
        match R::KIND {
            ElementKind::F32 => read_typed::<f32, R>(&ds, &dataset.name, slab, data),
            ElementKind::F64 => read_typed::<f64, R>(&ds, &dataset.name, slab, data),
        }
    }
}

fn element_kind(ds: &Dataset, name: &str) -> Result<ElementKind, CheckpointError> {
    match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(FloatSize::U4) => Ok(ElementKind::F32),
        TypeDescriptor::Float(FloatSize::U8) => Ok(ElementKind::F64),
        other => Err(CheckpointError::Format(format!(
            "dataset `{name}` stores {other:?}, expected f32 or f64"
        ))),
    }
}

/// Per-axis index ranges selected by `slab`.
fn ranges(slab: &Hyperslab) -> [Range<usize>; 4] {
    std::array::from_fn(|a| {
        let start = slab.offset[a] as usize;
        start..start + slab.count[a] as usize
    })
}

fn write_typed<T, R>(
    ds: &Dataset,
    name: &str,
    slab: &Hyperslab,
    data: &[R],
) -> Result<(), CheckpointError>
where
    T: H5Type + Pod,
    R: Element,
{
    let values: &[T] =
        bytemuck::try_cast_slice(data).map_err(|e| CheckpointError::transfer("write", name, e))?;
    let view = ArrayView::from_shape(slab.count.map(|n| n as usize), values)
        .map_err(|e| CheckpointError::transfer("write", name, e))?;
    let [z, y, x, c] = ranges(slab);
    ds.write_slice(view, s![z, y, x, c])
        .map_err(|e| CheckpointError::transfer("write", name, e))
}

fn read_typed<T, R>(
    ds: &Dataset,
    name: &str,
    slab: &Hyperslab,
    data: &mut [R],
) -> Result<(), CheckpointError>
where
    T: H5Type + Pod,
    R: Element,
{
    let [z, y, x, c] = ranges(slab);
    let block: Array4<T> = ds
        .read_slice(s![z, y, x, c])
        .map_err(|e| CheckpointError::transfer("read", name, e))?;
    let out: &mut [T] = bytemuck::try_cast_slice_mut(data)
        .map_err(|e| CheckpointError::transfer("read", name, e))?;
    for (o, v) in out.iter_mut().zip(block.iter()) {
        *o = *v;
    }
    Ok(())
}

impl CollectiveContainer for Hdf5Container {
    fn create_dataset<C: Communicator>(
        &mut self,
        name: &str,
        kind: ElementKind,
        shape: &[u64],
        comm: &C,
    ) -> Result<DatasetInfo, CheckpointError> {
        // MPI-IO needs every process in metadata operations
        let defined = if self.parallel || comm.is_root() {
            self.define(name, kind, shape)
        } else {
            Ok(())
        };
        comm.barrier();
        defined?;
        self.dataset(name)
    }

    fn dataset(&self, name: &str) -> Result<DatasetInfo, CheckpointError> {
        let ds = self.open_dataset(name)?;
        Ok(DatasetInfo {
            name: name.to_string(),
            kind: element_kind(&ds, name)?,
            shape: ds.shape().into_iter().map(|n| n as u64).collect(),
            location: 0,
        })
    }

    fn write_hyperslab<R: Element, C: Communicator>(
        &mut self,
        dataset: &DatasetInfo,
        slab: &Hyperslab,
        data: &[R],
        comm: &C,
    ) -> Result<(), CheckpointError> {
        let result = self.write_slab(dataset, slab, data);
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
        let result = self.read_slab(dataset, slab, data);
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
        Ok(self.open_dataset(name)?.read_raw::<f64>()?)
    }

    fn locate(&self, dataset: &DatasetInfo) -> DataLocator {
        DataLocator::Hdf {
            file: file_name(&self.path),
            path: format!("/{}", dataset.name.trim_start_matches('/')),
        }
    }

    fn close(self) -> Result<(), CheckpointError> {
        if self.mode == AccessMode::ReadWrite {
            self.file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, run_group};

    const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn mesh_vectors_land_in_an_hdf5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.h5");
        let mut w = Hdf5Backend.create(&path).unwrap();
        w.write_vector("/vx", &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(
            w.write_vector("/vx", &[0.0]).unwrap_err(),
            CheckpointError::DatasetExists("/vx".into())
        );
        w.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[..8], HDF5_SIGNATURE);

        let mut c = Hdf5Backend.open(&path).unwrap();
        assert_eq!(c.read_vector("/vx").unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(
            c.read_vector("/vy").unwrap_err(),
            CheckpointError::MissingDataset("/vy".into())
        );
        let vx = c.dataset("/vx").unwrap();
        assert_eq!(
            c.locate(&vx),
            DataLocator::Hdf {
                file: "mesh.h5".into(),
                path: "/vx".into()
            }
        );
    }

    #[test]
    fn hyperslab_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slab.h5");
        Hdf5Backend.create(&path).unwrap().close().unwrap();
        let shape = [2u64, 3, 4, 2];
        let mut c = Hdf5Backend
            .open_collective(&path, AccessMode::ReadWrite, &NoComm)
            .unwrap();
        let ds = c.create_dataset("data", ElementKind::F32, &shape, &NoComm).unwrap();
        assert_eq!(ds.shape, shape.to_vec());
        let slab = Hyperslab {
            offset: [1, 1, 2, 0],
            count: [1, 2, 2, 2],
        };
        let values: Vec<f32> = (0..8).map(|i| i as f32 + 0.5).collect();
        c.write_hyperslab(&ds, &slab, &values, &NoComm).unwrap();

        let mut back = vec![0.0f32; 8];
        c.read_hyperslab(&ds, &slab, &mut back, &NoComm).unwrap();
        assert_eq!(back, values);

        let whole = Hyperslab {
            offset: [0; 4],
            count: shape,
        };
        let mut full = vec![-1.0f32; 48];
        c.read_hyperslab(&ds, &whole, &mut full, &NoComm).unwrap();
        // z = 1, y = 1, x = 2, c = 0
        assert_eq!(full[((3 + 1) * 4 + 2) * 2], 0.5);
        assert_eq!(full.iter().filter(|v| **v != 0.0).count(), 8);
        c.close().unwrap();
    }

    #[test]
    fn precision_is_checked_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.h5");
        Hdf5Backend.create(&path).unwrap().close().unwrap();
        let mut c = Hdf5Backend
            .open_collective(&path, AccessMode::ReadWrite, &NoComm)
            .unwrap();
        let ds = c.create_dataset("data", ElementKind::F64, &[1, 1, 1, 1], &NoComm).unwrap();
        let err = c
            .write_hyperslab(&ds, &Hyperslab::for_process([0, 0, 0], [1, 1, 1], 1), &[1.0f32], &NoComm)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::PrecisionMismatch { expected: 4, found: 8, .. }));
        assert_eq!(c.dataset("data").unwrap().kind, ElementKind::F64);
    }

    #[test]
    fn read_only_handle_rejects_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.h5");
        Hdf5Backend.create(&path).unwrap().close().unwrap();
        let mut c = Hdf5Backend.open(&path).unwrap();
        assert!(c.create_dataset("data", ElementKind::F64, &[1, 1, 1, 1], &NoComm).is_err());
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = Hdf5Backend.open(&dir.path().join("gone.h5")).map(|_| ()).unwrap_err();
        assert!(matches!(err, CheckpointError::ContainerOpen { .. }));
    }

    #[test]
    fn thread_group_shares_one_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group.h5");
        Hdf5Backend.create(&path).unwrap().close().unwrap();
        let shape = [1u64, 1, 3, 1];
        run_group(3, |comm| {
            let mut c = Hdf5Backend
                .open_collective(&path, AccessMode::ReadWrite, &comm)
                .unwrap();
            let ds = c.create_dataset("data", ElementKind::F64, &shape, &comm).unwrap();
            let slab = Hyperslab::for_process([comm.rank(), 0, 0], [1, 1, 1], 1);
            c.write_hyperslab(&ds, &slab, &[comm.rank() as f64 + 1.0], &comm)
                .unwrap();
            comm.barrier();
            c.close().unwrap();
        });

        let mut c = Hdf5Backend.open(&path).unwrap();
        let ds = c.dataset("data").unwrap();
        let mut all = vec![0.0f64; 3];
        let whole = Hyperslab {
            offset: [0; 4],
            count: shape,
        };
        c.read_hyperslab(&ds, &whole, &mut all, &NoComm).unwrap();
        assert_eq!(all, vec![1.0, 2.0, 3.0]);
    }
}
