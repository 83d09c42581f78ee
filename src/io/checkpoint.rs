//! Dump and restore orchestration.
//!
//! A dump runs, on every rank and in this order:
//!
//! ```text
//! barrier → mesh (rank 0) → barrier → open → scatter → create `data`
//!         → write hyperslab → barrier → close → sidecar (rank 0)
//! ```
//!
//! A restore runs `barrier → open → locate → read hyperslab → gather →
//! barrier → close`. Every rank passes every synchronization point even
//! after a local failure; it then joins the remaining collective steps
//! through [`ContainerBackend::abstain`] or with an empty hyperslab and
//! reports its first error once the sequence is complete.

use crate::algs::communicator::Communicator;
use crate::algs::hyperslab::{DATASET_RANK, Hyperslab, global_shape};
use crate::algs::layout::{gather_blocks, scatter_blocks};
use crate::checkpoint_error::CheckpointError;
use crate::config::CheckpointConfig;
use crate::data::element::Element;
use crate::data::grid::BlockGrid;
use crate::data::streamer::ChannelStreamer;
use crate::io::bulk::{self, BulkPlan};
use crate::io::mesh_writer::write_mesh;
use crate::io::xdmf::{DataRef, XdmfDescriptor};
use crate::io::{
    AccessMode, CollectiveContainer, CollectiveOp, ContainerBackend, DatasetInfo, DefaultBackend,
    MESH_DATASETS,
};
use std::path::{Path, PathBuf};

/// How far a dump or restore got on this rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckpointStage {
    Idle,
    /// Rank 0 created the container and wrote the mesh (dump only).
    MeshWritten,
    ContainerOpen,
    /// The local buffer holds this rank's blocks (dump only).
    BufferPopulated,
    BulkTransferred,
    ContainerClosed,
    /// Rank 0 wrote the descriptor sidecar (dump only).
    SidecarWritten,
    Done,
}

/// Outcome of a successful dump on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct DumpReport {
    pub container: PathBuf,
    /// Set on the rank that wrote the sidecar.
    pub sidecar: Option<PathBuf>,
    pub slab: Hyperslab,
    pub global_shape: [u64; DATASET_RANK],
    /// Size of this rank's local buffer.
    pub local_bytes: u64,
    pub wrote_mesh: bool,
    pub stage: CheckpointStage,
}

/// Outcome of a successful restore on one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RestoreReport {
    pub container: PathBuf,
    pub slab: Hyperslab,
    pub global_shape: [u64; DATASET_RANK],
    pub local_bytes: u64,
    pub stage: CheckpointStage,
}

/// Stage and first failure of one call on one rank.
struct Progress {
    op: &'static str,
    rank: usize,
    stage: CheckpointStage,
    failure: Option<CheckpointError>,
}

impl Progress {
    fn new(op: &'static str, rank: usize) -> Self {
        Self {
            op,
            rank,
            stage: CheckpointStage::Idle,
            failure: None,
        }
    }

    fn ok(&self) -> bool {
        self.failure.is_none()
    }

    /// Record reaching `next`; a failed call stays at its last good stage.
    fn advance(&mut self, next: CheckpointStage) {
        if self.ok() {
            log::debug!("rank {}: {} {:?} -> {:?}", self.rank, self.op, self.stage, next);
            self.stage = next;
        }
    }

    fn fail(&mut self, e: CheckpointError) {
        log::error!("rank {}: {} failed after {:?}: {e}", self.rank, self.op, self.stage);
        if self.failure.is_none() {
            self.failure = Some(e);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, CheckpointError> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}

/// Collective checkpoint writer and reader over a container backend.
#[derive(Clone, Debug)]
pub struct Checkpointer<Bk = DefaultBackend> {
    config: CheckpointConfig,
    backend: Bk,
}

impl Checkpointer<DefaultBackend> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<Bk: ContainerBackend + Default> Default for Checkpointer<Bk> {
    fn default() -> Self {
        Self::with_backend(Bk::default())
    }
}

impl<Bk: ContainerBackend> Checkpointer<Bk> {
    /// Checkpointer over `backend`, naming containers with the backend's
    /// extension.
    pub fn with_backend(backend: Bk) -> Self {
        Self {
            config: CheckpointConfig::for_backend::<Bk>(),
            backend,
        }
    }

    pub fn with_config(mut self, config: CheckpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether dumps emit the descriptor sidecar.
    pub fn with_sidecar(mut self, emit: bool) -> Self {
        self.config.emit_sidecar = emit;
        self
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn backend(&self) -> &Bk {
        &self.backend
    }

    /// Write the grid's field to `<dir>/<stem>.<container_extension>` in
    /// precision `R`. Collective over `comm`.
    pub fn dump<R, G, S, C>(
        &self,
        grid: &G,
        streamer: &S,
        comm: &C,
        time: f64,
        stem: &str,
        dir: &Path,
    ) -> Result<DumpReport, CheckpointError>
    where
        R: Element,
        G: BlockGrid,
        S: ChannelStreamer<G::Block>,
        C: Communicator,
    {
        self.config
            .validate()
            .inspect_err(|e| log::error!("rank {}: dump not started: {e}", comm.rank()))?;
        let path = self.config.container_path(dir, stem);
        let shape = global_shape(grid.blocks_per_dim(), grid.block_size(), S::CHANNELS);
        let mut progress = Progress::new("dump", comm.rank());

        let plan = match BulkPlan::for_grid(grid, S::CHANNELS) {
            Ok(plan) => Some(plan),
            Err(e) => {
                progress.fail(e);
                None
            }
        };
        if comm.is_root() && self.config.report_allocation {
            if let Some(plan) = &plan {
                plan.report_allocation::<R>();
            }
        }

        comm.barrier();
        if comm.is_root() {
            if let Err(e) = write_mesh(&self.backend, &path, grid) {
                progress.fail(e);
            }
        }
        progress.advance(CheckpointStage::MeshWritten);
        comm.barrier();

        let mut handle = match self.backend.open_collective(&path, AccessMode::ReadWrite, comm) {
            Ok(h) => {
                progress.advance(CheckpointStage::ContainerOpen);
                Some(h)
            }
            Err(e) => {
                progress.fail(e);
                None
            }
        };

        let mut buffer: Vec<R> = Vec::new();
        let mut slab = Hyperslab::empty();
        if let (Some(plan), Some(_)) = (&plan, &handle) {
            let mut local = plan.layout.allocate::<R>();
            let blocks = grid.resident_blocks();
            match scatter_blocks(
                &plan.layout,
                &blocks,
                streamer,
                &mut local,
                self.config.parallel_transform,
            ) {
                Ok(()) => {
                    buffer = local;
                    slab = plan.slab;
                    progress.advance(CheckpointStage::BufferPopulated);
                }
                Err(e) => progress.fail(e),
            }
        }

        let dataset = match handle.as_mut() {
            Some(h) => match bulk::create_data::<_, R, _>(h, &shape, comm) {
                Ok(ds) => Some(ds),
                Err(e) => {
                    progress.fail(e);
                    None
                }
            },
            None => {
                self.backend.abstain(comm, CollectiveOp::CreateDataset);
                None
            }
        };

        match (handle.as_mut(), &dataset) {
            (Some(h), Some(ds)) => match bulk::write_slab(h, ds, &slab, &buffer, comm) {
                Ok(()) => progress.advance(CheckpointStage::BulkTransferred),
                Err(e) => progress.fail(e),
            },
            _ => self.backend.abstain(comm, CollectiveOp::Transfer),
        }
        drop(buffer);

        let descriptor = match (&handle, &dataset) {
            (Some(h), Some(ds)) if comm.is_root() && self.config.emit_sidecar && progress.ok() => {
                match describe(h, ds, streamer.attribute_name(), time) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        progress.fail(e);
                        None
                    }
                }
            }
            _ => None,
        };

        comm.barrier();
        if let Some(h) = handle.take() {
            match h.close() {
                Ok(()) => progress.advance(CheckpointStage::ContainerClosed),
                Err(e) => progress.fail(e),
            }
        }

        let mut sidecar = None;
        if let Some(d) = descriptor {
            let sidecar_path = self.config.sidecar_path(dir, stem);
            match d.write_file(&sidecar_path) {
                Ok(()) => {
                    progress.advance(CheckpointStage::SidecarWritten);
                    sidecar = Some(sidecar_path);
                }
                Err(e) => progress.fail(e),
            }
        }
        progress.advance(CheckpointStage::Done);

        let report = DumpReport {
            container: path,
            sidecar,
            slab,
            global_shape: shape,
            local_bytes: plan.map_or(0, |p| p.local_bytes::<R>()),
            wrote_mesh: comm.is_root(),
            stage: progress.stage,
        };
        progress.finish(report)
    }

    /// Read `<dir>/<stem>.<container_extension>` back into the grid's
    /// resident blocks. Collective over `comm`; `R` must match the precision
    /// the checkpoint was written with.
    pub fn restore<R, G, S, C>(
        &self,
        grid: &mut G,
        streamer: &S,
        comm: &C,
        stem: &str,
        dir: &Path,
    ) -> Result<RestoreReport, CheckpointError>
    where
        R: Element,
        G: BlockGrid,
        S: ChannelStreamer<G::Block>,
        C: Communicator,
    {
        self.config
            .validate()
            .inspect_err(|e| log::error!("rank {}: restore not started: {e}", comm.rank()))?;
        let path = self.config.container_path(dir, stem);
        let shape = global_shape(grid.blocks_per_dim(), grid.block_size(), S::CHANNELS);
        let mut progress = Progress::new("restore", comm.rank());

        let plan = match BulkPlan::for_grid(&*grid, S::CHANNELS) {
            Ok(plan) => Some(plan),
            Err(e) => {
                progress.fail(e);
                None
            }
        };

        comm.barrier();
        let mut handle = match self.backend.open_collective(&path, AccessMode::ReadOnly, comm) {
            Ok(h) => {
                progress.advance(CheckpointStage::ContainerOpen);
                Some(h)
            }
            Err(e) => {
                progress.fail(e);
                None
            }
        };

        let dataset = match &handle {
            Some(h) => match bulk::locate_data::<_, R>(h, &shape) {
                Ok(ds) => Some(ds),
                Err(e) => {
                    progress.fail(e);
                    None
                }
            },
            None => None,
        };

        let mut buffer: Vec<R> = Vec::new();
        let mut slab = Hyperslab::empty();
        match (handle.as_mut(), &dataset) {
            (Some(h), Some(ds)) => {
                let (target, mut local) = match &plan {
                    Some(plan) => (plan.slab, plan.layout.allocate::<R>()),
                    None => (Hyperslab::empty(), Vec::new()),
                };
                match bulk::read_slab(h, ds, &target, &mut local, comm) {
                    Ok(()) => {
                        buffer = local;
                        slab = target;
                        progress.advance(CheckpointStage::BulkTransferred);
                    }
                    Err(e) => progress.fail(e),
                }
            }
            _ => self.backend.abstain(comm, CollectiveOp::Transfer),
        }

        if let (Some(plan), true) = (&plan, progress.ok()) {
            let mut blocks = grid.resident_blocks_mut();
            if let Err(e) = gather_blocks(
                &plan.layout,
                &mut blocks,
                streamer,
                &buffer,
                self.config.parallel_transform,
            ) {
                progress.fail(e);
            }
        }
        drop(buffer);

        comm.barrier();
        if let Some(h) = handle.take() {
            match h.close() {
                Ok(()) => progress.advance(CheckpointStage::ContainerClosed),
                Err(e) => progress.fail(e),
            }
        }
        progress.advance(CheckpointStage::Done);

        let report = RestoreReport {
            container: path,
            slab,
            global_shape: shape,
            local_bytes: plan.map_or(0, |p| p.local_bytes::<R>()),
            stage: progress.stage,
        };
        progress.finish(report)
    }
}

fn describe<H: CollectiveContainer>(
    handle: &H,
    data: &DatasetInfo,
    attribute: &str,
    time: f64,
) -> Result<XdmfDescriptor, CheckpointError> {
    let mesh = |axis: usize| -> Result<DataRef, CheckpointError> {
        let info = handle.dataset(MESH_DATASETS[axis])?;
        Ok(DataRef::from_dataset(handle, &info))
    };
    Ok(XdmfDescriptor {
        time,
        attribute: attribute.to_string(),
        mesh: [mesh(0)?, mesh(1)?, mesh(2)?],
        data: DataRef::from_dataset(handle, data),
    })
}

/// Dump with the default configuration, optionally without the sidecar.
pub fn dump_grid<R, G, S, C>(
    grid: &G,
    streamer: &S,
    comm: &C,
    time: f64,
    stem: &str,
    dir: &Path,
    emit_sidecar: bool,
) -> Result<DumpReport, CheckpointError>
where
    R: Element,
    G: BlockGrid,
    S: ChannelStreamer<G::Block>,
    C: Communicator,
{
    Checkpointer::new()
        .with_sidecar(emit_sidecar)
        .dump::<R, _, _, _>(grid, streamer, comm, time, stem, dir)
}

/// Restore with the default configuration.
pub fn restore_grid<R, G, S, C>(
    grid: &mut G,
    streamer: &S,
    comm: &C,
    stem: &str,
    dir: &Path,
) -> Result<RestoreReport, CheckpointError>
where
    R: Element,
    G: BlockGrid,
    S: ChannelStreamer<G::Block>,
    C: Communicator,
{
    Checkpointer::new().restore::<R, _, _, _>(grid, streamer, comm, stem, dir)
}
