//! Single-writer metadata phase of a dump: create the container and store the
//! vertex coordinates `/vx`, `/vy`, `/vz`.

use crate::checkpoint_error::CheckpointError;
use crate::data::grid::BlockGrid;
use crate::io::{ContainerBackend, DatasetInfo, MESH_DATASETS, SerialContainer};
use std::path::Path;

/// Vertex coordinates of the whole grid along x, y, z.
///
/// Each axis holds `ncells + 1` strictly increasing values, where `ncells` is
/// the number of global cells along that axis.
pub fn vertex_coordinates<G: BlockGrid>(grid: &G) -> Result<[Vec<f64>; 3], CheckpointError> {
    let blocks = grid.blocks_per_dim();
    let size = grid.block_size();
    let axis = |a: usize| -> Result<Vec<f64>, CheckpointError> {
        let map = grid.mesh_map(a);
        let cells = blocks[a] * size[a];
        if map.ncells() != cells {
            return Err(CheckpointError::Mesh(format!(
                "mesh map along axis {a} has {} cells, grid has {cells}",
                map.ncells()
            )));
        }
        let vertices = map.vertices();
        if vertices.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CheckpointError::Mesh(format!(
                "vertex coordinates along axis {a} are not strictly increasing"
            )));
        }
        Ok(vertices)
    };
    Ok([axis(0)?, axis(1)?, axis(2)?])
}

/// Create (truncating) the container at `path` and write the mesh datasets.
///
/// Must run on exactly one rank. On failure the partial container, or any
/// stale file at `path`, is removed so that the following collective open
/// fails on every rank alike.
pub fn write_mesh<Bk, G>(
    backend: &Bk,
    path: &Path,
    grid: &G,
) -> Result<[DatasetInfo; 3], CheckpointError>
where
    Bk: ContainerBackend,
    G: BlockGrid,
{
    let result = create_with_mesh(backend, path, grid);
    if let Err(e) = &result {
        log::error!("mesh write to {} failed: {e}", path.display());
        if let Err(d) = backend.discard(path) {
            log::error!("could not remove partial container {}: {d}", path.display());
        }
    }
    result
}

fn create_with_mesh<Bk, G>(
    backend: &Bk,
    path: &Path,
    grid: &G,
) -> Result<[DatasetInfo; 3], CheckpointError>
where
    Bk: ContainerBackend,
    G: BlockGrid,
{
    let vertices = vertex_coordinates(grid)?;
    let mut writer = backend.create(path)?;
    let mut stored = Vec::with_capacity(3);
    for (name, values) in MESH_DATASETS.iter().zip(&vertices) {
        stored.push(writer.write_vector(name, values)?);
    }
    writer.close()?;
    log::debug!(
        "wrote mesh {}x{}x{} vertices to {}",
        vertices[0].len(),
        vertices[1].len(),
        vertices[2].len(),
        path.display()
    );
    stored
        .try_into()
        .map_err(|_| CheckpointError::Format("expected three mesh datasets".into()))
}
