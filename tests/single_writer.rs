mod util;
use block_checkpoint::prelude::*;
use util::*;

#[test]
fn only_rank_zero_writes_mesh_and_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let reports = run_group(4, |comm| {
        let grid = indexed_scalar_grid(spec_for([4, 4, 4], [2, 2, 1], comm.rank(), [1, 1, 1]));
        Checkpointer::new().dump::<f32, _, _, _>(&grid, &ScalarStreamer, &comm, 3.0, "four", dir.path())
    });
    let reports: Vec<_> = reports.into_iter().map(Result::unwrap).collect();

    let mesh_writers: Vec<_> = reports.iter().filter(|r| r.wrote_mesh).collect();
    assert_eq!(mesh_writers.len(), 1);
    assert!(reports[0].wrote_mesh);
    let sidecars: Vec<_> = reports.iter().filter_map(|r| r.sidecar.as_ref()).collect();
    assert_eq!(sidecars, vec![&dir.path().join("four.xmf")]);
    assert_eq!(reports[0].stage, CheckpointStage::Done);

    let mut entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    entries.sort();
    let container = CheckpointConfig::default().container_file_name("four");
    assert_eq!(entries, vec![container.as_str(), "four.xmf"]);
}

#[test]
fn sidecar_can_be_disabled_by_config() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        CheckpointConfig::from_json_str(r#"{ "emit_sidecar": false, "container_extension": "bin" }"#)
            .unwrap();
    let reports = run_group(2, |comm| {
        let grid = indexed_scalar_grid(spec_for([4, 4, 4], [1, 2, 1], comm.rank(), [1, 1, 1]));
        Checkpointer::new()
            .with_config(config.clone())
            .dump::<f64, _, _, _>(&grid, &ScalarStreamer, &comm, 0.0, "quiet", dir.path())
    });
    for r in reports {
        let r = r.unwrap();
        assert!(r.sidecar.is_none());
        assert_eq!(r.container, dir.path().join("quiet.bin"));
    }
    assert!(!dir.path().join("quiet.xmf").exists());
}
