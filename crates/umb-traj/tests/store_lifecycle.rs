use std::fs;

use tempfile::tempdir;
use umb_core::{TrajectoryStore, TrajectoryWriter, Window, WindowCoordinate};
use umb_traj::{inspect, read_dcd, DcdStore};

fn window(psi: usize, phi: usize) -> Window {
    let coord = |axis: &str, index: usize| WindowCoordinate {
        axis: axis.to_string(),
        index,
        grid_size: 2,
        center: -std::f64::consts::PI + index as f64 * std::f64::consts::PI,
    };
    Window {
        linear_index: psi * 2 + phi,
        coordinates: vec![coord("psi", psi), coord("phi", phi)],
    }
}

fn frame(shift: f64) -> Vec<[f64; 3]> {
    vec![[shift, 0.0, 0.0], [0.1, shift, 0.0], [0.2, 0.0, shift]]
}

#[test]
fn finished_writer_publishes_final_name() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 200, 0.001).unwrap();
    let target = window(0, 1);
    let mut writer = store.create(&target).unwrap();
    assert!(store.partial_location(&target).exists());
    for idx in 0..4 {
        writer.write_frame(&frame(idx as f64 * 0.01)).unwrap();
    }
    assert_eq!(writer.frames_written(), 4);
    let record = writer.finish().unwrap();

    assert_eq!(record.frames, 4);
    assert_eq!(record.path, dir.path().join("traj_psi_0_phi_1.dcd"));
    assert!(!store.partial_location(&target).exists());
    assert_eq!(store.completed_frames(&target).unwrap(), Some(4));

    let (header, frames) = read_dcd(fs::File::open(&record.path).unwrap()).unwrap();
    assert_eq!(header.frames, 4);
    assert_eq!(header.atoms, 3);
    assert_eq!(header.last_step, 800);
    assert_eq!(header.titles[1], "psi index: 0 out of 2, phi index: 1 out of 2");
    assert_eq!(frames.len(), 4);
    assert!((frames[3][2][2] - 0.03).abs() < 1e-6);
}

#[test]
fn dropped_writer_leaves_only_partial_file() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 10, 0.001).unwrap();
    let target = window(1, 0);
    {
        let mut writer = store.create(&target).unwrap();
        writer.write_frame(&frame(0.0)).unwrap();
        writer.write_frame(&frame(0.1)).unwrap();
    }
    assert!(!store.location(&target).exists());
    let partial = store.partial_location(&target);
    assert!(partial.exists());
    assert_eq!(store.completed_frames(&target).unwrap(), None);

    // NSET is only patched on finish; the flushed body still holds two frames.
    let summary = inspect(&partial).unwrap();
    assert_eq!(summary.header.frames, 0);
    assert_eq!(summary.frames_on_disk, 2);
    assert!(!summary.consistent());
}

#[test]
fn recreating_a_window_discards_previous_output() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 10, 0.001).unwrap();
    let target = window(0, 0);
    let mut writer = store.create(&target).unwrap();
    writer.write_frame(&frame(0.0)).unwrap();
    writer.finish().unwrap();
    assert_eq!(store.completed_frames(&target).unwrap(), Some(1));

    let _writer = store.create(&target).unwrap();
    assert!(!store.location(&target).exists());
}

#[test]
fn wrong_atom_count_is_resource_error() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 10, 0.001).unwrap();
    let mut writer = store.create(&window(0, 0)).unwrap();
    let err = writer.write_frame(&[[0.0; 3]]).unwrap_err();
    assert_eq!(err.family(), "resource");
}

#[test]
fn missing_directory_is_configuration_error() {
    let dir = tempdir().unwrap();
    let err = DcdStore::new(dir.path().join("absent"), 3, 10, 0.001).unwrap_err();
    assert_eq!(err.family(), "config");
    assert_eq!(err.info().code, "output-dir-missing");
}

#[test]
fn file_in_place_of_directory_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("traj");
    fs::write(&path, b"not a directory").unwrap();
    let err = DcdStore::new(&path, 3, 10, 0.001).unwrap_err();
    assert_eq!(err.info().code, "output-dir-missing");
}

#[test]
fn truncated_trajectory_is_not_reusable() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 10, 0.001).unwrap();
    let target = window(1, 1);
    let mut writer = store.create(&target).unwrap();
    for idx in 0..3 {
        writer.write_frame(&frame(idx as f64)).unwrap();
    }
    let record = writer.finish().unwrap();
    let bytes = fs::read(&record.path).unwrap();
    fs::write(&record.path, &bytes[..bytes.len() - 7]).unwrap();
    assert_eq!(store.completed_frames(&target).unwrap(), None);
}

#[test]
fn unreadable_trajectory_is_not_reusable() {
    let dir = tempdir().unwrap();
    let store = DcdStore::new(dir.path(), 3, 10, 0.001).unwrap();
    let target = window(0, 0);
    fs::write(store.location(&target), b"garbage").unwrap();
    assert_eq!(store.completed_frames(&target).unwrap(), None);
}
