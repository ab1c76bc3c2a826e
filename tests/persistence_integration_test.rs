// Integration tests for snapshots, journals and crash recovery

use cubist::core::{CellValue, ServerOptions};
use cubist::elements::ElementKind;
use cubist::engine::SplashMode;
use cubist::io::journal::{JournalRecord, JournalWriter};
use cubist::server::Server;

fn options_for(dir: &tempfile::TempDir) -> ServerOptions {
    ServerOptions {
        data_directory: dir.path().to_path_buf(),
        ..ServerOptions::default()
    }
}

/// Build a server with one database, a consolidated hierarchy, a cube
/// with cells and a rule
fn seed(server: &mut Server) -> (u32, u32, u32, u32) {
    let db = server.add_database("Demo", None).unwrap();
    let x = server.create_dimension(db, "X", None, false).unwrap();
    let y = server.create_dimension(db, "Y", None, false).unwrap();
    let x1 = server.add_element(db, x, "x1", ElementKind::Numeric, None).unwrap();
    let x2 = server.add_element(db, x, "x2", ElementKind::Numeric, None).unwrap();
    let y1 = server.add_element(db, y, "y1", ElementKind::Numeric, None).unwrap();
    let label = server.add_element(db, y, "label", ElementKind::Text, None).unwrap();
    let xs = server
        .add_element(db, x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    server.add_children(db, x, xs, &[(x1, 1.0), (x2, 2.0)], None).unwrap();

    let cube = server.create_cube(db, "C", vec![x, y], None, false).unwrap();
    server
        .set_cell(db, cube, &[x1, y1], CellValue::Numeric(5.0), SplashMode::Default, false, None, None)
        .unwrap();
    server
        .set_cell(db, cube, &[x2, y1], CellValue::Numeric(3.0), SplashMode::Default, false, None, None)
        .unwrap();
    server
        .set_cell(
            db,
            cube,
            &[x1, label],
            CellValue::Text("note".to_string()),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();
    server
        .create_rule(db, cube, "['x2', 'label'] = \"synth\"", None, "stored rule", None)
        .unwrap();

    (db, cube, xs, y1)
}

#[test]
fn test_save_load_round_trip_preserves_observable_state() {
    let dir = tempfile::tempdir().unwrap();

    let (db_name, cube_name);
    {
        let mut server = Server::open(options_for(&dir)).unwrap();
        let (db, cube, xs, y1) = seed(&mut server);
        db_name = server.database(db).unwrap().name.clone();
        cube_name = server.database(db).unwrap().cube(cube).unwrap().name.clone();
        let _ = (xs, y1);
        server.save().unwrap();
    }

    let server = Server::open(options_for(&dir)).unwrap();
    let db = server.find_database_by_name(&db_name).unwrap().id;
    let data = server.database(db).unwrap();
    let cube = data.find_cube_by_name(&cube_name).unwrap().id;

    let x = data.find_dimension_by_name("X").unwrap();
    let x1 = x.graph.find_by_name("x1").unwrap().id;
    let x2 = x.graph.find_by_name("x2").unwrap().id;
    let xs = x.graph.find_by_name("xs").unwrap().id;
    let y = data.find_dimension_by_name("Y").unwrap();
    let y1 = y.graph.find_by_name("y1").unwrap().id;
    let label = y.graph.find_by_name("label").unwrap().id;

    // hierarchy survived
    assert_eq!(x.graph.get(xs).unwrap().children, vec![(x1, 1.0), (x2, 2.0)]);

    // values survived, aggregation works
    assert_eq!(
        server.get_cell_value(db, cube, &[x1, y1], None).unwrap().value,
        CellValue::Numeric(5.0)
    );
    assert_eq!(
        server.get_cell_value(db, cube, &[xs, y1], None).unwrap().value,
        CellValue::Numeric(11.0)
    );
    assert_eq!(
        server.get_cell_value(db, cube, &[x1, label], None).unwrap().value,
        CellValue::Text("note".to_string())
    );

    // the stored rule was recompiled
    assert_eq!(
        server.get_cell_value(db, cube, &[x2, label], None).unwrap().value,
        CellValue::Text("synth".to_string())
    );
}

#[test]
fn test_save_load_save_is_byte_stable() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut server = Server::open(options_for(&dir)).unwrap();
        seed(&mut server);
        server.save().unwrap();
    }

    let database_file = dir.path().join("Demo").join("database.csv");
    let first = std::fs::read(&database_file).unwrap();
    let cube_files: Vec<std::path::PathBuf> = std::fs::read_dir(dir.path().join("Demo"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "csv").unwrap_or(false))
        .collect();
    let first_cubes: Vec<Vec<u8>> = cube_files
        .iter()
        .map(|path| std::fs::read(path).unwrap())
        .collect();

    // reopening folds the (empty) journals in and rewrites the snapshots
    {
        let _server = Server::open(options_for(&dir)).unwrap();
    }

    assert_eq!(std::fs::read(&database_file).unwrap(), first);
    for (path, bytes) in cube_files.iter().zip(first_cubes) {
        assert_eq!(std::fs::read(path).unwrap(), bytes, "file {:?}", path);
    }
}

#[test]
fn test_cube_journal_replay_on_load() {
    let dir = tempfile::tempdir().unwrap();

    let (cube_id, coord);
    {
        let mut server = Server::open(options_for(&dir)).unwrap();
        let (db, cube, _, y1) = seed(&mut server);
        server.save().unwrap();

        let x1 = server
            .database(db)
            .unwrap()
            .find_dimension_by_name("X")
            .unwrap()
            .graph
            .find_by_name("x1")
            .unwrap()
            .id;
        cube_id = cube;
        coord = format!("{},{}", x1, y1);
    }

    // simulate writes that reached only the journal before a crash
    let journal_path = dir
        .path()
        .join("Demo")
        .join(format!("database_CUBE_{}.log", cube_id));
    {
        let mut journal = JournalWriter::open(&journal_path, 1).unwrap();
        journal
            .append(&JournalRecord::new(
                "crash",
                "",
                "setDouble",
                vec![coord.clone(), "99".to_string()],
            ))
            .unwrap();
        journal.close().unwrap();
    }

    let server = Server::open(options_for(&dir)).unwrap();
    let db = server.find_database_by_name("Demo").unwrap().id;
    let data = server.database(db).unwrap();
    let x1 = data
        .find_dimension_by_name("X")
        .unwrap()
        .graph
        .find_by_name("x1")
        .unwrap()
        .id;
    let y1 = data
        .find_dimension_by_name("Y")
        .unwrap()
        .graph
        .find_by_name("y1")
        .unwrap()
        .id;

    assert_eq!(
        server.get_cell_value(db, cube_id, &[x1, y1], None).unwrap().value,
        CellValue::Numeric(99.0)
    );

    // the journal was folded into the snapshot and removed
    assert!(!journal_path.exists());
}

#[test]
fn test_orphaned_tmp_file_is_adopted() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut server = Server::open(options_for(&dir)).unwrap();
        seed(&mut server);
        server.save().unwrap();
    }

    // simulate a crash between archive and rename: the data file is gone
    // and only the temp snapshot remains
    let database_file = dir.path().join("Demo").join("database.csv");
    let tmp_file = dir.path().join("Demo").join("database.csv.tmp");
    std::fs::rename(&database_file, &tmp_file).unwrap();

    let server = Server::open(options_for(&dir)).unwrap();
    let db = server.find_database_by_name("Demo").unwrap().id;
    assert!(server.database(db).unwrap().find_dimension_by_name("X").is_ok());
    assert!(database_file.exists());
    assert!(!tmp_file.exists());
}

#[test]
fn test_group_remap_follows_renames() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut server = Server::open(options_for(&dir)).unwrap();
        let db = server.add_database("Demo", None).unwrap();
        let x = server.create_dimension(db, "X", None, false).unwrap();
        server.create_cube(db, "C", vec![x], None, false).unwrap();

        // grant the editor group a right on cube C
        let (rights_cube, group_el, cube_el) = {
            let data = server.database(db).unwrap();
            let group_dim = data
                .find_dimension_by_name(cubist::server::names::GROUP_DIMENSION)
                .unwrap()
                .id;
            let group_el = server
                .resolve_dimension(db, group_dim)
                .unwrap()
                .graph
                .find_by_name("editor")
                .unwrap()
                .id;
            let meta = data
                .find_dimension_by_name(cubist::server::names::CUBE_DIMENSION)
                .unwrap();
            (
                data.find_cube_by_name(cubist::server::names::GROUP_CUBE_DATA_CUBE)
                    .unwrap()
                    .id,
                group_el,
                meta.graph.find_by_name("C").unwrap().id,
            )
        };
        server
            .set_cell(
                db,
                rights_cube,
                &[group_el, cube_el],
                CellValue::Text("R".to_string()),
                SplashMode::Default,
                false,
                None,
                None,
            )
            .unwrap();
        server.save().unwrap();
    }

    let server = Server::open(options_for(&dir)).unwrap();
    let db = server.find_database_by_name("Demo").unwrap().id;
    let data = server.database(db).unwrap();
    let rights_cube = data
        .find_cube_by_name(cubist::server::names::GROUP_CUBE_DATA_CUBE)
        .unwrap();

    // the remap table resolved the stored group id by name
    let group_dim = data
        .find_dimension_by_name(cubist::server::names::GROUP_DIMENSION)
        .unwrap()
        .id;
    let editor = server
        .resolve_dimension(db, group_dim)
        .unwrap()
        .graph
        .find_by_name("editor")
        .unwrap()
        .id;
    let cube_el = data
        .find_dimension_by_name(cubist::server::names::CUBE_DIMENSION)
        .unwrap()
        .graph
        .find_by_name("C")
        .unwrap()
        .id;
    assert_eq!(
        rights_cube.stored_value(&[editor, cube_el]),
        Some(CellValue::Text("R".to_string()))
    );
}
