// Integration tests for the event lock, token bus, sessions and area locks

use cubist::core::CellValue;
use cubist::elements::ElementKind;
use cubist::engine::SplashMode;
use cubist::server::{Dispatch, Server};
use cubist::tokens::TokenChecks;

fn small_cube(server: &mut Server) -> (u32, u32, u32, u32, u32) {
    let db = server.add_database("Test", None).unwrap();
    let x = server.create_dimension(db, "X", None, false).unwrap();
    let y = server.create_dimension(db, "Y", None, false).unwrap();
    let x1 = server.add_element(db, x, "x1", ElementKind::Numeric, None).unwrap();
    let y1 = server.add_element(db, y, "y1", ElementKind::Numeric, None).unwrap();
    let cube = server.create_cube(db, "C", vec![x, y], None, false).unwrap();
    (db, cube, x1, y1, x)
}

#[test]
fn test_event_lock_defers_foreign_writes() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);

    let a = server.sessions.create(None, false, 3600);
    let b = server.sessions.create(None, false, 3600);

    assert_eq!(server.begin_event(a, "batch").unwrap(), Dispatch::Done(()));

    let token_before = server.database(db).unwrap().cube(cube).unwrap().token.value();

    // session B's write suspends on the event semaphore
    let outcome = server
        .dispatch_set_cell(b, db, cube, vec![x1, y1], CellValue::Numeric(7.0), SplashMode::Default, false)
        .unwrap();
    assert!(matches!(outcome, Dispatch::Suspended(_)));
    assert!(!server
        .get_cell_value(db, cube, &[x1, y1], None)
        .unwrap()
        .found);

    // the holder's own write goes through immediately
    let own = server
        .dispatch_set_cell(a, db, cube, vec![x1, y1], CellValue::Numeric(1.0), SplashMode::Default, false)
        .unwrap();
    assert_eq!(own, Dispatch::Done(()));

    // releasing the lock replays B's write in order
    let outcomes = server.end_event(a).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].1.is_ok());

    let result = server.get_cell_value(db, cube, &[x1, y1], None).unwrap();
    assert_eq!(result.value, CellValue::Numeric(7.0));

    // the cube token B observes now is strictly newer than before its wait
    let token_after = server.database(db).unwrap().cube(cube).unwrap().token.value();
    assert!(token_after > token_before);
}

#[test]
fn test_token_precondition_rejects_outdated_cube() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);

    let seen = server.database(db).unwrap().cube(cube).unwrap().token.value();
    let checks = TokenChecks {
        cube: Some(seen),
        ..TokenChecks::none()
    };
    assert!(server
        .check_request_tokens(&checks, Some(db), None, Some((db, cube)))
        .is_ok());

    // a third party writes the cube
    server
        .set_cell(db, cube, &[x1, y1], CellValue::Numeric(1.0), SplashMode::Default, false, None, None)
        .unwrap();

    assert_eq!(
        server.check_request_tokens(&checks, None, None, Some((db, cube))),
        Err(cubist::OlapError::CubeTokenOutdated)
    );
}

#[test]
fn test_token_propagation_reaches_parents() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);

    let server_token = server.token.value();
    let db_token = server.database(db).unwrap().token.value();
    let cc_token = server
        .database(db)
        .unwrap()
        .cube(cube)
        .unwrap()
        .client_cache_token
        .value();

    server
        .set_cell(db, cube, &[x1, y1], CellValue::Numeric(2.0), SplashMode::Default, false, None, None)
        .unwrap();

    assert!(server.token.value() > server_token);
    assert!(server.database(db).unwrap().token.value() > db_token);
    assert!(
        server
            .database(db)
            .unwrap()
            .cube(cube)
            .unwrap()
            .client_cache_token
            .value()
            > cc_token
    );
}

#[test]
fn test_area_lock_blocks_other_sessions_and_rolls_back() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);

    let owner = server.sessions.create(None, false, 3600);
    let other = server.sessions.create(None, false, 3600);

    server
        .set_cell(db, cube, &[x1, y1], CellValue::Numeric(1.0), SplashMode::Default, false, None, None)
        .unwrap();

    let lock = server
        .lock_cube_area(owner, db, cube, &[Some(vec![x1]), Some(vec![y1])])
        .unwrap();

    // the foreign session bounces off the locked area
    let outcome =
        server.dispatch_set_cell(other, db, cube, vec![x1, y1], CellValue::Numeric(9.0), SplashMode::Default, false);
    assert!(matches!(outcome, Err(cubist::OlapError::LockedArea)));
    let value = server.get_cell_value(db, cube, &[x1, y1], None).unwrap().value;
    assert_eq!(value, CellValue::Numeric(1.0));

    // the owner writes inside its lock, then rolls back
    server
        .dispatch_set_cell(owner, db, cube, vec![x1, y1], CellValue::Numeric(5.0), SplashMode::Default, false)
        .unwrap();
    assert_eq!(
        server.get_cell_value(db, cube, &[x1, y1], None).unwrap().value,
        CellValue::Numeric(5.0)
    );

    server.rollback_cube_lock(owner, db, cube, lock, None).unwrap();
    assert_eq!(
        server.get_cell_value(db, cube, &[x1, y1], None).unwrap().value,
        CellValue::Numeric(1.0)
    );
}

#[test]
fn test_session_eviction_releases_event_lock() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);

    let holder = server.sessions.create(None, false, 3600);
    server.begin_event(holder, "batch").unwrap();
    assert!(server.state.blocking());

    server.logout(holder).unwrap();
    assert!(!server.state.blocking());

    // writes flow again
    server
        .set_cell(db, cube, &[x1, y1], CellValue::Numeric(3.0), SplashMode::Default, false, None, None)
        .unwrap();
}

#[test]
fn test_element_delete_fails_inside_locked_area() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, x) = small_cube(&mut server);
    let session = server.sessions.create(None, false, 3600);

    server
        .lock_cube_area(session, db, cube, &[Some(vec![x1]), Some(vec![y1])])
        .unwrap();

    assert_eq!(
        server.delete_element(db, x, x1, None),
        Err(cubist::OlapError::LockedArea)
    );
}

#[test]
fn test_queued_bulk_writes_flush_in_order() {
    let mut server = Server::new().unwrap();
    let (db, cube, x1, y1, _) = small_cube(&mut server);
    let session = server.sessions.create(None, false, 3600);

    for value in [1.0, 2.0, 3.0] {
        server
            .queue_cell_write(
                session,
                cubist::auth::QueuedCellWrite {
                    database: db,
                    cube,
                    coord: vec![x1, y1],
                    value: CellValue::Numeric(value),
                    mode: SplashMode::Default,
                },
            )
            .unwrap();
    }

    let outcomes = server.flush_queued_writes(session).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()));

    // the last queued value wins
    assert_eq!(
        server.get_cell_value(db, cube, &[x1, y1], None).unwrap().value,
        CellValue::Numeric(3.0)
    );
}

#[test]
fn test_session_id_wire_form() {
    use cubist::auth::sessions::{decode_session_id, encode_session_id};

    let mut server = Server::new().unwrap();
    let session = server.sessions.create(None, false, 3600);

    let sid = encode_session_id(session);
    assert_eq!(sid.len(), 4);
    assert_eq!(decode_session_id(&sid).unwrap(), session);
}
